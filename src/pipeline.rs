//! End-to-end briefing run and the scheduling loop around it.
//!
//! A run is strictly sequential:
//!
//! 1. **Collect**: in-window articles from the [`FeedSource`]
//! 2. **Cluster**: embed and group every in-window article
//! 3. **Select**: pick the tier and the articles to brief
//! 4. **Fetch**: download at most `fetch_cap` unique article pages
//! 5. **Synthesize**: turn the pages into briefing text
//! 6. **Persist**: overwrite the snapshot document
//!
//! A run with no in-window articles stops after step 1 and leaves the previous
//! snapshot untouched. Only one run executes at a time per snapshot, even
//! across processes: [`Pipeline::run_once`] waits for a run in flight,
//! [`Pipeline::trigger`] refuses to start. Within a process the runs are
//! serialized by a mutex; between processes by a [`SnapshotLock`].

use crate::clustering::ArticleClusterer;
use crate::config::{BriefingConfig, PipelineConfig, SelectionConfig};
use crate::models::{Article, BriefingSnapshot, Tier};
use crate::outputs::snapshot::{SnapshotLock, write_snapshot};
use crate::providers::{ContentFetcher, Embedder, FeedSource, Synthesizer};
use crate::selection::select_briefing_target;
use crate::utils::{hours, minutes};
use chrono::Utc;
use futures::FutureExt;
use itertools::Itertools;
use std::error::Error;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};
use url::Url;

/// How often a waiting run re-checks a snapshot lock held by another process.
const LOCK_POLL: Duration = Duration::from_millis(250);

/// What a single run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No in-window articles; the previous snapshot was kept.
    NoArticles,
    /// A new snapshot was written.
    Published { tier: Tier, trend_size: usize },
    /// A manual trigger arrived while another run (in this or another
    /// process) was in flight.
    Busy,
}

/// Unique links of the selected articles, in selection order, capped.
pub fn fetch_targets(targets: &[Article], cap: usize) -> Vec<Url> {
    targets
        .iter()
        .map(|a| a.link.clone())
        .unique()
        .take(cap)
        .collect()
}

/// Await `run` with errors and panics contained, logging the result.
async fn run_isolated<Fut>(kind: &'static str, run: Fut)
where
    Fut: Future<Output = Result<RunOutcome, Box<dyn Error>>>,
{
    match AssertUnwindSafe(run).catch_unwind().await {
        Ok(Ok(outcome)) => info!(kind, ?outcome, "Run finished"),
        Ok(Err(e)) => error!(kind, error = %e, "Pipeline failed"),
        Err(_) => error!(kind, "Pipeline panicked"),
    }
}

/// The briefing pipeline, generic over its collaborators so tests can drive
/// it with fakes.
pub struct Pipeline<F, E, C, S> {
    feeds: F,
    clusterer: ArticleClusterer<E>,
    fetcher: C,
    synthesizer: S,
    selection: SelectionConfig,
    settings: PipelineConfig,
    snapshot_path: PathBuf,
    run_lock: Mutex<()>,
}

impl<F, E, C, S> Pipeline<F, E, C, S>
where
    F: FeedSource,
    E: Embedder,
    C: ContentFetcher,
    S: Synthesizer,
{
    /// Create a pipeline that writes its snapshot to `snapshot_path`.
    ///
    /// # Arguments
    ///
    /// * `config` - Clustering, selection and scheduling settings
    /// * `feeds` - Source of in-window articles
    /// * `embedder` - Embedding provider used by the clusterer
    /// * `fetcher` - Downloads the selected article pages
    /// * `synthesizer` - Writes the briefing from the fetched pages
    /// * `snapshot_path` - Where the snapshot document lives
    pub fn new(
        config: &BriefingConfig,
        feeds: F,
        embedder: E,
        fetcher: C,
        synthesizer: S,
        snapshot_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            feeds,
            clusterer: ArticleClusterer::new(embedder, config.clustering.clone()),
            fetcher,
            synthesizer,
            selection: config.selection.clone(),
            settings: config.pipeline.clone(),
            snapshot_path: snapshot_path.into(),
            run_lock: Mutex::new(()),
        }
    }

    /// Run once, waiting for any run already in flight to finish first.
    pub async fn run_once(&self) -> Result<RunOutcome, Box<dyn Error>> {
        let _guard = self.run_lock.lock().await;
        self.execute_exclusive(true).await
    }

    /// Manual trigger: run now, or return [`RunOutcome::Busy`] if a run is
    /// already in flight.
    pub async fn trigger(&self) -> Result<RunOutcome, Box<dyn Error>> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            warn!("Run already in progress; rejecting manual trigger");
            return Ok(RunOutcome::Busy);
        };
        self.execute_exclusive(false).await
    }

    /// Run while holding the snapshot's cross-process lock. When another
    /// process holds it, wait for it if `wait` is set, else report `Busy`.
    async fn execute_exclusive(&self, wait: bool) -> Result<RunOutcome, Box<dyn Error>> {
        let mut lock = SnapshotLock::open(&self.snapshot_path)?;
        let mut announced = false;
        loop {
            match lock.try_acquire()? {
                Some(_held) => return self.execute().await,
                None if !wait => {
                    warn!("Snapshot lock is held by another run; rejecting manual trigger");
                    return Ok(RunOutcome::Busy);
                }
                None => {
                    if !announced {
                        info!("Snapshot lock is held by another run; waiting for it");
                        announced = true;
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
            }
        }
    }

    #[instrument(level = "info", skip_all, fields(snapshot = %self.snapshot_path.display()))]
    async fn execute(&self) -> Result<RunOutcome, Box<dyn Error>> {
        let t0 = Instant::now();
        info!(window_hours = self.settings.window_hours, "Starting pipeline run");

        let articles = self.feeds.collect(hours(self.settings.window_hours)).await;
        if articles.is_empty() {
            info!("No in-window articles; keeping previous snapshot");
            return Ok(RunOutcome::NoArticles);
        }

        info!(count = articles.len(), "Analyzing articles for trends");
        let clusters = self.clusterer.cluster(&articles).await;

        let Some((tier, targets)) = select_briefing_target(&articles, &clusters, &self.selection)
        else {
            return Ok(RunOutcome::NoArticles);
        };

        let urls = fetch_targets(&targets, self.settings.fetch_cap);
        info!(%tier, selected = targets.len(), fetching = urls.len(), "Fetching briefing sources");
        let content = self.fetcher.fetch(&urls).await;

        info!(%tier, pages = content.len(), "Synthesizing briefing");
        let briefing = self.synthesizer.synthesize(&content).await;

        let snapshot = BriefingSnapshot::new(
            Utc::now(),
            tier,
            briefing,
            targets,
            articles,
            self.settings.all_articles_cap,
        );
        write_snapshot(&snapshot, &self.snapshot_path).await?;

        info!(
            %tier,
            trend_size = snapshot.trend_size,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Briefing generated and saved"
        );
        Ok(RunOutcome::Published {
            tier,
            trend_size: snapshot.trend_size,
        })
    }

    /// Run immediately and then every `interval_minutes` until `shutdown`
    /// resolves. Messages on `triggers` request an extra run. A failing or
    /// panicking run is logged and the loop carries on.
    pub async fn serve<Sd>(&self, mut triggers: mpsc::Receiver<()>, shutdown: Sd)
    where
        Sd: Future<Output = ()>,
    {
        let period = minutes(self.settings.interval_minutes);
        info!(interval_minutes = self.settings.interval_minutes, "Starting agent loop");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut triggers_open = true;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested; stopping agent loop");
                    break;
                }
                _ = ticker.tick() => {
                    run_isolated("scheduled", self.run_once()).await;
                    info!(minutes = self.settings.interval_minutes, "Sleeping until next run");
                }
                msg = triggers.recv(), if triggers_open => match msg {
                    Some(()) => run_isolated("manual", self.trigger()).await,
                    None => triggers_open = false,
                },
            }
        }
    }
}

//! # Awful News Briefing
//!
//! A trend-detection pipeline that polls RSS/Atom feeds, clusters recent
//! headlines by meaning, and writes a briefing about the strongest story.
//!
//! ## Features
//!
//! - Polls any number of RSS 2.0 / Atom feeds over a recency window
//! - Embeds headlines through an OpenAI-compatible embeddings endpoint
//! - Groups related coverage with DBSCAN over cosine distance
//! - Picks a Trend, an Emerging topic, or falls back to the latest news
//! - Scrapes the chosen articles and synthesizes a briefing through an
//!   OpenAI-compatible LLM (via `awful_aj`)
//! - Persists a single JSON snapshot that the `show` command renders
//!
//! ## Usage
//!
//! ```sh
//! awful_news_briefing -c briefing.yaml run      # one run
//! awful_news_briefing -c briefing.yaml serve    # every 15 minutes
//! awful_news_briefing show                      # print the latest briefing
//! awful_news_briefing -c briefing.yaml inspect  # tune eps / min_pts
//! ```
//!
//! While `serve` is running, `kill -USR1 <pid>` queues an extra run.
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Collecting**: Poll feeds and keep in-window articles
//! 2. **Clustering**: Embed headlines and group related coverage
//! 3. **Selecting**: Choose the tier and the articles to brief
//! 4. **Fetching**: Download up to five source pages
//! 5. **Synthesizing**: Ask the LLM for a briefing
//! 6. **Output**: Overwrite the JSON snapshot

use awful_aj::{config_dir, template};
use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod clustering;
mod config;
mod models;
mod outputs;
mod pipeline;
mod providers;
mod selection;
mod utils;

use crate::config::BriefingConfig;
use cli::{Cli, Command};
use clustering::{ArticleClusterer, cluster_embedded, distance_matrix, distance_stats};
use outputs::markdown::{WAITING_MESSAGE, snapshot_to_markdown};
use outputs::snapshot::read_snapshot;
use pipeline::Pipeline;
use providers::embeddings::OpenAiEmbedder;
use providers::feeds::RssFeedSource;
use providers::scraper::HtmlFetcher;
use providers::synthesis::{AskFnWrapper, LlmSynthesizer};
use utils::ensure_writable_parent;

type LivePipeline = Pipeline<RssFeedSource, OpenAiEmbedder, HtmlFetcher, LlmSynthesizer<AskFnWrapper>>;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    debug!(?args.command, ?args.config, snapshot = %args.snapshot, "Parsed CLI arguments");

    let mut config = BriefingConfig::load(args.config.as_deref())?;
    config.apply_overrides(&args);
    config.validate()?;
    let snapshot_path = PathBuf::from(&args.snapshot);

    match args.command {
        Command::Show => {
            let snapshot = read_snapshot(&snapshot_path).await;
            println!("{}", snapshot_to_markdown(snapshot.as_ref()));
        }
        Command::Inspect => inspect(&config, &args, &snapshot_path).await?,
        Command::Run => {
            let pipeline = build_pipeline(&config, &args, &snapshot_path).await?;
            let outcome = pipeline.run_once().await?;
            info!(?outcome, "Run complete");
        }
        Command::Serve => {
            let pipeline = build_pipeline(&config, &args, &snapshot_path).await?;
            let (tx, rx) = mpsc::channel(1);
            #[cfg(unix)]
            tokio::spawn(forward_manual_triggers(tx));
            #[cfg(not(unix))]
            drop(tx);

            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Cannot listen for Ctrl-C; running until killed");
                    std::future::pending::<()>().await;
                }
            };
            pipeline.serve(rx, shutdown).await;
        }
    }

    Ok(())
}

/// Build the live pipeline from configuration. Every collaborator receives
/// its own settings here; nothing is configured globally.
#[instrument(level = "info", skip_all)]
async fn build_pipeline(
    config: &BriefingConfig,
    args: &Cli,
    snapshot_path: &Path,
) -> Result<LivePipeline, Box<dyn Error>> {
    if let Err(e) = ensure_writable_parent(snapshot_path).await {
        error!(
            path = %snapshot_path.display(),
            error = %e,
            "Snapshot directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    if config.feeds.is_empty() {
        warn!("No feeds configured; every run will find zero articles");
    }

    let template = template::load_template(&config.synthesis.template).await?;
    info!(template = %config.synthesis.template, "Loaded template");
    let conf_file = match &args.llm_config {
        Some(path) => PathBuf::from(path),
        None => config_dir()?.join("config.yaml"),
    };
    let config_path = conf_file.to_str().ok_or("Not a valid config filename")?;
    let llm_config = awful_aj::config::load_config(config_path)?;
    info!(config_path, "Loaded LLM configuration");

    let feeds = RssFeedSource::new(config.feeds.clone(), Duration::from_secs(config.fetch.timeout_secs))?;
    let embedder = OpenAiEmbedder::new(&config.embedding, args.embedding_api_key.clone())?;
    let fetcher = HtmlFetcher::new(&config.fetch)?;
    let synthesizer = LlmSynthesizer::new(
        AskFnWrapper {
            config: llm_config,
            template,
        },
        config.synthesis.max_source_chars,
    );

    Ok(Pipeline::new(config, feeds, embedder, fetcher, synthesizer, snapshot_path))
}

/// Turn `SIGUSR1` into manual-run requests. At most one request is queued
/// behind the run in flight; extra signals are dropped.
#[cfg(unix)]
async fn forward_manual_triggers(tx: mpsc::Sender<()>) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGUSR1; manual triggers disabled");
            return;
        }
    };
    while usr1.recv().await.is_some() {
        info!("SIGUSR1 received; requesting a manual run");
        if tx.try_send(()).is_err() {
            warn!("A manual run is already queued; ignoring signal");
        }
    }
}

/// Re-embed the articles of the latest snapshot and print how the current
/// clustering parameters partition them.
#[instrument(level = "info", skip_all)]
async fn inspect(config: &BriefingConfig, args: &Cli, snapshot_path: &Path) -> Result<(), Box<dyn Error>> {
    let Some(snapshot) = read_snapshot(snapshot_path).await else {
        println!("{WAITING_MESSAGE}");
        return Ok(());
    };
    let articles = &snapshot.all_articles;
    info!(count = articles.len(), "Inspecting snapshot articles");

    let embedder = OpenAiEmbedder::new(&config.embedding, args.embedding_api_key.clone())?;
    let clusterer = ArticleClusterer::new(embedder, config.clustering.clone());
    let points = clusterer.embed(articles).await;
    if points.is_empty() {
        return Err("No vectors returned by the embedding provider".into());
    }

    let distances = distance_matrix(&points);
    let preview = points.len().min(5);
    println!("--- Pairwise cosine distances (first {preview}x{preview}) ---");
    for (i, row) in distances.iter().take(preview).enumerate() {
        let cells: Vec<String> = row.iter().take(preview).map(|d| format!("{d:.3}")).collect();
        println!("Art {i}: [{}]  {}", cells.join(", "), utils::truncate_for_log(&points[i].article.title, 50));
    }
    if let Some(stats) = distance_stats(&distances) {
        println!(
            "\nStats over {} pairs: min={:.3} max={:.3} mean={:.3} median={:.3}",
            stats.pairs, stats.min, stats.max, stats.mean, stats.median
        );
    }

    let params = clusterer.params();
    let clusters = cluster_embedded(&points, params.eps, params.min_pts);
    println!(
        "\n--- Clustering with eps={} min_pts={}: {} clusters ---",
        params.eps,
        params.min_pts,
        clusters.len()
    );
    for (i, cluster) in clusters.iter().enumerate() {
        println!("--- Cluster {i} (size {}) ---", cluster.len());
        for article in cluster {
            println!("   > {} ({})", article.title, article.source);
        }
    }

    let threshold = config.selection.significant_threshold;
    let significant = clusters.iter().filter(|c| c.len() >= threshold).count();
    println!("\nSignificant clusters (>= {threshold}): {significant}");
    Ok(())
}

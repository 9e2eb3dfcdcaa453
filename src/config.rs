//! Pipeline configuration loaded from a YAML file.
//!
//! Every field has a default, so an empty (or missing) file yields a working
//! configuration. Command-line flags are layered on top via
//! [`BriefingConfig::apply_overrides`].
//!
//! ```yaml
//! feeds:
//!   - https://feeds.bbci.co.uk/news/rss.xml
//!   - https://www.theguardian.com/world/rss
//! clustering:
//!   eps: 0.2
//!   min_pts: 3
//! pipeline:
//!   window_hours: 1.0
//!   interval_minutes: 15
//! ```

use crate::cli::Cli;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument};

/// Longest accepted recency window: one year.
pub const MAX_WINDOW_HOURS: f64 = 24.0 * 365.0;
/// Longest accepted scheduling interval: one week.
pub const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Density clustering parameters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Maximum cosine distance for two articles to be neighbours.
    pub eps: f32,
    /// Minimum neighbourhood size (self included) for a core point.
    pub min_pts: usize,
    /// Number of summary characters appended to the title before embedding.
    pub summary_prefix_chars: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps: 0.25,
            min_pts: 3,
            summary_prefix_chars: 100,
        }
    }
}

/// Tier thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Cluster size at which a run is classified as a Trend.
    pub significant_threshold: usize,
    /// Smallest cluster size that still counts as Emerging.
    pub emerging_min: usize,
    /// How many recent articles a Fallback briefing uses.
    pub fallback_count: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            significant_threshold: 5,
            emerging_min: 2,
            fallback_count: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Only articles published within this many hours are considered.
    pub window_hours: f64,
    /// Delay between scheduled runs.
    pub interval_minutes: u64,
    /// Maximum number of article pages fetched per run.
    pub fetch_cap: usize,
    /// Maximum number of in-window articles kept in the snapshot.
    pub all_articles_cap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_hours: 1.0,
            interval_minutes: 15,
            fetch_cap: 5,
            all_articles_cap: 50,
        }
    }
}

/// Settings for the OpenAI-compatible embeddings endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL; `/embeddings` is appended.
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            model: "nomic-embed-text".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Extracted page text is cut to this many characters.
    pub max_chars: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_chars: 10_000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Name of the `awful_aj` chat template used for the briefing.
    pub template: String,
    /// Per-source character budget inside the prompt.
    pub max_source_chars: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            template: "news_briefing".to_string(),
            max_source_chars: 8_000,
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BriefingConfig {
    /// RSS or Atom feed URLs to poll.
    pub feeds: Vec<String>,
    pub clustering: ClusteringConfig,
    pub selection: SelectionConfig,
    pub pipeline: PipelineConfig,
    pub embedding: EmbeddingConfig,
    pub fetch: FetchConfig,
    pub synthesis: SynthesisConfig,
}

impl BriefingConfig {
    /// Load configuration from a YAML file, falling back to defaults when no
    /// path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given; using defaults");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        info!(feeds = config.feeds.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not to a map.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Apply command-line overrides on top of the file values.
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(eps) = cli.eps {
            self.clustering.eps = eps;
        }
        if let Some(min_pts) = cli.min_pts {
            self.clustering.min_pts = min_pts;
        }
        if let Some(hours) = cli.window_hours {
            self.pipeline.window_hours = hours;
        }
        if let Some(minutes) = cli.interval_minutes {
            self.pipeline.interval_minutes = minutes;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.clustering;
        if !c.eps.is_finite() || c.eps <= 0.0 || c.eps > 2.0 {
            return Err(ConfigError::Invalid(format!(
                "clustering.eps must be in (0, 2], got {}",
                c.eps
            )));
        }
        if c.min_pts == 0 {
            return Err(ConfigError::Invalid("clustering.min_pts must be at least 1".into()));
        }
        let s = &self.selection;
        if s.emerging_min < 2 || s.emerging_min > s.significant_threshold {
            return Err(ConfigError::Invalid(format!(
                "selection.emerging_min must be in [2, {}], got {}",
                s.significant_threshold, s.emerging_min
            )));
        }
        if s.fallback_count == 0 {
            return Err(ConfigError::Invalid("selection.fallback_count must be positive".into()));
        }
        let p = &self.pipeline;
        if !p.window_hours.is_finite() || p.window_hours <= 0.0 || p.window_hours > MAX_WINDOW_HOURS {
            return Err(ConfigError::Invalid(format!(
                "pipeline.window_hours must be in (0, {MAX_WINDOW_HOURS}], got {}",
                p.window_hours
            )));
        }
        if p.interval_minutes == 0 || p.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "pipeline.interval_minutes must be in [1, {MAX_INTERVAL_MINUTES}], got {}",
                p.interval_minutes
            )));
        }
        if p.fetch_cap == 0 || p.all_articles_cap == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.fetch_cap and all_articles_cap must be positive".into(),
            ));
        }
        Ok(())
    }
}

//! Command-line interface definitions for Awful News Briefing.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Secrets can be provided via environment variables; pipeline tuning lives in
//! the YAML config file and can be overridden here.

use clap::{Parser, Subcommand};

/// Command-line arguments for the Awful News Briefing application.
///
/// # Examples
///
/// ```sh
/// # One run against the feeds in briefing.yaml
/// awful_news_briefing -c briefing.yaml run
///
/// # Scheduled mode, every 10 minutes over a 6 hour window
/// awful_news_briefing -c briefing.yaml --window-hours 6 --interval-minutes 10 serve
///
/// # Print the latest briefing
/// awful_news_briefing show
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to the pipeline config YAML file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path of the briefing snapshot JSON document
    #[arg(short, long, global = true, default_value = "briefing_data.json")]
    pub snapshot: String,

    /// Optional path to the awful_aj config.yaml used for synthesis
    #[arg(long, global = true)]
    pub llm_config: Option<String>,

    /// API key for the embeddings endpoint
    #[arg(long, env = "EMBEDDING_API_KEY", global = true, hide_env_values = true)]
    pub embedding_api_key: Option<String>,

    /// Override clustering.eps (maximum cosine distance between neighbours)
    #[arg(long, global = true)]
    pub eps: Option<f32>,

    /// Override clustering.min_pts (minimum neighbourhood size for a core point)
    #[arg(long, global = true)]
    pub min_pts: Option<usize>,

    /// Override pipeline.window_hours
    #[arg(long, global = true)]
    pub window_hours: Option<f64>,

    /// Override pipeline.interval_minutes
    #[arg(long, global = true)]
    pub interval_minutes: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the pipeline once and write a new snapshot
    Run,
    /// Run the pipeline on a fixed interval until interrupted
    Serve,
    /// Print the latest snapshot as Markdown
    Show,
    /// Re-cluster the articles of the latest snapshot and print distance statistics
    Inspect,
}

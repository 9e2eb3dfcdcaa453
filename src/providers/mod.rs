//! External collaborators of the briefing pipeline.
//!
//! Each collaborator sits behind a small trait so the pipeline can be driven
//! by fakes in tests. All of them degrade instead of failing the run:
//!
//! | Collaborator | Module | Failure behaviour |
//! |--------------|--------|-------------------|
//! | [`FeedSource`] | [`feeds`] | broken feeds are logged and skipped |
//! | [`Embedder`] | [`embeddings`] | error is swallowed by the clusterer |
//! | [`ContentFetcher`] | [`scraper`] | failed URLs are absent from the map |
//! | [`Synthesizer`] | [`synthesis`] | returns a placeholder string |

use crate::models::{Article, FetchedContent};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub mod embeddings;
pub mod feeds;
pub mod scraper;
pub mod synthesis;

/// Errors raised by HTTP-backed collaborators before they are degraded.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("provider returned no vectors")]
    Empty,
    #[error("provider returned {got} vectors for {expected} inputs")]
    LengthMismatch { expected: usize, got: usize },
}

/// Supplies the articles published inside a recency window.
pub trait FeedSource {
    /// Collect every article published within `window` of now. Articles
    /// without a parseable date or link never reach the caller.
    async fn collect(&self, window: Duration) -> Vec<Article>;
}

/// Maps a batch of texts to embedding vectors.
pub trait Embedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Downloads article pages and extracts their readable text.
pub trait ContentFetcher {
    async fn fetch(&self, urls: &[Url]) -> FetchedContent;
}

/// Turns fetched article text into a briefing.
pub trait Synthesizer {
    /// Never fails: returns [`synthesis::NO_CONTENT`] for empty input and
    /// [`synthesis::SYNTHESIS_FAILED`] when the model call fails.
    async fn synthesize(&self, content: &FetchedContent) -> String;
}

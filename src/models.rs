//! Data models for feed articles and the persisted briefing snapshot.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Article`]: A single feed entry, normalized to a UTC publish instant
//! - [`Tier`]: The priority classification assigned to a pipeline run
//! - [`BriefingSnapshot`]: The single JSON document written by each run
//! - [`FetchedContent`]: Scraped page text keyed by URL

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Scraped article text keyed by the URL it was fetched from.
///
/// URLs that failed to fetch are simply absent.
pub type FetchedContent = BTreeMap<String, String>;

/// A news article as collected from an RSS or Atom feed.
///
/// Articles are built once by the feed source and never mutated afterwards;
/// every later stage works on clones or references.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Article {
    /// Stable identifier: the feed's `guid`/`id`, or the link when absent.
    pub id: String,
    /// The headline.
    pub title: String,
    /// The feed-provided summary or description (may contain HTML).
    pub summary: String,
    /// Canonical link to the full story.
    pub link: Url,
    /// Human-readable name of the feed the article came from.
    pub source: String,
    /// Publication instant, always normalized to UTC.
    pub published: DateTime<Utc>,
}

impl Article {
    /// Text handed to the embedding provider: the title followed by the first
    /// `prefix_chars` characters of the summary.
    pub fn embedding_text(&self, prefix_chars: usize) -> String {
        let prefix: String = self.summary.chars().take(prefix_chars).collect();
        format!("{} {}", self.title, prefix)
    }
}

/// Priority tier of a pipeline run, derived from the strongest cluster found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Tier {
    /// A cluster reached the significant-size threshold.
    Trend,
    /// Only smaller clusters were found.
    Emerging,
    /// No cluster at all; the most recent articles are briefed instead.
    Fallback,
}

impl Tier {
    /// Heading shown to readers for this kind of briefing.
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::Trend => "Trending Narrative",
            Tier::Emerging => "Emerging Topic",
            Tier::Fallback => "Latest News Snapshot",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tier::Trend => "Trend",
            Tier::Emerging => "Emerging",
            Tier::Fallback => "Fallback",
        };
        f.write_str(label)
    }
}

/// The persisted output of one pipeline run.
///
/// Each run overwrites the previous snapshot; readers tolerate its absence.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BriefingSnapshot {
    /// When the run finished, serialized as RFC 3339 with full precision.
    pub timestamp: DateTime<Utc>,
    /// Which tier produced the briefing.
    pub briefing_type: Tier,
    /// Synthesized briefing text, or one of the synthesis placeholders.
    pub briefing: String,
    /// The articles the briefing was built from.
    pub sources: Vec<Article>,
    /// Number of selected source articles.
    pub trend_size: usize,
    /// Every in-window article, most recent first, capped for display.
    pub all_articles: Vec<Article>,
}

impl BriefingSnapshot {
    /// Assemble a snapshot, ordering `all_articles` most recent first and
    /// keeping at most `all_articles_cap` of them.
    pub fn new(
        timestamp: DateTime<Utc>,
        briefing_type: Tier,
        briefing: String,
        sources: Vec<Article>,
        mut all_articles: Vec<Article>,
        all_articles_cap: usize,
    ) -> Self {
        all_articles.sort_by(|a, b| b.published.cmp(&a.published));
        all_articles.truncate(all_articles_cap);
        Self {
            timestamp,
            briefing_type,
            briefing,
            trend_size: sources.len(),
            sources,
            all_articles,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{Duration, TimeZone};

    /// Build an article published `minutes_ago` minutes before a fixed instant.
    pub fn article(n: usize, title: &str, minutes_ago: i64) -> Article {
        let base = Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap();
        let link = Url::parse(&format!("https://news.example.com/story/{n}")).unwrap();
        Article {
            id: link.to_string(),
            title: title.to_string(),
            summary: format!("Summary of {title}"),
            link,
            source: "Example Wire".to_string(),
            published: base - Duration::minutes(minutes_ago),
        }
    }
}

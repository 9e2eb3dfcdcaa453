//! RSS 2.0 and Atom feed polling.
//!
//! Feeds are fetched one after another, parsed with the `rss` crate (falling
//! back to `atom_syndication`) and turned into [`Article`]s. Entries are
//! dropped when they lack a link or a parseable date, or when they fall
//! outside the requested window.
//!
//! RSS dates are read from `pubDate`, then `dc:date`. Atom entries use
//! `published`, falling back to `updated`. Everything is normalized to UTC;
//! timestamps without an offset are assumed to already be UTC.

use super::FeedSource;
use crate::models::Article;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A document that parses neither as RSS nor as Atom.
#[derive(Debug, thiserror::Error)]
#[error("not an RSS feed ({rss}) nor an Atom feed ({atom})")]
pub struct FeedParseError {
    rss: rss::Error,
    atom: atom_syndication::Error,
}

/// One `<item>` or `<entry>` before validation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedEntry {
    pub id: Option<String>,
    pub title: String,
    pub link: Option<String>,
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
}

/// A feed reduced to what the pipeline needs: its title and its entries in
/// document order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// Whether `published` lies in `[now - window, now]`.
pub fn within_window(published: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
    let after_cutoff = match now.checked_sub_signed(window) {
        Some(cutoff) => published >= cutoff,
        None => true,
    };
    after_cutoff && published <= now
}

/// Keep only the articles published in `[now - window, now]`.
pub fn filter_window(articles: Vec<Article>, now: DateTime<Utc>, window: Duration) -> Vec<Article> {
    articles
        .into_iter()
        .filter(|a| within_window(a.published, now, window))
        .collect()
}

/// Parse an RSS/Atom date string into UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Strip markup from a feed summary and collapse whitespace.
pub fn clean_summary(raw: &str) -> String {
    let without_tags = TAG_RE.replace_all(raw, " ");
    SPACE_RE.replace_all(without_tags.trim(), " ").into_owned()
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn rss_entry(item: &rss::Item) -> FeedEntry {
    let published = item.pub_date().and_then(parse_date).or_else(|| {
        item.dublin_core_ext()
            .and_then(|dc| dc.dates().iter().find_map(|d| parse_date(d)))
    });
    FeedEntry {
        id: item.guid().and_then(|g| non_empty(g.value())),
        title: item.title().unwrap_or_default().trim().to_string(),
        link: item.link().and_then(non_empty),
        summary: item
            .description()
            .or_else(|| item.content())
            .unwrap_or_default()
            .to_string(),
        published,
    }
}

fn atom_entry(entry: &atom_syndication::Entry) -> FeedEntry {
    let link = entry
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| entry.links().first())
        .and_then(|l| non_empty(l.href()));
    let published = entry
        .published()
        .unwrap_or_else(|| entry.updated())
        .with_timezone(&Utc);
    FeedEntry {
        id: non_empty(entry.id()),
        title: entry.title().as_str().trim().to_string(),
        link,
        summary: entry
            .summary()
            .map(|s| s.as_str())
            .or_else(|| entry.content().and_then(|c| c.value()))
            .unwrap_or_default()
            .to_string(),
        published: Some(published),
    }
}

/// Parse an RSS or Atom document.
pub fn parse_feed(body: &[u8]) -> Result<ParsedFeed, FeedParseError> {
    let rss = match rss::Channel::read_from(body) {
        Ok(channel) => {
            return Ok(ParsedFeed {
                title: non_empty(channel.title()),
                entries: channel.items().iter().map(rss_entry).collect(),
            });
        }
        Err(e) => e,
    };
    match atom_syndication::Feed::read_from(body) {
        Ok(feed) => Ok(ParsedFeed {
            title: non_empty(feed.title().as_str()),
            entries: feed.entries().iter().map(atom_entry).collect(),
        }),
        Err(atom) => Err(FeedParseError { rss, atom }),
    }
}

/// Turn parsed entries into articles. Entries without a resolvable link or
/// a parseable date are dropped.
pub fn entries_to_articles(feed: ParsedFeed, feed_url: &Url) -> Vec<Article> {
    let source = feed.title.unwrap_or_else(|| feed_url.to_string());
    feed.entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.link.as_deref().and_then(|l| feed_url.join(l).ok())?;
            let Some(published) = entry.published else {
                debug!(%link, "Dropping entry without a parseable date");
                return None;
            };
            Some(Article {
                id: entry.id.unwrap_or_else(|| link.to_string()),
                title: entry.title,
                summary: clean_summary(&entry.summary),
                link,
                source: source.clone(),
                published,
            })
        })
        .collect()
}

/// Polls a fixed list of RSS/Atom feed URLs.
#[derive(Debug, Clone)]
pub struct RssFeedSource {
    client: Client,
    feeds: Vec<String>,
}

impl RssFeedSource {
    /// Build a feed source with its own HTTP client.
    ///
    /// # Arguments
    ///
    /// * `feeds` - Feed URLs, polled in order
    /// * `timeout` - Per-request timeout
    pub fn new(feeds: Vec<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, feeds })
    }

    #[instrument(level = "info", skip(self), fields(%feed_url))]
    async fn fetch_feed(&self, feed_url: &str) -> Result<Vec<Article>, Box<dyn Error>> {
        let url = Url::parse(feed_url)?;
        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()).into());
        }
        let body = response.bytes().await?;
        let parsed = parse_feed(&body)?;
        Ok(entries_to_articles(parsed, &url))
    }
}

impl FeedSource for RssFeedSource {
    #[instrument(level = "info", skip_all, fields(feeds = self.feeds.len(), window_secs = window.as_secs()))]
    async fn collect(&self, window: Duration) -> Vec<Article> {
        let t0 = Instant::now();
        let now = Utc::now();

        let articles: Vec<Article> = stream::iter(self.feeds.iter())
            .then(|feed_url| async move {
                match self.fetch_feed(feed_url).await {
                    Ok(articles) => {
                        debug!(%feed_url, count = articles.len(), "Parsed feed");
                        articles
                    }
                    Err(e) => {
                        error!(%feed_url, error = %e, "Failed to process feed");
                        Vec::new()
                    }
                }
            })
            .concat()
            .await;

        let total = articles.len();
        let in_window = filter_window(articles, now, window);
        if in_window.is_empty() && total > 0 {
            warn!(total, "Every collected article fell outside the window");
        }
        info!(
            count = in_window.len(),
            dropped = total - in_window.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Collected in-window articles"
        );
        in_window
    }
}

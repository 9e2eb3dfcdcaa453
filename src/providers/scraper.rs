//! Article page fetching and text extraction.
//!
//! Pages are fetched one at a time with a per-request timeout. Only `200 OK`
//! responses are kept; anything else is logged and left out of the result.
//! Text extraction is deliberately simple: drop `script`, `style`, `nav`,
//! `footer`, `header` and `aside` subtrees, keep the remaining text nodes one
//! phrase per line.

use super::ContentFetcher;
use crate::config::FetchConfig;
use crate::models::FetchedContent;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use scraper::Html;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "nav", "footer", "header", "aside", "noscript"];

static PHRASE_BREAK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}|\n").unwrap());

/// Extract readable text from an HTML document, capped at `max_chars` characters.
pub fn extract_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let mut phrases: Vec<String> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let skipped = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if skipped {
            continue;
        }
        phrases.extend(
            PHRASE_BREAK_RE
                .split(text)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        );
    }

    phrases.join("\n").chars().take(max_chars).collect()
}

/// Downloads article pages one at a time and keeps their readable text.
/// Pages that fail or answer with anything but `200 OK` are left out.
#[derive(Debug, Clone)]
pub struct HtmlFetcher {
    client: Client,
    max_chars: usize,
}

impl HtmlFetcher {
    /// Build a fetcher with its own HTTP client.
    ///
    /// # Arguments
    ///
    /// * `config` - Request timeout, user agent and per-page character cap
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            max_chars: config.max_chars,
        })
    }

    #[instrument(level = "info", skip(self), fields(%url))]
    async fn fetch_page(&self, url: &Url) -> Result<Option<String>, Box<dyn Error>> {
        let response = self.client.get(url.clone()).send().await?;
        if response.status() != StatusCode::OK {
            warn!(status = %response.status(), "Page fetch rejected");
            return Ok(None);
        }
        let body = response.text().await?;
        let text = extract_text(&body, self.max_chars);
        debug!(chars = text.chars().count(), "Extracted page text");
        Ok(Some(text))
    }
}

impl ContentFetcher for HtmlFetcher {
    #[instrument(level = "info", skip_all, fields(count = urls.len()))]
    async fn fetch(&self, urls: &[Url]) -> FetchedContent {
        let pages: FetchedContent = stream::iter(urls)
            .then(|url| async move {
                match self.fetch_page(url).await {
                    Ok(Some(text)) if !text.is_empty() => Some((url.to_string(), text)),
                    Ok(_) => {
                        warn!(%url, "Page produced no content");
                        None
                    }
                    Err(e) => {
                        error!(%url, error = %e, "Page fetch failed");
                        None
                    }
                }
            })
            .filter_map(std::future::ready)
            .collect()
            .await;

        info!(requested = urls.len(), fetched = pages.len(), "Fetched article pages");
        pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><head><title>Story</title><style>body { color: red }</style></head>
<body>
  <header>Site header</header>
  <nav><a href="/">Home</a></nav>
  <article><h1>Rivers rise</h1><p>Water levels climbed    overnight.</p></article>
  <script>track()</script>
  <footer>Copyright</footer>
</body></html>"#;

    #[test]
    fn test_extract_text_drops_boilerplate() {
        let text = extract_text(PAGE, 10_000);
        assert!(text.contains("Rivers rise"));
        assert!(text.contains("Water levels climbed\novernight."));
        for boilerplate in ["Site header", "Home", "track()", "Copyright", "color: red"] {
            assert!(!text.contains(boilerplate), "{boilerplate} leaked into {text:?}");
        }
    }

    #[test]
    fn test_extract_text_is_capped() {
        let html = format!("<p>{}</p>", "ü".repeat(50));
        assert_eq!(extract_text(&html, 10).chars().count(), 10);
    }

    #[tokio::test]
    async fn test_failed_urls_are_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let fetcher = HtmlFetcher::new(&FetchConfig::default()).unwrap();
        let ok = Url::parse(&format!("{}/ok", server.uri())).unwrap();
        let gone = Url::parse(&format!("{}/gone", server.uri())).unwrap();
        let content = fetcher.fetch(&[ok.clone(), gone]).await;

        assert_eq!(content.len(), 1);
        assert!(content[ok.as_str()].contains("Rivers rise"));
    }
}

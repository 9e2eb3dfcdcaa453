//! Briefing synthesis through an OpenAI-compatible LLM.
//!
//! The module keeps a small trait-based design:
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AskFnWrapper`]: Wraps the `awful_aj` library's `ask` function
//! - [`LlmSynthesizer`]: Builds the prompt from fetched pages and maps every
//!   failure to a placeholder string
//!
//! There is no retry inside a run. A failed call yields
//! [`SYNTHESIS_FAILED`] and the next scheduled run tries again.

use super::Synthesizer;
use crate::models::FetchedContent;
use crate::utils::truncate_for_log;
use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use std::error::Error;
use std::fmt::Write;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Placeholder briefing when there was nothing to summarize.
pub const NO_CONTENT: &str = "No content to synthesize.";
/// Placeholder briefing when the model call failed.
pub const SYNTHESIS_FAILED: &str = "Error generating briefing.";

/// Trait for async LLM interaction.
///
/// Implementors send text to an LLM and receive a response. This abstraction
/// lets tests swap the real client for a canned one.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
///
/// Owns its configuration and template, so nothing is configured
/// process-wide.
#[derive(Debug)]
pub struct AskFnWrapper {
    /// LLM configuration (API keys, endpoints, model settings).
    pub config: AwfulJadeConfig,
    /// Chat template holding the system prompt for briefings.
    pub template: ChatTemplate,
}

impl AskAsync for AskFnWrapper {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(&self.config, text.to_string(), &self.template, None, None).await;
        let dt = t0.elapsed();

        match &res {
            Ok(_) => {}
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u128, error = %e, "API call failed"),
        }
        res
    }
}

/// Build the model input: one delimited block per source, each capped at
/// `max_source_chars` characters.
pub fn build_prompt(content: &FetchedContent, max_source_chars: usize) -> String {
    let mut prompt = String::new();
    for (idx, (url, text)) in content.iter().enumerate() {
        let body: String = text.chars().take(max_source_chars).collect();
        let _ = write!(prompt, "--- SOURCE {} ({}) ---\n{}\n\n", idx + 1, url, body);
    }
    prompt
}

/// [`Synthesizer`] that asks an LLM to write the briefing from the fetched
/// sources.
#[derive(Debug)]
pub struct LlmSynthesizer<A> {
    asker: A,
    max_source_chars: usize,
}

impl<A> LlmSynthesizer<A>
where
    A: AskAsync<Response = String>,
{
    /// # Arguments
    ///
    /// * `asker` - The LLM client, usually an [`AskFnWrapper`]
    /// * `max_source_chars` - Per-source cap applied when building the prompt
    pub fn new(asker: A, max_source_chars: usize) -> Self {
        Self {
            asker,
            max_source_chars,
        }
    }
}

impl<A> Synthesizer for LlmSynthesizer<A>
where
    A: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip_all, fields(sources = content.len()))]
    async fn synthesize(&self, content: &FetchedContent) -> String {
        if content.is_empty() {
            warn!("Nothing was fetched; skipping model call");
            return NO_CONTENT.to_string();
        }

        let t0 = Instant::now();
        let prompt = build_prompt(content, self.max_source_chars);
        match self.asker.ask(&prompt).await {
            Ok(briefing) if !briefing.trim().is_empty() => {
                info!(
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    preview = %truncate_for_log(&briefing, 120),
                    "Synthesized briefing"
                );
                briefing
            }
            Ok(_) => {
                error!("Model returned an empty briefing");
                SYNTHESIS_FAILED.to_string()
            }
            Err(e) => {
                error!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %e, "Synthesis failed");
                SYNTHESIS_FAILED.to_string()
            }
        }
    }
}

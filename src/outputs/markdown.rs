//! Markdown rendering of the latest briefing for the `show` command.
//!
//! When no snapshot exists yet the renderer produces an explicit waiting
//! message instead of an error.

use crate::models::{Article, BriefingSnapshot};
use std::fmt::Write;

/// Shown when no snapshot has been written yet (or it could not be read).
pub const WAITING_MESSAGE: &str = "Waiting for the first briefing...";

fn article_line(article: &Article) -> String {
    format!(
        "- [{}]({}) - *{}* ({})",
        article.title,
        article.link,
        article.source,
        article.published.format("%Y-%m-%d %H:%M")
    )
}

/// Render `snapshot`, or the waiting state when there is none.
pub fn snapshot_to_markdown(snapshot: Option<&BriefingSnapshot>) -> String {
    let Some(snapshot) = snapshot else {
        return format!(
            "# News Briefing\n\n{WAITING_MESSAGE}\n\nStart `awful_news_briefing serve` or trigger a run with `awful_news_briefing run`.\n"
        );
    };

    let mut md = String::new();
    let _ = writeln!(md, "# News Briefing\n");
    let _ = writeln!(
        md,
        "_Last updated: {}_\n",
        snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(md, "## {}\n", snapshot.briefing_type.display_name());
    let _ = writeln!(md, "{}\n", snapshot.briefing.trim());
    let _ = writeln!(md, "**Synthesized from {} sources**\n", snapshot.trend_size);

    let _ = writeln!(md, "### Briefing Sources\n");
    for article in &snapshot.sources {
        let _ = writeln!(md, "{}", article_line(article));
    }

    let _ = writeln!(md, "\n### Raw Feed (Latest)\n");
    if snapshot.all_articles.is_empty() {
        let _ = writeln!(md, "No raw articles data available.");
    }
    for article in &snapshot.all_articles {
        let _ = writeln!(md, "{}", article_line(article));
    }
    md
}

//! Output generation for the briefing snapshot.
//!
//! # Submodules
//!
//! - [`snapshot`]: Writes and reads the single JSON snapshot document
//! - [`markdown`]: Renders a snapshot (or the waiting state) as Markdown
//!
//! # Snapshot document
//!
//! ```text
//! {
//!   "timestamp": "2025-05-06T12:00:00.123456789Z",
//!   "briefing_type": "Trend",
//!   "briefing": "...",
//!   "sources": [ { "id": ..., "title": ..., "link": ..., ... } ],
//!   "trend_size": 6,
//!   "all_articles": [ ... at most 50, newest first ... ]
//! }
//! ```

pub mod markdown;
pub mod snapshot;

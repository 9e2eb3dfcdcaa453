//! Persistence of the single briefing snapshot document.
//!
//! The snapshot is overwritten by every successful run. Each write goes to
//! its own uniquely named temporary file in the target directory, which is
//! then renamed over the target, so readers never observe a half-written
//! document.
//!
//! Readers treat a missing, unreadable or corrupt document as "no snapshot".
//!
//! Runs in different processes coordinate through a [`SnapshotLock`], an
//! advisory lock on a `<snapshot>.lock` file next to the document.

use crate::models::BriefingSnapshot;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::error::Error;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Path of the lock file guarding `snapshot`.
pub fn lock_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("briefing"));
    name.push(".lock");
    snapshot.with_file_name(name)
}

/// Advisory, cross-process lock for everything that writes one snapshot.
///
/// The lock is held for as long as the guard returned by
/// [`SnapshotLock::try_acquire`] is alive. It is released by the OS if the
/// holder exits, so a crashed run never leaves it stuck.
pub struct SnapshotLock {
    file: RwLock<File>,
}

impl SnapshotLock {
    /// Open (creating if needed) the lock file for `snapshot`.
    ///
    /// # Arguments
    ///
    /// * `snapshot` - Path of the snapshot document the lock protects
    pub fn open(snapshot: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(parent_dir(snapshot))?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path(snapshot))?;
        Ok(Self {
            file: RwLock::new(file),
        })
    }

    /// Take the lock without blocking. `Ok(None)` means another holder, in
    /// this process or another, has it.
    pub fn try_acquire(&mut self) -> io::Result<Option<RwLockWriteGuard<'_, File>>> {
        match self.file.try_write() {
            Ok(guard) => Ok(Some(guard)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Write `snapshot` to `path`, replacing any previous snapshot.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_snapshot(snapshot: &BriefingSnapshot, path: &Path) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(snapshot)?;

    let dir = parent_dir(path).to_path_buf();
    if let Err(e) = fs::create_dir_all(&dir).await {
        error!(dir = %dir.display(), error = %e, "Failed to create snapshot dir");
        return Err(e.into());
    }

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".briefing-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await??;
    info!(
        briefing_type = %snapshot.briefing_type,
        trend_size = snapshot.trend_size,
        articles = snapshot.all_articles.len(),
        "Wrote briefing snapshot"
    );
    Ok(())
}

/// Read the snapshot at `path`, or `None` if there is no usable snapshot.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn read_snapshot(path: &Path) -> Option<BriefingSnapshot> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No snapshot yet");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Snapshot unreadable; treating as absent");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(error = %e, "Snapshot is corrupt; treating as absent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::article;
    use crate::models::{Article, Tier};
    use chrono::{TimeZone, Utc};

    fn snapshot(article_count: usize) -> BriefingSnapshot {
        let all: Vec<Article> = (0..article_count)
            .map(|i| article(i, &format!("Story {i}"), i as i64))
            .collect();
        let timestamp = Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        BriefingSnapshot::new(
            timestamp,
            Tier::Trend,
            "## Rivers rise\nDetails.".into(),
            all[..6.min(article_count)].to_vec(),
            all,
            50,
        )
    }

    #[tokio::test]
    async fn test_round_trip_preserves_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("briefing_data.json");
        let original = snapshot(73);

        write_snapshot(&original, &path).await.unwrap();
        let loaded = read_snapshot(&path).await.unwrap();

        assert_eq!(loaded, original);
        assert_eq!(loaded.all_articles.len(), 50);
        assert_eq!(loaded.timestamp.timestamp_subsec_nanos(), 123_456_789);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|name| name != "briefing_data.json")
            .collect();
        assert!(leftovers.is_empty(), "temporary files left behind: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_concurrent_writers_never_corrupt_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("briefing_data.json");
        let first = snapshot(60);
        let mut second = snapshot(4);
        second.briefing_type = Tier::Emerging;

        let (a, b) = tokio::join!(write_snapshot(&first, &path), write_snapshot(&second, &path));
        a.unwrap();
        b.unwrap();

        let loaded = read_snapshot(&path).await.unwrap();
        assert!(loaded == first || loaded == second);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("briefing_data.json");
        write_snapshot(&snapshot(3), &path).await.unwrap();

        // A directory in place of the target makes the final rename fail.
        let blocked = dir.path().join("blocked.json");
        std::fs::create_dir(&blocked).unwrap();
        assert!(write_snapshot(&snapshot(3), &blocked).await.is_err());

        assert_eq!(read_snapshot(&path).await.unwrap(), snapshot(3));
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
    }

    #[test]
    fn test_lock_is_exclusive_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/briefing_data.json");
        assert_eq!(lock_path(&path), dir.path().join("out/briefing_data.json.lock"));

        let mut first = SnapshotLock::open(&path).unwrap();
        let mut second = SnapshotLock::open(&path).unwrap();

        let held = first.try_acquire().unwrap();
        assert!(held.is_some());
        assert!(second.try_acquire().unwrap().is_none());
        drop(held);
        assert!(second.try_acquire().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_document_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/briefing.json");
        write_snapshot(&snapshot(3), &path).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        for field in ["timestamp", "briefing_type", "briefing", "sources", "trend_size", "all_articles"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["briefing_type"], "Trend");
        assert_eq!(value["trend_size"], 3);
    }

    #[tokio::test]
    async fn test_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("briefing_data.json");
        write_snapshot(&snapshot(10), &path).await.unwrap();
        let mut newer = snapshot(2);
        newer.briefing_type = Tier::Fallback;
        write_snapshot(&newer, &path).await.unwrap();

        assert_eq!(read_snapshot(&path).await.unwrap(), newer);
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_read_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("briefing_data.json");
        assert!(read_snapshot(&path).await.is_none());

        std::fs::write(&path, "{\"timestamp\": \"not a").unwrap();
        assert!(read_snapshot(&path).await.is_none());
    }
}

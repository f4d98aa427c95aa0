use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// The per-recipient learning-mode spool.
///
/// A recipient is "in learning mode" while a zero-length marker file exists
/// under the spool directory and its mtime is younger than the configured
/// learning period. There is no reaper: staleness is a pure function of
/// mtime, checked lazily on each query, never eagerly swept. Adding a reaper
/// would race a user's pending `allow`/`swallow`/`deny` that still expects
/// the marker to be there for it to remove.
pub struct LearningSpool {
    spool_dir: PathBuf,
    learning_period: Duration,
}

impl LearningSpool {
    pub fn new(spool_dir: impl Into<PathBuf>, learning_period_minutes: u64) -> Self {
        LearningSpool {
            spool_dir: spool_dir.into(),
            learning_period: Duration::from_secs(learning_period_minutes * 60),
        }
    }

    fn marker_path(&self, recipient: &str) -> PathBuf {
        self.spool_dir.join(recipient)
    }

    /// True iff the marker exists and its mtime is within the learning
    /// window of now.
    pub fn is_learning(&self, recipient: &str) -> std::io::Result<bool> {
        let path = self.marker_path(recipient);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        let mtime = metadata.modified()?;
        let age = SystemTime::now()
            .duration_since(mtime)
            .unwrap_or(Duration::ZERO);
        Ok(age < self.learning_period)
    }

    /// Creates the marker if absent, or refreshes its mtime if present,
    /// restarting the learning window either way.
    pub fn begin_learning(&self, recipient: &str) -> std::io::Result<()> {
        let path = self.marker_path(recipient);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().write(true).create(true).open(&path)?;
        file.set_modified(SystemTime::now())?;
        Ok(())
    }

    /// Deletes the marker if present; never fails if it's already absent.
    pub fn end_learning(&self, recipient: &str) -> std::io::Result<()> {
        match fs::remove_file(self.marker_path(recipient)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    #[test]
    fn absent_marker_is_not_learning() {
        let dir = tempdir().unwrap();
        let spool = LearningSpool::new(dir.path(), 30);
        assert!(!spool.is_learning("r").unwrap());
    }

    #[test]
    fn begin_learning_creates_marker_and_is_learning() {
        let dir = tempdir().unwrap();
        let spool = LearningSpool::new(dir.path(), 30);
        spool.begin_learning("r").unwrap();
        assert!(spool.is_learning("r").unwrap());
    }

    #[test]
    fn stale_marker_is_no_longer_learning() {
        let dir = tempdir().unwrap();
        let spool = LearningSpool::new(dir.path(), 30);
        spool.begin_learning("r").unwrap();
        let path = dir.path().join("r");
        let stale = SystemTime::now() - StdDuration::from_secs(30 * 60 + 1);
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(stale).unwrap();
        assert!(!spool.is_learning("r").unwrap());
    }

    #[test]
    fn end_learning_removes_marker_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let spool = LearningSpool::new(dir.path(), 30);
        spool.begin_learning("r").unwrap();
        spool.end_learning("r").unwrap();
        assert!(!spool.is_learning("r").unwrap());
        // Calling again on an absent marker must not fail.
        spool.end_learning("r").unwrap();
    }

    #[test]
    fn repeated_learn_restarts_the_window() {
        let dir = tempdir().unwrap();
        let spool = LearningSpool::new(dir.path(), 30);
        spool.begin_learning("r").unwrap();
        let path = dir.path().join("r");
        let almost_stale = SystemTime::now() - StdDuration::from_secs(30 * 60 - 5);
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(almost_stale).unwrap();
        assert!(spool.is_learning("r").unwrap());
        spool.begin_learning("r").unwrap();
        assert!(spool.is_learning("r").unwrap());
    }
}

//! Per-run log file
//!
//! Every invocation writes its own log file so that the object store upload
//! can carry the diagnostics of exactly one run. The binary creates the
//! file at start-up, hands a writer to the tracing subscriber, and passes
//! the handle to the driver, which removes the file when the run ends.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Name under which the run log is uploaded next to the output directory
pub const RUN_LOG_UPLOAD_NAME: &str = "wphase.log";

/// Handle to the current run's log file
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
    file: Arc<File>,
}

impl RunLog {
    /// Create (or truncate) the run log at `path`
    pub fn create<P: Into<PathBuf>>(path: P) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self {
            path,
            file: Arc::new(file),
        })
    }

    /// Location of the log file on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writer for a `tracing_subscriber::fmt` layer
    ///
    /// `Arc<File>` implements `MakeWriter` because `&File` is `Write`.
    pub fn make_writer(&self) -> Arc<File> {
        Arc::clone(&self.file)
    }

    /// Whether the log file is still present
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the log file; a missing file or a failed removal is ignored
    pub fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Run log removed: {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!("Run log removal failed for {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_create_write_remove() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("run.log");

        let run_log = RunLog::create(&path).unwrap();
        let writer = run_log.make_writer();
        (&*writer).write_all(b"first line\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first line\n");

        run_log.remove();
        assert!(!run_log.exists());

        // Second removal is a no-op
        run_log.remove();
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run.log");
        std::fs::write(&path, "stale output from an earlier run").unwrap();

        let run_log = RunLog::create(&path).unwrap();
        assert_eq!(std::fs::read_to_string(run_log.path()).unwrap(), "");
    }
}

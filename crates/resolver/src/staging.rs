//! Short-lived temp files for fetched content.
//!
//! A staged file only exists to give the payload a name on disk. It is removed by
//! a detached task once the cleanup delay has passed. Files still waiting for
//! that task are tracked so [`FileStager::purge_pending`] can remove them when
//! the process stops before the delay runs out.

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Prefix of every staged file name.
pub const TEMP_FILE_PREFIX: &str = "ipfsfile-";

/// A payload written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Final file name, e.g. `ipfsfile-a1B2c3`.
    pub name: String,
    pub path: PathBuf,
}

/// Writes payloads to uniquely named temp files and schedules their removal.
#[derive(Debug, Clone)]
pub struct FileStager {
    dir: Option<PathBuf>,
    cleanup_delay: Duration,
    /// Staged files whose removal has not run yet. Shared between clones.
    pending: Arc<Mutex<HashSet<PathBuf>>>,
}

impl FileStager {
    /// `dir` defaults to the OS temp directory.
    pub fn new(dir: Option<PathBuf>, cleanup_delay: Duration) -> Self {
        Self {
            dir,
            cleanup_delay,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Write `payload` to a new temp file. The file survives until
    /// [`FileStager::schedule_removal`] deletes it.
    pub async fn stage(&self, payload: Bytes) -> io::Result<StagedFile> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || write_temp_file(dir.as_deref(), &payload))
            .await
            .map_err(io::Error::other)?
    }

    /// Remove `path` after the cleanup delay on a detached task. Failures are
    /// logged only.
    pub fn schedule_removal(&self, path: PathBuf) -> JoinHandle<()> {
        self.pending.lock().insert(path.clone());

        let delay = self.cleanup_delay;
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Already gone if purge_pending ran first.
            if !pending.lock().remove(&path) {
                return;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("removed staged file {}", path.display()),
                Err(err) => warn!("Error removing file {}: {}", path.display(), err),
            }
        })
    }

    /// Number of staged files still waiting for their removal task.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Remove every staged file whose removal has not run yet and return how
    /// many were removed. Needs no runtime, so it also works after shutdown.
    pub fn purge_pending(&self) -> usize {
        let paths: Vec<PathBuf> = self.pending.lock().drain().collect();

        let mut removed = 0;
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!("Error removing file {}: {}", path.display(), err),
            }
        }
        removed
    }
}

fn write_temp_file(dir: Option<&Path>, payload: &[u8]) -> io::Result<StagedFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_FILE_PREFIX);
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };

    file.write_all(payload)?;
    file.flush()?;

    // Dropping a NamedTempFile before this point removes it again.
    let (_, path) = file.keep().map_err(|err| err.error)?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::other("temp file has no name"))?;

    Ok(StagedFile { name, path })
}

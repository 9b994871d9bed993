//! Chunked loader - background fill of a window
//!
//! A load validates the requested range up front, then spawns one tokio task
//! that reads the range in bounded chunks. Each chunk is read without holding
//! the window lock and appended under the write lock, after which the progress
//! channel is advanced. Observers therefore never see progress ahead of the
//! buffer.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{EditorError, Result};
use crate::window::Window;

/// Where a load currently stands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    /// Nothing loaded yet
    #[default]
    Idle,
    /// Background task still filling the window
    Loading,
    /// Every byte of the window has been read
    Loaded,
    /// Load aborted by the caller, buffer released
    Cancelled,
    /// Read error, buffer released
    Failed(String),
}

/// Progress of the current load, published over a watch channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadProgress {
    pub bytes_loaded: u64,
    pub total: u64,
    pub status: LoadStatus,
}

impl LoadProgress {
    pub(crate) fn loading(total: u64) -> Self {
        Self {
            bytes_loaded: 0,
            total,
            status: LoadStatus::Loading,
        }
    }

    pub(crate) fn loaded(total: u64) -> Self {
        Self {
            bytes_loaded: total,
            total,
            status: LoadStatus::Loaded,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.status == LoadStatus::Loaded && self.bytes_loaded == self.total
    }

    pub fn is_loading(&self) -> bool {
        self.status == LoadStatus::Loading
    }

    /// Fraction of the window read so far, 1.0 for an empty window
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.bytes_loaded as f64 / self.total as f64
        }
    }
}

/// Validated load parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    pub path: PathBuf,
    pub file_size: u64,
    pub start: u64,
    pub len: u64,
}

impl LoadPlan {
    /// Check `start` against the file size and clamp `length`
    ///
    /// A `length` of zero means "to the end of the file". An empty file can
    /// only be loaded from offset zero and yields an empty window.
    pub fn new(path: impl Into<PathBuf>, file_size: u64, start: u64, length: u64) -> Result<Self> {
        let path = path.into();
        debug!(path = %path.display(), file_size, start, length, "LoadPlan::new: called");
        let empty_file = file_size == 0 && start == 0;
        if start >= file_size && !empty_file {
            debug!("LoadPlan::new: start beyond end of file");
            return Err(EditorError::InvalidRange { start, file_size });
        }

        let available = file_size - start;
        let len = if length == 0 || length > available {
            available
        } else {
            length
        };

        Ok(Self {
            path,
            file_size,
            start,
            len,
        })
    }
}

/// Size of the next chunk when `done` of `total` bytes have been moved
pub(crate) fn next_chunk_len(done: u64, total: u64, chunk_size: usize) -> usize {
    (total - done).min(chunk_size.max(1) as u64) as usize
}

/// Open `path` and read its size
pub(crate) async fn open_source(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path)
        .await
        .map_err(|e| EditorError::not_accessible(path, e))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|e| EditorError::not_accessible(path, e))?;
    if !metadata.is_file() {
        return Err(EditorError::not_accessible(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    Ok((file, metadata.len()))
}

/// Handle to an in-flight fill task
#[derive(Debug)]
pub(crate) struct LoadTask {
    handle: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
}

impl LoadTask {
    /// Spawn the fill task for a window already reset to `plan`
    pub(crate) fn spawn(
        file: File,
        plan: LoadPlan,
        chunk_size: usize,
        window: Arc<RwLock<Window>>,
        progress: Arc<watch::Sender<LoadProgress>>,
    ) -> Self {
        debug!(path = %plan.path.display(), len = plan.len, chunk_size, "LoadTask::spawn: called");
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();

        let handle = tokio::spawn(async move {
            let outcome = fill(file, &plan, chunk_size, &window, &progress, &flag).await;
            match outcome {
                Ok(true) => {
                    info!(path = %plan.path.display(), start = plan.start, len = plan.len, "Window loaded");
                    progress.send_replace(LoadProgress::loaded(plan.len));
                }
                Ok(false) => {
                    debug!(path = %plan.path.display(), "LoadTask: cancelled between chunks");
                    window.write().await.release();
                    progress.send_modify(|p| p.status = LoadStatus::Cancelled);
                }
                Err(e) => {
                    warn!(path = %plan.path.display(), error = %e, "LoadTask: read failed");
                    window.write().await.release();
                    progress.send_modify(|p| p.status = LoadStatus::Failed(e.to_string()));
                }
            }
        });

        Self { handle, cancel }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Ask the task to stop after the current chunk and wait for it
    pub(crate) async fn cancel(self) {
        debug!("LoadTask::cancel: called");
        self.cancel.store(true, Ordering::Release);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "LoadTask::cancel: fill task did not finish cleanly");
        }
    }

    /// Stop the task without waiting
    pub(crate) fn abort(&self) {
        self.cancel.store(true, Ordering::Release);
        self.handle.abort();
    }
}

/// Read the window in chunks; returns `Ok(false)` when cancelled
async fn fill(
    mut file: File,
    plan: &LoadPlan,
    chunk_size: usize,
    window: &RwLock<Window>,
    progress: &watch::Sender<LoadProgress>,
    cancel: &AtomicBool,
) -> std::io::Result<bool> {
    file.seek(SeekFrom::Start(plan.start)).await?;

    let mut loaded = 0u64;
    let mut chunk = Vec::with_capacity(next_chunk_len(0, plan.len, chunk_size));
    while loaded < plan.len {
        if cancel.load(Ordering::Acquire) {
            return Ok(false);
        }

        let block = next_chunk_len(loaded, plan.len, chunk_size);
        chunk.resize(block, 0);
        file.read_exact(&mut chunk).await?;

        window.write().await.append_chunk(&chunk);
        loaded += block as u64;
        progress.send_modify(|p| p.bytes_loaded = loaded);
        debug!(loaded, total = plan.len, "fill: chunk appended");
    }

    Ok(true)
}

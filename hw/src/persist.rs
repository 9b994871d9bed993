//! Persistence engine - write a window back to disk
//!
//! Every save goes through a sibling temporary file that is fully written,
//! synced and closed before it is renamed over the destination. The rename is
//! the only step that touches the destination, so a failed save leaves it (and
//! the source, for in-place saves) exactly as it was.
//!
//! When the window does not cover the whole source file, the untouched prefix
//! and suffix are streamed from the source in bounded chunks around the
//! edited bytes.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::loader::next_chunk_len;
use crate::window::Window;

/// Sibling temp path used while writing `destination`
pub fn temp_path_for(destination: &Path, suffix: &str) -> Result<PathBuf> {
    let name = destination.file_name().ok_or_else(|| {
        EditorError::not_accessible(
            destination,
            io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name"),
        )
    })?;
    let mut temp_name = name.to_os_string();
    temp_name.push(suffix);
    Ok(destination.with_file_name(temp_name))
}

/// Whether two paths name the same file
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// The file a save actually replaces
///
/// Symlinks are followed so the rename lands next to, and over, the real
/// file instead of swapping the link for a regular file. A destination that
/// does not exist yet is used as given.
pub async fn replace_target(destination: &Path) -> PathBuf {
    match fs::canonicalize(destination).await {
        Ok(target) => target,
        Err(e) => {
            debug!(destination = %destination.display(), error = %e, "replace_target: using path as given");
            destination.to_path_buf()
        }
    }
}

/// Resolve the save destination; `None` or an empty path means the source
pub fn resolve_destination<'a>(source: &'a Path, destination: Option<&'a Path>) -> &'a Path {
    match destination {
        Some(dest) if !dest.as_os_str().is_empty() => dest,
        _ => source,
    }
}

/// Write `window` to `destination` (or back to its source)
///
/// Returns the path that was written.
pub async fn save_window(window: &Window, destination: Option<&Path>, config: &EditorConfig) -> Result<PathBuf> {
    let source = window.source_path().ok_or(EditorError::NotLoaded)?;
    if !window.is_loaded() {
        return Err(EditorError::LoadInProgress);
    }

    let destination = resolve_destination(source, destination);
    let in_place = is_same_file(source, destination);
    let target = replace_target(destination).await;
    debug!(
        source = %source.display(),
        destination = %destination.display(),
        target = %target.display(),
        in_place,
        covers_file = window.covers_file(),
        "save_window: called"
    );

    let temp = temp_path_for(&target, &config.temp_suffix)?;
    let out = File::create(&temp)
        .await
        .map_err(|e| EditorError::not_accessible(destination, e))?;

    if let Err(e) = write_and_replace(out, &temp, window, source, &target, config).await {
        debug!(temp = %temp.display(), "save_window: removing temp file after failure");
        if let Err(rm) = fs::remove_file(&temp).await
            && rm.kind() != io::ErrorKind::NotFound
        {
            warn!(temp = %temp.display(), error = %rm, "Failed to remove temp file");
        }
        return Err(e);
    }

    info!(destination = %destination.display(), bytes = window.file_size(), in_place, "Window saved");
    Ok(destination.to_path_buf())
}

async fn write_and_replace(
    mut out: File,
    temp: &Path,
    window: &Window,
    source: &Path,
    destination: &Path,
    config: &EditorConfig,
) -> Result<()> {
    write_contents(&mut out, window, source, config.chunk_size)
        .await
        .map_err(|e| EditorError::persistence(destination, e))?;

    out.flush().await.map_err(|e| EditorError::persistence(destination, e))?;
    out.sync_all().await.map_err(|e| EditorError::persistence(destination, e))?;
    drop(out);

    // Keep the replaced file's permission bits
    if let Ok(meta) = fs::metadata(destination).await
        && let Err(e) = fs::set_permissions(temp, meta.permissions()).await
    {
        warn!(temp = %temp.display(), error = %e, "Could not copy permissions to temp file");
    }

    fs::rename(temp, destination)
        .await
        .map_err(|e| EditorError::persistence(destination, e))?;

    sync_parent_dir(destination).await;
    Ok(())
}

/// Flush the directory entry written by the rename, best effort
async fn sync_parent_dir(path: &Path) {
    // Directories cannot be opened as files everywhere
    if cfg!(not(unix)) {
        return;
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let result = match File::open(parent).await {
        Ok(dir) => dir.sync_all().await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        warn!(dir = %parent.display(), error = %e, "Could not sync directory after rename");
    }
}

/// Stream the full reconstructed file into `out`
async fn write_contents(out: &mut File, window: &Window, source: &Path, chunk_size: usize) -> io::Result<()> {
    if window.len() == window.file_size() {
        debug!("write_contents: window covers file, writing buffer verbatim");
        return out.write_all(window.as_bytes()).await;
    }

    let mut src = File::open(source).await?;
    let end = window.start() + window.len();

    debug!(prefix = window.start(), suffix = window.file_size() - end, "write_contents: reconstructing");
    copy_range(&mut src, out, 0, window.start(), chunk_size).await?;
    out.write_all(window.as_bytes()).await?;
    copy_range(&mut src, out, end, window.file_size() - end, chunk_size).await?;
    Ok(())
}

/// Copy `len` bytes at `offset` of `src` into `out`, one chunk at a time
async fn copy_range(src: &mut File, out: &mut File, offset: u64, len: u64, chunk_size: usize) -> io::Result<()> {
    if len == 0 {
        return Ok(());
    }
    src.seek(SeekFrom::Start(offset)).await?;

    let mut chunk = Vec::with_capacity(next_chunk_len(0, len, chunk_size));
    let mut copied = 0u64;
    while copied < len {
        let block = next_chunk_len(copied, len, chunk_size);
        chunk.resize(block, 0);
        src.read_exact(&mut chunk).await?;
        out.write_all(&chunk).await?;
        copied += block as u64;
    }
    Ok(())
}

//! Window store - one loaded view of a file
//!
//! A `Window` owns the bytes `[start, start + len)` of its source file plus
//! the provenance needed to write them back. Index `i` of the buffer is file
//! offset `start + i`.

use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{EditorError, Result};

/// In-memory byte window over a file
#[derive(Debug, Clone, Default)]
pub struct Window {
    /// Backing file, `None` until a load succeeds
    source_path: Option<PathBuf>,
    /// Total size of the backing file at load time
    file_size: u64,
    /// File offset of the first byte in the window
    start: u64,
    /// Number of bytes the window covers
    len: u64,
    /// Window bytes, grows to `len` as the loader appends chunks
    buffer: Vec<u8>,
    /// Bytes physically read so far
    bytes_loaded: u64,
    /// Set by `set_byte`, cleared after a successful in-place save
    dirty: bool,
}

/// Allocate an empty buffer able to hold `len` bytes without growing
///
/// Fails with `WindowTooLarge` instead of aborting when the allocation is
/// refused or `len` does not fit in memory on this target.
pub(crate) fn reserve_buffer(len: u64) -> Result<Vec<u8>> {
    let capacity = usize::try_from(len).map_err(|_| EditorError::WindowTooLarge { len })?;
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(capacity).map_err(|e| {
        debug!(len, error = %e, "reserve_buffer: allocation refused");
        EditorError::WindowTooLarge { len }
    })?;
    Ok(buffer)
}

/// Snapshot of a window's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowInfo {
    pub source_path: Option<PathBuf>,
    pub file_size: u64,
    pub start: u64,
    pub len: u64,
    pub bytes_loaded: u64,
    pub loaded: bool,
    pub dirty: bool,
}

impl Window {
    /// Create an unbound, fully loaded window over `data`
    ///
    /// The window behaves as if it covered a whole file of `data.len()` bytes
    /// but has no source path, so it cannot be saved in place.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        let buffer = data.into();
        let len = buffer.len() as u64;
        Self {
            source_path: None,
            file_size: len,
            start: 0,
            len,
            buffer,
            bytes_loaded: len,
            dirty: false,
        }
    }

    /// Reset all metadata for a new load around a buffer from [`reserve_buffer`]
    pub(crate) fn reset(&mut self, path: PathBuf, file_size: u64, start: u64, len: u64, buffer: Vec<u8>) {
        debug!(path = %path.display(), file_size, start, len, "Window::reset: called");
        debug_assert!(buffer.is_empty());
        *self = Self {
            source_path: Some(path),
            file_size,
            start,
            len,
            buffer,
            bytes_loaded: 0,
            dirty: false,
        };
    }

    /// Append one chunk read by the loader
    pub(crate) fn append_chunk(&mut self, chunk: &[u8]) {
        debug_assert!(self.bytes_loaded + chunk.len() as u64 <= self.len);
        self.buffer.extend_from_slice(chunk);
        self.bytes_loaded += chunk.len() as u64;
    }

    /// Drop the buffer and forget the source
    pub(crate) fn release(&mut self) {
        debug!(bytes_loaded = self.bytes_loaded, "Window::release: called");
        *self = Self::default();
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes_loaded(&self) -> u64 {
        self.bytes_loaded
    }

    /// Whether every byte of the window has been read
    pub fn is_loaded(&self) -> bool {
        self.bytes_loaded == self.len
    }

    /// Whether the window has unsaved edits
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the window covers its whole file
    pub fn covers_file(&self) -> bool {
        self.start == 0 && self.len == self.file_size
    }

    /// The bytes read so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn info(&self) -> WindowInfo {
        WindowInfo {
            source_path: self.source_path.clone(),
            file_size: self.file_size,
            start: self.start,
            len: self.len,
            bytes_loaded: self.bytes_loaded,
            loaded: self.is_loaded(),
            dirty: self.dirty,
        }
    }

    fn checked_range(&self, offset: u64, len: u64) -> Result<Range<usize>> {
        if !self.is_loaded() {
            return Err(EditorError::LoadInProgress);
        }
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(offset as usize..end as usize),
            _ => {
                debug!(offset, len, window_len = self.len, "Window::checked_range: out of range");
                Err(EditorError::OutOfRange {
                    offset,
                    len,
                    window_len: self.len,
                })
            }
        }
    }

    /// Copy `len` bytes starting at window offset `offset`
    pub fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let range = self.checked_range(offset, len)?;
        Ok(self.buffer[range].to_vec())
    }

    /// Decode a range one byte per character (Latin-1)
    pub fn read_range_as_text(&self, offset: u64, len: u64) -> Result<String> {
        let range = self.checked_range(offset, len)?;
        Ok(self.buffer[range].iter().map(|&b| char::from(b)).collect())
    }

    /// Printable view of a range, non-printable bytes shown as `.`
    pub fn printable(&self, offset: u64, len: u64) -> Result<String> {
        let range = self.checked_range(offset, len)?;
        Ok(printable_representation(&self.buffer[range]))
    }

    pub fn get_byte(&self, offset: u64) -> Result<u8> {
        let range = self.checked_range(offset, 1)?;
        Ok(self.buffer[range.start])
    }

    /// Overwrite one byte of the buffer
    ///
    /// Edits stay in memory until the window is saved.
    pub fn set_byte(&mut self, offset: u64, value: u8) -> Result<()> {
        let range = self.checked_range(offset, 1)?;
        debug!(offset, value, "Window::set_byte: called");
        self.buffer[range.start] = value;
        self.dirty = true;
        Ok(())
    }
}

/// Map each byte to itself when printable ASCII, else to `.`
pub fn printable_representation(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                char::from(b)
            } else {
                '.'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_is_loaded() {
        let window = Window::from_bytes(b"hello".to_vec());
        assert_eq!(window.len(), 5);
        assert_eq!(window.file_size(), 5);
        assert!(window.is_loaded());
        assert!(window.covers_file());
        assert!(window.source_path().is_none());
    }

    #[test]
    fn test_set_then_read() {
        let mut window = Window::from_bytes(vec![0u8; 8]);
        window.set_byte(3, 0xAB).unwrap();
        assert_eq!(window.read_range(3, 1).unwrap(), vec![0xAB]);
        assert_eq!(window.get_byte(3).unwrap(), 0xAB);
        assert!(window.is_dirty());
    }

    #[test]
    fn test_out_of_range() {
        let mut window = Window::from_bytes(vec![1, 2, 3]);
        assert!(matches!(
            window.read_range(2, 2),
            Err(EditorError::OutOfRange {
                offset: 2,
                len: 2,
                window_len: 3
            })
        ));
        assert!(matches!(window.set_byte(3, 0), Err(EditorError::OutOfRange { .. })));
        assert!(matches!(window.read_range(u64::MAX, 2), Err(EditorError::OutOfRange { .. })));
        // Reading up to the end is fine
        assert_eq!(window.read_range(0, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(window.read_range(3, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_partial_window_is_not_readable() {
        let mut window = Window::default();
        window.reset(PathBuf::from("/tmp/x.bin"), 100, 10, 20, reserve_buffer(20).unwrap());
        window.append_chunk(&[7u8; 5]);
        assert!(!window.is_loaded());
        assert!(matches!(window.read_range(0, 1), Err(EditorError::LoadInProgress)));

        window.append_chunk(&[7u8; 15]);
        assert!(window.is_loaded());
        assert!(!window.covers_file());
        assert_eq!(window.get_byte(19).unwrap(), 7);
    }

    #[test]
    fn test_text_views() {
        let window = Window::from_bytes(vec![b'H', b'i', 0x00, b' ', 0x7F, 0xE9]);
        assert_eq!(window.printable(0, 6).unwrap(), "Hi. ..");
        assert_eq!(window.read_range_as_text(0, 2).unwrap(), "Hi");
        // Latin-1: one char per byte
        let text = window.read_range_as_text(5, 1).unwrap();
        assert_eq!(text, "\u{e9}");
        assert_eq!(text.chars().count(), 1);
    }

    #[test]
    fn test_release_clears_everything() {
        let mut window = Window::default();
        window.reset(PathBuf::from("/tmp/x.bin"), 10, 0, 10, reserve_buffer(10).unwrap());
        window.append_chunk(&[1u8; 10]);
        window.release();
        assert!(window.source_path().is_none());
        assert_eq!(window.len(), 0);
        assert!(window.as_bytes().is_empty());
    }

    #[test]
    fn test_reserve_buffer_refuses_impossible_sizes() {
        let buffer = reserve_buffer(64).unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 64);

        assert!(matches!(
            reserve_buffer(u64::MAX),
            Err(EditorError::WindowTooLarge { len: u64::MAX })
        ));
    }
}

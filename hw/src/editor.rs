//! HexEditor - one window, its loader task and its persistence
//!
//! The window is shared with the loader task behind a tokio `RwLock`; load
//! progress is published on a `watch` channel. Every accessor checks the
//! progress first and fails fast with `LoadInProgress` while the window is
//! still filling, so no caller ever observes a partial buffer. Call
//! [`HexEditor::wait_loaded`] to block until the window is ready.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

use crate::config::{Config, EditorConfig};
use crate::diff::{self, DiffRecord, DiffSummary};
use crate::error::{EditorError, Result};
use crate::loader::{LoadPlan, LoadProgress, LoadStatus, LoadTask, open_source};
use crate::patterns::{self, MatchRecord, PatternMatcher, RegexPatternMatcher};
use crate::persist;
use crate::window::{Window, WindowInfo, reserve_buffer};

/// Editing session over a single file window
pub struct HexEditor {
    config: EditorConfig,
    window: Arc<RwLock<Window>>,
    progress_tx: Arc<watch::Sender<LoadProgress>>,
    progress_rx: watch::Receiver<LoadProgress>,
    task: Option<LoadTask>,
    matcher: Option<Arc<dyn PatternMatcher>>,
}

impl std::fmt::Debug for HexEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HexEditor")
            .field("config", &self.config)
            .field("progress", &*self.progress_rx.borrow())
            .field("has_matcher", &self.matcher.is_some())
            .finish()
    }
}

impl HexEditor {
    /// Create an empty session; nothing is loaded until `load` is called
    pub fn new(config: EditorConfig) -> Self {
        debug!(?config, "HexEditor::new: called");
        let (tx, rx) = watch::channel(LoadProgress::default());
        Self {
            config,
            window: Arc::new(RwLock::new(Window::default())),
            progress_tx: Arc::new(tx),
            progress_rx: rx,
            task: None,
            matcher: None,
        }
    }

    /// Create a session that forwards `find_patterns` to `matcher`
    pub fn with_matcher(config: EditorConfig, matcher: Arc<dyn PatternMatcher>) -> Self {
        let mut editor = Self::new(config);
        editor.matcher = Some(matcher);
        editor
    }

    /// Create a session from the full configuration
    ///
    /// Builds a [`RegexPatternMatcher`] when a patterns file is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.patterns.patterns_file {
            Some(path) => {
                let matcher = RegexPatternMatcher::from_file(path)?;
                Ok(Self::with_matcher(config.editor.clone(), Arc::new(matcher)))
            }
            None => Ok(Self::new(config.editor.clone())),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Start loading `[start, start + length)` of `path`
    ///
    /// A `length` of zero loads to the end of the file; lengths past the end
    /// are clamped. Returns once the range is validated and the background
    /// fill is scheduled. A load already in flight is cancelled and awaited
    /// first; an invalid request, or a window too large to allocate, leaves
    /// the current window untouched.
    pub async fn load(&mut self, path: impl AsRef<Path>, start: u64, length: u64) -> Result<()> {
        let path = path.as_ref();
        debug!(path = %path.display(), start, length, "HexEditor::load: called");

        let (file, file_size) = open_source(path).await?;
        let plan = LoadPlan::new(path, file_size, start, length)?;
        let buffer = reserve_buffer(plan.len)?;

        if let Some(task) = self.task.take()
            && !task.is_finished()
        {
            debug!("HexEditor::load: cancelling previous load");
            task.cancel().await;
        }

        self.window
            .write()
            .await
            .reset(plan.path.clone(), plan.file_size, plan.start, plan.len, buffer);

        if plan.len == 0 {
            debug!("HexEditor::load: empty window, loaded immediately");
            self.progress_tx.send_replace(LoadProgress::loaded(0));
            return Ok(());
        }

        self.progress_tx.send_replace(LoadProgress::loading(plan.len));
        self.task = Some(LoadTask::spawn(
            file,
            plan,
            self.config.chunk_size,
            self.window.clone(),
            self.progress_tx.clone(),
        ));
        Ok(())
    }

    /// Whether the current window is completely read
    pub fn is_loaded(&self) -> bool {
        self.progress_rx.borrow().is_loaded()
    }

    pub fn progress(&self) -> LoadProgress {
        self.progress_rx.borrow().clone()
    }

    /// Receiver for load progress updates
    pub fn subscribe_progress(&self) -> watch::Receiver<LoadProgress> {
        self.progress_rx.clone()
    }

    /// Wait until the current load finishes
    pub async fn wait_loaded(&self) -> Result<()> {
        debug!("HexEditor::wait_loaded: called");
        let mut rx = self.progress_rx.clone();
        let progress = rx
            .wait_for(|p| !p.is_loading())
            .await
            .map_err(|_| EditorError::LoadFailed("progress channel closed".to_string()))?
            .clone();
        status_to_result(progress.status)
    }

    /// Abort an in-flight load and release the buffer
    ///
    /// Returns false when there was nothing to cancel.
    pub async fn cancel_load(&mut self) -> bool {
        debug!("HexEditor::cancel_load: called");
        match self.task.take() {
            Some(task) if !task.is_finished() => {
                task.cancel().await;
                let cancelled = self.progress_rx.borrow().status == LoadStatus::Cancelled;
                if cancelled {
                    info!("Load cancelled");
                }
                cancelled
            }
            _ => false,
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        status_to_result(self.progress_rx.borrow().status.clone())
    }

    /// Metadata of the current window
    pub async fn window_info(&self) -> WindowInfo {
        self.window.read().await.info()
    }

    pub async fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.ensure_ready()?;
        self.window.read().await.read_range(offset, len)
    }

    pub async fn read_range_as_text(&self, offset: u64, len: u64) -> Result<String> {
        self.ensure_ready()?;
        self.window.read().await.read_range_as_text(offset, len)
    }

    pub async fn printable(&self, offset: u64, len: u64) -> Result<String> {
        self.ensure_ready()?;
        self.window.read().await.printable(offset, len)
    }

    pub async fn get_byte(&self, offset: u64) -> Result<u8> {
        self.ensure_ready()?;
        self.window.read().await.get_byte(offset)
    }

    /// Set one byte of the window; nothing reaches disk until `save`
    pub async fn set_byte(&self, offset: u64, value: u8) -> Result<()> {
        debug!(offset, value, "HexEditor::set_byte: called");
        self.ensure_ready()?;
        self.window.write().await.set_byte(offset, value)
    }

    /// Save the window to `destination`, or in place when `None`
    ///
    /// Returns the path written. The session stays bound to its source file
    /// when saving elsewhere.
    pub async fn save(&self, destination: Option<&Path>) -> Result<PathBuf> {
        debug!(destination = ?destination, "HexEditor::save: called");
        self.ensure_ready()?;

        let mut window = self.window.write().await;
        let written = persist::save_window(&window, destination, &self.config).await?;
        if window.source_path().is_some_and(|src| persist::is_same_file(src, &written)) {
            window.mark_clean();
        }
        Ok(written)
    }

    /// Byte differences from this window to `other`
    pub async fn diff(&self, other: &HexEditor) -> Result<Vec<DiffRecord>> {
        Ok(self.diff_summary(other).await?.records)
    }

    /// Like `diff`, plus both window lengths
    pub async fn diff_summary(&self, other: &HexEditor) -> Result<DiffSummary> {
        debug!("HexEditor::diff_summary: called");
        self.ensure_ready()?;
        other.ensure_ready()?;

        if Arc::ptr_eq(&self.window, &other.window) {
            let window = self.window.read().await;
            return Ok(diff::diff_summary(&window, &window));
        }

        // Lock in address order so opposite diffs cannot deadlock behind queued writers
        let (left, right) = if Arc::as_ptr(&self.window) < Arc::as_ptr(&other.window) {
            let left = self.window.read().await;
            (left, other.window.read().await)
        } else {
            let right = other.window.read().await;
            (self.window.read().await, right)
        };
        Ok(diff::diff_summary(&left, &right))
    }

    /// Run the configured pattern matcher over the window
    pub async fn find_patterns(&self) -> Result<Vec<MatchRecord>> {
        let matcher = self.matcher.as_ref().ok_or(EditorError::NoPatternMatcher)?;
        self.ensure_ready()?;
        let window = self.window.read().await;
        Ok(patterns::find_matches(&window, matcher.as_ref()))
    }
}

impl Drop for HexEditor {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

fn status_to_result(status: LoadStatus) -> Result<()> {
    match status {
        LoadStatus::Loaded => Ok(()),
        LoadStatus::Loading => Err(EditorError::LoadInProgress),
        LoadStatus::Idle => Err(EditorError::NotLoaded),
        LoadStatus::Cancelled => Err(EditorError::LoadCancelled),
        LoadStatus::Failed(message) => Err(EditorError::LoadFailed(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(temp: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = temp.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    fn small_chunks() -> EditorConfig {
        EditorConfig {
            chunk_size: 3,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_new_session_has_nothing_loaded() {
        let editor = HexEditor::new(EditorConfig::default());
        assert!(!editor.is_loaded());
        assert_eq!(editor.progress().status, LoadStatus::Idle);
        assert!(matches!(editor.read_range(0, 1).await, Err(EditorError::NotLoaded)));
        assert!(matches!(editor.wait_loaded().await, Err(EditorError::NotLoaded)));
    }

    #[tokio::test]
    async fn test_operations_fail_fast_while_loading() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "f.bin", b"0123456789");
        let matcher = RegexPatternMatcher::new(&[]).unwrap();
        let mut editor = HexEditor::with_matcher(EditorConfig::default(), Arc::new(matcher));
        editor.load(&path, 0, 0).await.unwrap();
        editor.wait_loaded().await.unwrap();
        let other = HexEditor::new(EditorConfig::default());

        // Pretend a fill is still running
        editor.progress_tx.send_replace(LoadProgress::loading(10));
        assert!(!editor.is_loaded());
        assert!(matches!(editor.read_range(0, 1).await, Err(EditorError::LoadInProgress)));
        assert!(matches!(editor.set_byte(0, 1).await, Err(EditorError::LoadInProgress)));
        assert!(matches!(editor.save(None).await, Err(EditorError::LoadInProgress)));
        assert!(matches!(editor.diff(&other).await, Err(EditorError::LoadInProgress)));
        assert!(matches!(other.diff(&editor).await, Err(EditorError::NotLoaded)));
        assert!(matches!(editor.find_patterns().await, Err(EditorError::LoadInProgress)));
        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_load_partial_window() {
        let temp = TempDir::new().unwrap();
        let data: Vec<u8> = (0..20u8).collect();
        let path = write_file(&temp, "f.bin", &data);

        let mut editor = HexEditor::new(small_chunks());
        editor.load(&path, 5, 10).await.unwrap();
        editor.wait_loaded().await.unwrap();

        let info = editor.window_info().await;
        assert_eq!(info.len, 10);
        assert_eq!(info.bytes_loaded, 10);
        assert_eq!(info.file_size, 20);
        assert_eq!(info.start, 5);
        assert_eq!(editor.read_range(0, 10).await.unwrap(), &data[5..15]);
    }

    #[tokio::test]
    async fn test_load_invalid_range_keeps_window() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "f.bin", b"abcdef");

        let mut editor = HexEditor::new(EditorConfig::default());
        editor.load(&path, 0, 0).await.unwrap();
        editor.wait_loaded().await.unwrap();

        let result = editor.load(&path, 6, 0).await;
        assert!(matches!(result, Err(EditorError::InvalidRange { start: 6, file_size: 6 })));
        assert_eq!(editor.read_range(0, 6).await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_load_window_too_large_keeps_window() {
        let temp = TempDir::new().unwrap();
        let small = write_file(&temp, "small.bin", b"abcdef");
        let huge = temp.path().join("huge.bin");
        let file = std::fs::File::create(&huge).unwrap();
        // Sparse, takes no disk space
        if file.set_len(1u64 << 40).is_err() {
            return;
        }

        let mut editor = HexEditor::new(EditorConfig::default());
        editor.load(&small, 0, 0).await.unwrap();
        editor.wait_loaded().await.unwrap();

        let result = editor.load(&huge, 0, 0).await;
        assert!(matches!(result, Err(EditorError::WindowTooLarge { len }) if len == 1u64 << 40));
        assert!(editor.is_loaded());
        assert_eq!(editor.read_range(0, 6).await.unwrap(), b"abcdef");
        assert_eq!(editor.window_info().await.source_path.as_deref(), Some(small.as_path()));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let mut editor = HexEditor::new(EditorConfig::default());
        let result = editor.load(temp.path().join("nope.bin"), 0, 0).await;
        assert!(matches!(result, Err(EditorError::FileNotAccessible { .. })));
    }

    #[tokio::test]
    async fn test_empty_file_loads_immediately() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "empty.bin", b"");

        let mut editor = HexEditor::new(EditorConfig::default());
        editor.load(&path, 0, 0).await.unwrap();
        assert!(editor.is_loaded());
        assert_eq!(editor.window_info().await.len, 0);
    }

    #[tokio::test]
    async fn test_edit_is_buffer_only_until_save() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "f.bin", &[0u8; 8]);

        let mut editor = HexEditor::new(EditorConfig::default());
        editor.load(&path, 0, 0).await.unwrap();
        editor.wait_loaded().await.unwrap();

        editor.set_byte(2, 0x41).await.unwrap();
        assert_eq!(editor.get_byte(2).await.unwrap(), 0x41);
        assert!(editor.window_info().await.dirty);
        assert_eq!(std::fs::read(&path).unwrap(), vec![0u8; 8]);

        editor.save(None).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0, 0, 0x41, 0, 0, 0, 0, 0]);
        assert!(!editor.window_info().await.dirty);
    }

    #[tokio::test]
    async fn test_save_copy_keeps_source_binding() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "f.bin", b"0123456789");
        let copy = temp.path().join("copy.bin");

        let mut editor = HexEditor::new(EditorConfig::default());
        editor.load(&path, 2, 3).await.unwrap();
        editor.wait_loaded().await.unwrap();
        editor.set_byte(1, b'X').await.unwrap();

        let written = editor.save(Some(&copy)).await.unwrap();
        assert_eq!(written, copy);
        assert_eq!(std::fs::read(&copy).unwrap(), b"012X456789");
        assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");

        let info = editor.window_info().await;
        assert_eq!(info.source_path.as_deref(), Some(path.as_path()));
        assert!(info.dirty);
    }

    #[tokio::test]
    async fn test_diff_between_sessions() {
        let temp = TempDir::new().unwrap();
        let a = write_file(&temp, "a.bin", b"hello world");
        let b = write_file(&temp, "b.bin", b"hellO world!!");

        let mut left = HexEditor::new(EditorConfig::default());
        let mut right = HexEditor::new(EditorConfig::default());
        left.load(&a, 0, 0).await.unwrap();
        right.load(&b, 0, 0).await.unwrap();
        left.wait_loaded().await.unwrap();
        right.wait_loaded().await.unwrap();

        let records = left.diff(&right).await.unwrap();
        assert_eq!(records, vec![DiffRecord { offset: 4, new_byte: b'O' }]);

        let summary = left.diff_summary(&right).await.unwrap();
        assert!(summary.length_mismatch());
        assert!(left.diff(&left).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_diffs_with_writers_do_not_deadlock() {
        let temp = TempDir::new().unwrap();
        let a = write_file(&temp, "a.bin", &[0u8; 64]);
        let b = write_file(&temp, "b.bin", &[1u8; 64]);

        let mut left = HexEditor::new(EditorConfig::default());
        let mut right = HexEditor::new(EditorConfig::default());
        left.load(&a, 0, 0).await.unwrap();
        right.load(&b, 0, 0).await.unwrap();
        left.wait_loaded().await.unwrap();
        right.wait_loaded().await.unwrap();
        let left = Arc::new(left);
        let right = Arc::new(right);

        let mut handles = Vec::new();
        for i in 0..200u8 {
            let (l, r) = (left.clone(), right.clone());
            handles.push(tokio::spawn(async move { l.diff(&r).await.map(|_| ()) }));
            let (l, r) = (left.clone(), right.clone());
            handles.push(tokio::spawn(async move { r.diff(&l).await.map(|_| ()) }));
            let l = left.clone();
            handles.push(tokio::spawn(async move { l.set_byte((i % 64) as u64, i).await }));
            let r = right.clone();
            handles.push(tokio::spawn(async move { r.set_byte((i % 64) as u64, i).await }));
        }

        let all = async {
            for handle in handles {
                handle.await.unwrap().unwrap();
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(10), all)
            .await
            .expect("diffs and writes should not deadlock");
    }

    #[tokio::test]
    async fn test_find_patterns_requires_matcher() {
        let temp = TempDir::new().unwrap();
        let path = write_file(&temp, "f.bin", b"..MZ..");

        let mut editor = HexEditor::new(EditorConfig::default());
        editor.load(&path, 0, 0).await.unwrap();
        editor.wait_loaded().await.unwrap();
        assert!(matches!(editor.find_patterns().await, Err(EditorError::NoPatternMatcher)));

        let matcher = RegexPatternMatcher::new(&[patterns::PatternDef {
            name: "mz".to_string(),
            pattern: "MZ".to_string(),
        }])
        .unwrap();
        let mut editor = HexEditor::with_matcher(EditorConfig::default(), Arc::new(matcher));
        editor.load(&path, 0, 0).await.unwrap();
        editor.wait_loaded().await.unwrap();
        let matches = editor.find_patterns().await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].offset, 2);
    }

    #[tokio::test]
    async fn test_from_config_with_patterns_file() {
        let temp = TempDir::new().unwrap();
        let patterns = write_file(&temp, "patterns.yml", b"- name: gz\n  pattern: '\\x1f\\x8b'\n");

        let mut config = Config::default();
        config.patterns.patterns_file = Some(patterns);
        let editor = HexEditor::from_config(&config).unwrap();
        assert!(editor.matcher.is_some());

        config.patterns.patterns_file = Some(temp.path().join("missing.yml"));
        assert!(HexEditor::from_config(&config).is_err());
    }
}

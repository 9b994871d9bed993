//! hexwindow - windowed binary file editor
//!
//! Loads a byte range ("window") of a possibly very large file into memory on
//! a background task, lets callers edit bytes in place, and writes the result
//! back atomically, reconstructing the untouched parts of the file around the
//! window.
//!
//! # Modules
//!
//! - [`window`] - the in-memory window and its byte accessors
//! - [`loader`] - chunked background fill and load progress
//! - [`persist`] - temp-file-then-rename saves
//! - [`diff`] - byte comparison of two windows
//! - [`patterns`] - bridge to pattern matchers
//! - [`editor`] - `HexEditor`, the session tying these together
//!
//! # Example
//!
//! ```ignore
//! use hexwindow::{EditorConfig, HexEditor};
//!
//! let mut editor = HexEditor::new(EditorConfig::default());
//! editor.load("disk.img", 4096, 512).await?;
//! editor.wait_loaded().await?;
//! editor.set_byte(0, 0xEB).await?;
//! editor.save(None).await?;
//! ```

pub mod cli;
pub mod config;
pub mod diff;
pub mod editor;
pub mod error;
pub mod loader;
pub mod patterns;
pub mod persist;
pub mod window;

pub use config::{Config, EditorConfig, PatternsConfig};
pub use diff::{DiffRecord, DiffSummary, diff, diff_bytes, diff_summary};
pub use editor::HexEditor;
pub use error::{EditorError, Result};
pub use loader::{LoadPlan, LoadProgress, LoadStatus};
pub use patterns::{MatchRecord, PatternDef, PatternMatcher, RegexPatternMatcher, find_matches};
pub use window::{Window, WindowInfo, printable_representation};

/// Default read/copy chunk size (10MB)
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// Default suffix for the temporary file written during a save
pub const DEFAULT_TEMP_SUFFIX: &str = ".hwtmp";

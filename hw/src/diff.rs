//! Byte-level comparison of two windows
//!
//! Offsets are window-relative. Only the common prefix `0..min(a, b)` is
//! compared; bytes past the shorter window are never reported. Use
//! [`DiffSummary::length_mismatch`] to detect differing lengths.

use serde::Serialize;
use tracing::debug;

use crate::window::Window;

/// One differing byte: offset and the value in the second window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiffRecord {
    pub offset: u64,
    pub new_byte: u8,
}

/// Diff records plus the lengths that were compared
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub left_len: u64,
    pub right_len: u64,
    pub records: Vec<DiffRecord>,
}

impl DiffSummary {
    /// True when the windows have different lengths and the tail was skipped
    pub fn length_mismatch(&self) -> bool {
        self.left_len != self.right_len
    }

    pub fn compared_len(&self) -> u64 {
        self.left_len.min(self.right_len)
    }

    pub fn is_identical(&self) -> bool {
        self.records.is_empty() && !self.length_mismatch()
    }
}

/// Compare two byte slices position by position
pub fn diff_bytes(left: &[u8], right: &[u8]) -> Vec<DiffRecord> {
    left.iter()
        .zip(right)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, (_, &b))| DiffRecord {
            offset: i as u64,
            new_byte: b,
        })
        .collect()
}

/// Differences from `left` to `right` over their common length
pub fn diff(left: &Window, right: &Window) -> Vec<DiffRecord> {
    debug!(left_len = left.len(), right_len = right.len(), "diff: called");
    diff_bytes(left.as_bytes(), right.as_bytes())
}

pub fn diff_summary(left: &Window, right: &Window) -> DiffSummary {
    DiffSummary {
        left_len: left.len(),
        right_len: right.len(),
        records: diff(left, right),
    }
}

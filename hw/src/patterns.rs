//! Pattern-match bridge
//!
//! Pattern matching itself lives behind the [`PatternMatcher`] trait. The
//! bridge hands the window's bytes to the matcher and returns whatever it
//! produced, untouched. [`RegexPatternMatcher`] is the stock matcher, built
//! from a YAML patterns file of named byte regexes:
//!
//! ```yaml
//! - name: png
//!   pattern: '\x89PNG\r\n\x1a\n'
//! - name: elf
//!   pattern: '\x7fELF'
//! ```

use std::fs;
use std::path::Path;

use regex::bytes::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EditorError, Result};
use crate::window::Window;

/// A match reported by a pattern matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Name of the pattern that matched
    pub name: String,
    /// Window-relative offset of the first matched byte
    pub offset: u64,
    /// Number of matched bytes
    pub length: u64,
}

/// Finds patterns in a byte buffer
pub trait PatternMatcher: Send + Sync {
    fn find_matches(&self, data: &[u8]) -> Vec<MatchRecord>;
}

/// Run `matcher` over the window's bytes
pub fn find_matches(window: &Window, matcher: &dyn PatternMatcher) -> Vec<MatchRecord> {
    debug!(len = window.len(), "find_matches: called");
    matcher.find_matches(window.as_bytes())
}

/// One entry of a patterns file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDef {
    pub name: String,
    /// Byte regex, Unicode disabled so `\xNN` matches the raw byte
    pub pattern: String,
}

/// Matcher over a list of named byte regexes
#[derive(Debug, Clone)]
pub struct RegexPatternMatcher {
    patterns: Vec<(String, Regex)>,
}

impl RegexPatternMatcher {
    pub fn new(defs: &[PatternDef]) -> std::result::Result<Self, regex::Error> {
        let patterns = defs
            .iter()
            .map(|def| {
                RegexBuilder::new(&def.pattern)
                    .unicode(false)
                    .build()
                    .map(|re| (def.name.clone(), re))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Load pattern definitions from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "RegexPatternMatcher::from_file: called");
        let content = fs::read_to_string(path).map_err(|e| EditorError::not_accessible(path, e))?;
        let defs: Vec<PatternDef> = serde_yaml::from_str(&content).map_err(|e| EditorError::PatternFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let matcher = Self::new(&defs).map_err(|e| EditorError::PatternFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!(path = %path.display(), count = matcher.len(), "Loaded patterns");
        Ok(matcher)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl PatternMatcher for RegexPatternMatcher {
    fn find_matches(&self, data: &[u8]) -> Vec<MatchRecord> {
        self.patterns
            .iter()
            .flat_map(|(name, re)| {
                re.find_iter(data).map(move |m| MatchRecord {
                    name: name.clone(),
                    offset: m.start() as u64,
                    length: m.len() as u64,
                })
            })
            .collect()
    }
}

use std::path::{Path, PathBuf};

use regex::Regex;

/// Query-side file matcher.
///
/// An empty matcher matches everything. A path pattern matches the exact
/// file or, when the pattern names a directory prefix, everything under it.
/// Regex patterns are matched against the full path string.
#[derive(Debug, Clone, Default)]
pub struct PathMatch {
    pattern: Option<Pattern>,
}

#[derive(Debug, Clone)]
enum Pattern {
    Path(PathBuf),
    Regex(Regex),
}

impl PathMatch {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            pattern: Some(Pattern::Path(path.into())),
        }
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Some(Pattern::Regex(Regex::new(pattern)?)),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
    }

    /// The literal path pattern, if this matcher carries one.
    pub fn as_path(&self) -> Option<&Path> {
        match &self.pattern {
            Some(Pattern::Path(path)) => Some(path),
            _ => None,
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        match &self.pattern {
            None => true,
            Some(Pattern::Path(pattern)) => path == pattern || path.starts_with(pattern),
            Some(Pattern::Regex(regex)) => regex.is_match(&path.to_string_lossy()),
        }
    }
}

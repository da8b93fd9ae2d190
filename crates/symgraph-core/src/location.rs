use std::fmt;

use serde::{Deserialize, Serialize};

use crate::FileId;

/// A point in a source file.
///
/// Locations order lexicographically by `(file_id, line, column)`, which is
/// also the key order of the persistent symbol tables: all locations of one
/// file are contiguous, sorted by position. The field order below is load
/// bearing for the derived `Ord`.
#[derive(
    Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Location {
    pub file_id: FileId,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub const NONE: Location = Location {
        file_id: FileId::NONE,
        line: 0,
        column: 0,
    };

    #[inline]
    pub const fn new(file_id: FileId, line: u32, column: u32) -> Self {
        Self {
            file_id,
            line,
            column,
        }
    }

    /// The smallest location inside `file_id`, used as a range-scan anchor.
    #[inline]
    pub const fn file_start(file_id: FileId) -> Self {
        Self {
            file_id,
            line: 0,
            column: 0,
        }
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.file_id.is_none()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.file_id.to_raw(),
            self.line,
            self.column
        )
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

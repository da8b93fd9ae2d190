use serde::{Deserialize, Serialize};

use crate::FileId;

/// A suggested textual replacement attached to a diagnostic.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FixIt {
    pub line: u32,
    pub column: u32,
    pub length: u32,
    pub text: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Skipped,
    Warning,
    Error,
    Fixit,
}

/// A parser diagnostic carried through index results for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file_id: FileId,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub message: String,
}

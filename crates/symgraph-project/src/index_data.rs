use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use symgraph_core::{Diagnostic, FileId, FixIt, Location, SourceKey, SymbolInfo, SymbolKind};

/// Flag word shared by jobs and their results.
#[derive(
    Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobFlags(u32);

impl JobFlags {
    pub const NONE: JobFlags = JobFlags(0);
    /// The job was spawned by the dirty engine rather than a compile.
    pub const DIRTY: JobFlags = JobFlags(0x1);
    /// The job came from a compile command and must go through source
    /// admission.
    pub const COMPILE: JobFlags = JobFlags(0x2);
    /// The indexer produced a full result.
    pub const COMPLETE: JobFlags = JobFlags(0x4);
    pub const CRASHED: JobFlags = JobFlags(0x8);
    pub const ABORTED: JobFlags = JobFlags(0x10);

    #[inline]
    pub const fn contains(self, other: JobFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn with(self, other: JobFlags) -> JobFlags {
        JobFlags(self.0 | other.0)
    }

    #[inline]
    pub const fn without(self, other: JobFlags) -> JobFlags {
        JobFlags(self.0 & !other.0)
    }
}

impl std::ops::BitOr for JobFlags {
    type Output = JobFlags;

    fn bitor(self, rhs: JobFlags) -> JobFlags {
        self.with(rhs)
    }
}

impl fmt::Debug for JobFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        for (flag, name) in [
            (JobFlags::DIRTY, "Dirty"),
            (JobFlags::COMPILE, "Compile"),
            (JobFlags::COMPLETE, "Complete"),
            (JobFlags::CRASHED, "Crashed"),
            (JobFlags::ABORTED, "Aborted"),
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        write!(f, "JobFlags({})", names.join("|"))
    }
}

/// The delta one translation unit contributes to the index.
///
/// Produced by the external indexer, buffered by the project, and folded
/// into the persistent tables at the next sync. A completed `IndexData` is
/// immutable until it is merged and discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexData {
    /// Key of the [`symgraph_core::Source`] this result belongs to.
    pub key: SourceKey,
    /// Millis since the epoch when the parse finished; stamped into the
    /// source row on completion.
    pub parse_time: u64,
    pub flags: JobFlags,
    pub symbols: BTreeMap<Location, SymbolInfo>,
    pub symbol_names: BTreeMap<String, BTreeSet<Location>>,
    pub targets: BTreeMap<Location, BTreeMap<Location, SymbolKind>>,
    pub references: BTreeMap<Location, BTreeSet<Location>>,
    pub usrs: BTreeMap<String, BTreeMap<Location, SymbolKind>>,
    /// References the indexer could not resolve inside the TU, keyed by the
    /// USR of the entity they should target. Resolved at sync time against
    /// the merged USR table.
    pub pending_references: BTreeMap<String, BTreeMap<Location, SymbolKind>>,
    /// This TU's transitive includes: header → every TU that includes it
    /// (which always contains this TU's own file id).
    pub dependencies: BTreeMap<FileId, BTreeSet<FileId>>,
    pub fix_its: BTreeMap<FileId, BTreeSet<FixIt>>,
    /// true ⇒ this TU owned indexing of the file during the job round.
    pub visited: BTreeMap<FileId, bool>,
    pub diagnostics: Vec<Diagnostic>,
    /// Human-readable completion one-liner used in progress logs.
    pub message: String,
}

impl IndexData {
    pub fn new(key: SourceKey, flags: JobFlags) -> Self {
        Self {
            key,
            flags,
            ..Self::default()
        }
    }

    #[inline]
    pub fn file_id(&self) -> FileId {
        self.key.file_id()
    }
}

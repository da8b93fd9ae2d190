use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{BuildRootId, FileId};

/// Composite persistent key of a [`Source`].
///
/// Encodes `(file_id, build_root_id)` into a `u64` whose natural ordering
/// keeps every source of one file contiguous, sorted by build root. The
/// sources table is keyed by this.
#[derive(
    Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SourceKey(u64);

impl SourceKey {
    #[inline]
    pub const fn encode(file_id: FileId, build_root_id: BuildRootId) -> Self {
        Self(((file_id.to_raw() as u64) << 32) | build_root_id.to_raw() as u64)
    }

    #[inline]
    pub const fn decode(self) -> (FileId, BuildRootId) {
        (self.file_id(), BuildRootId::from_raw(self.0 as u32))
    }

    #[inline]
    pub const fn file_id(self) -> FileId {
        FileId::from_raw((self.0 >> 32) as u32)
    }

    /// The lowest key for `file_id`; `range_start(id)..range_start(id + 1)`
    /// covers every build of the file.
    #[inline]
    pub const fn range_start(file_id: FileId) -> Self {
        Self::encode(file_id, BuildRootId::NONE)
    }

    #[inline]
    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (file_id, build_root_id) = self.decode();
        write!(
            f,
            "SourceKey({}/{})",
            file_id.to_raw(),
            build_root_id.to_raw()
        )
    }
}

/// The compile invocation describing one translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub file_id: FileId,
    pub build_root_id: BuildRootId,
    pub compiler: PathBuf,
    pub arguments: Vec<String>,
    pub flags: u32,
    /// Millis since the epoch when this source was last successfully
    /// indexed; 0 = never. Only ever increases.
    pub parsed: u64,
}

impl Source {
    /// The build currently preferred for indexing. At most one source per
    /// file carries this flag.
    pub const ACTIVE: u32 = 0x1;

    pub fn new(file_id: FileId, build_root_id: BuildRootId) -> Self {
        Self {
            file_id,
            build_root_id,
            compiler: PathBuf::new(),
            arguments: Vec::new(),
            flags: 0,
            parsed: 0,
        }
    }

    #[inline]
    pub fn key(&self) -> SourceKey {
        SourceKey::encode(self.file_id, self.build_root_id)
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.flags & Self::ACTIVE != 0
    }

    pub fn set_active(&mut self, active: bool) {
        if active {
            self.flags |= Self::ACTIVE;
        } else {
            self.flags &= !Self::ACTIVE;
        }
    }

    /// Two sources are the same build if compiler and argument vector agree;
    /// flags and parse time do not participate.
    pub fn compare_arguments(&self, other: &Source) -> bool {
        self.compiler == other.compiler && self.arguments == other.arguments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_orders_by_file_then_build_root() {
        let a = SourceKey::encode(FileId::new(1), BuildRootId::new(2));
        let b = SourceKey::encode(FileId::new(1), BuildRootId::new(3));
        let c = SourceKey::encode(FileId::new(2), BuildRootId::new(0));
        assert!(a < b);
        assert!(b < c);
        assert!(SourceKey::range_start(FileId::new(1)) <= a);
    }

    #[test]
    fn key_round_trips() {
        let key = SourceKey::encode(FileId::new(7), BuildRootId::new(9));
        assert_eq!(key.decode(), (FileId::new(7), BuildRootId::new(9)));
        assert_eq!(key.file_id(), FileId::new(7));
    }

    #[test]
    fn active_flag_toggles_without_disturbing_other_bits() {
        let mut source = Source::new(FileId::new(1), BuildRootId::new(1));
        source.flags = 0x10;
        source.set_active(true);
        assert!(source.is_active());
        source.set_active(false);
        assert!(!source.is_active());
        assert_eq!(source.flags, 0x10);
    }

    #[test]
    fn compare_arguments_ignores_flags_and_parse_time() {
        let mut a = Source::new(FileId::new(1), BuildRootId::new(1));
        a.compiler = PathBuf::from("/usr/bin/cc");
        a.arguments = vec!["-O2".into()];

        let mut b = a.clone();
        b.flags = Source::ACTIVE;
        b.parsed = 123;
        assert!(a.compare_arguments(&b));

        b.arguments.push("-g".into());
        assert!(!a.compare_arguments(&b));
    }
}

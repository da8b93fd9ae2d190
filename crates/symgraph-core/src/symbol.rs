use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{FileId, Location, SymbolKind};

/// A per-location symbol record.
///
/// One record describes everything the index knows about the symbol at a
/// single location: its qualified name, kind, the locations it targets
/// (declarations/definitions it resolves to) and the locations that
/// reference it. Records from different translation units covering the same
/// location are folded together with [`SymbolInfo::unite`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Length of the bare symbol name at the location, e.g. `foo` => 3.
    pub symbol_length: u16,
    /// Fully qualified name, e.g. `Foobar::Barfoo::foo`.
    pub symbol_name: String,
    pub kind: SymbolKind,
    pub definition: bool,
    /// Only set for enum constants.
    pub enum_value: Option<i64>,
    pub targets: BTreeSet<Location>,
    pub references: BTreeSet<Location>,
    pub start_line: i32,
    pub start_column: i32,
    pub end_line: i32,
    pub end_column: i32,
}

impl SymbolInfo {
    pub fn new() -> Self {
        Self {
            start_line: -1,
            start_column: -1,
            end_line: -1,
            end_column: -1,
            ..Self::default()
        }
    }

    /// A record with no name, no targets and no references carries no
    /// information and is treated as null.
    pub fn is_empty(&self) -> bool {
        self.symbol_length == 0 && self.targets.is_empty() && self.references.is_empty()
    }

    /// Enum constants are definitions even though the parser does not flag
    /// them as such.
    pub fn is_definition(&self) -> bool {
        self.kind == SymbolKind::EnumConstant || self.definition
    }

    /// Folds `other` into `self`, returning whether anything changed.
    ///
    /// The record that carries a symbol length supplies the name-bearing
    /// fields; targets and references accumulate from both sides.
    pub fn unite(&mut self, other: &SymbolInfo) -> bool {
        let mut changed = false;

        let target_count = self.targets.len();
        self.targets.extend(other.targets.iter().copied());
        changed |= self.targets.len() != target_count;

        if self.start_line == -1 && other.start_line != -1 {
            self.start_line = other.start_line;
            self.start_column = other.start_column;
            self.end_line = other.end_line;
            self.end_column = other.end_column;
            changed = true;
        }

        if self.symbol_length == 0 && other.symbol_length != 0 {
            self.symbol_length = other.symbol_length;
            self.symbol_name = other.symbol_name.clone();
            self.kind = other.kind;
            self.definition = other.definition;
            self.enum_value = other.enum_value;
            changed = true;
        }

        let reference_count = self.references.len();
        self.references.extend(other.references.iter().copied());
        changed |= self.references.len() != reference_count;

        changed
    }

    /// Human-facing name: function-style names lose their argument list,
    /// field names lose the embedded bit-width annotation.
    pub fn display_name(&self) -> &str {
        match self.kind {
            SymbolKind::Function
            | SymbolKind::Method
            | SymbolKind::Constructor
            | SymbolKind::Destructor => self
                .symbol_name
                .split_once('(')
                .map(|(head, _)| head)
                .unwrap_or(&self.symbol_name),
            _ => &self.symbol_name,
        }
    }

    /// Drops targets and references that point into `dirty` files, returning
    /// whether anything was removed.
    pub fn strip_dirty(&mut self, dirty: &BTreeSet<FileId>) -> bool {
        let before = self.targets.len() + self.references.len();
        self.targets.retain(|location| !dirty.contains(&location.file_id));
        self.references
            .retain(|location| !dirty.contains(&location.file_id));
        before != self.targets.len() + self.references.len()
    }
}

/// Query result record produced by location sorting.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SortedSymbol {
    pub location: Location,
    pub kind: SymbolKind,
    pub is_definition: bool,
}

impl SortedSymbol {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            kind: SymbolKind::Invalid,
            is_definition: false,
        }
    }

    fn sort_key(&self) -> (i32, Location) {
        // Strong targets first; rank ties resolve by location so the order
        // is total and stable.
        (-self.kind.target_rank(), self.location)
    }
}

impl Ord for SortedSymbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for SortedSymbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use symgraph_core::{FileId, Location, Source, SourceKey, SymbolInfo, SymbolKind};
use symgraph_store::{StoreError, Table};

/// The on-disk table set of one project.
///
/// Cloning clones handles; the sync worker operates on the same underlying
/// tables as the orchestrator, serialized by the project state machine.
#[derive(Clone)]
pub(crate) struct ProjectTables {
    pub symbols: Table<Location, SymbolInfo>,
    pub symbol_names: Table<String, BTreeSet<Location>>,
    pub usrs: Table<String, BTreeMap<Location, SymbolKind>>,
    pub dependencies: Table<FileId, BTreeSet<FileId>>,
    pub sources: Table<SourceKey, Source>,
    pub references: Table<Location, BTreeSet<Location>>,
    pub targets: Table<Location, BTreeMap<Location, SymbolKind>>,
    pub general: Table<String, Vec<u8>>,
}

impl ProjectTables {
    /// Opens every table inside `dir`. Any failure is fatal to the load.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            symbols: Table::open(dir.join("symbols"))?,
            symbol_names: Table::open(dir.join("symbolnames"))?,
            usrs: Table::open(dir.join("usr"))?,
            dependencies: Table::open(dir.join("dependencies"))?,
            sources: Table::open(dir.join("sources"))?,
            references: Table::open(dir.join("references"))?,
            targets: Table::open(dir.join("targets"))?,
            general: Table::open(dir.join("db"))?,
        })
    }

    /// Purges `dirty` from every symbol-family table: rows keyed inside a
    /// dirty file are erased, and cross-links into dirty files are stripped
    /// from surviving rows (rows left empty are erased too). Each table's
    /// batch flushes independently.
    pub fn purge_dirty(&self, dirty: &BTreeSet<FileId>) -> Result<(), StoreError> {
        if dirty.is_empty() {
            return Ok(());
        }

        {
            let mut scope = self.symbols.write_scope();
            let mut cursor = self.symbols.cursor_first();
            while let Some(location) = cursor.key() {
                if dirty.contains(&location.file_id) {
                    scope.erase(location);
                } else if let Some(mut info) = cursor.value() {
                    if info.strip_dirty(dirty) {
                        if info.is_empty() {
                            scope.erase(location);
                        } else {
                            scope.set(location, info);
                        }
                    }
                }
                cursor.next();
            }
            scope.flush()?;
        }

        {
            let mut scope = self.symbol_names.write_scope();
            let mut cursor = self.symbol_names.cursor_first();
            while let Some(name) = cursor.key() {
                if let Some(mut locations) = cursor.value() {
                    let before = locations.len();
                    locations.retain(|location| !dirty.contains(&location.file_id));
                    if locations.is_empty() {
                        scope.erase(name);
                    } else if locations.len() != before {
                        scope.set(name, locations);
                    }
                }
                cursor.next();
            }
            scope.flush()?;
        }

        {
            let mut scope = self.usrs.write_scope();
            let mut cursor = self.usrs.cursor_first();
            while let Some(usr) = cursor.key() {
                if let Some(mut locations) = cursor.value() {
                    let before = locations.len();
                    locations.retain(|location, _| !dirty.contains(&location.file_id));
                    if locations.is_empty() {
                        scope.erase(usr);
                    } else if locations.len() != before {
                        scope.set(usr, locations);
                    }
                }
                cursor.next();
            }
            scope.flush()?;
        }

        {
            let mut scope = self.references.write_scope();
            let mut cursor = self.references.cursor_first();
            while let Some(location) = cursor.key() {
                if dirty.contains(&location.file_id) {
                    scope.erase(location);
                } else if let Some(mut referrers) = cursor.value() {
                    let before = referrers.len();
                    referrers.retain(|referrer| !dirty.contains(&referrer.file_id));
                    if referrers.is_empty() {
                        scope.erase(location);
                    } else if referrers.len() != before {
                        scope.set(location, referrers);
                    }
                }
                cursor.next();
            }
            scope.flush()?;
        }

        {
            let mut scope = self.targets.write_scope();
            let mut cursor = self.targets.cursor_first();
            while let Some(location) = cursor.key() {
                if dirty.contains(&location.file_id) {
                    scope.erase(location);
                } else if let Some(mut targets) = cursor.value() {
                    let before = targets.len();
                    targets.retain(|target, _| !dirty.contains(&target.file_id));
                    if targets.is_empty() {
                        scope.erase(location);
                    } else if targets.len() != before {
                        scope.set(location, targets);
                    }
                }
                cursor.next();
            }
            scope.flush()?;
        }

        Ok(())
    }
}

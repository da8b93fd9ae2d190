//! The sync engine: folds buffered index deltas into the persistent tables.
//!
//! A [`SyncTask`] owns everything one sync needs: table handles, the
//! drained delta batch, the drained dirty set, and the shared registry and
//! visited-files handles. It runs either inline on the orchestrator thread
//! or alone on a worker thread while the project sits in the `Syncing`
//! state; the produced [`SyncOutcome`] travels back to the orchestrator,
//! which applies the parts that must happen on its own thread (watch
//! registration, fix-it replacement).
//!
//! Failures inside a sync are logged, never propagated: a failed table
//! flush leaves that table's pre-sync image intact for the next attempt.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use symgraph_core::{FileId, FixIt, Location, SourceKey, SymbolKind};
use symgraph_vfs::FileIdRegistry;

use crate::index_data::IndexData;
use crate::tables::ProjectTables;
use crate::visited::{encode_visited, VisitedFiles};

const FILE_IDS_SAVE_ATTEMPTS: usize = 3;
const FILE_IDS_SAVE_BACKOFF: Duration = Duration::from_millis(1);

/// What a completed sync hands back to the orchestrator.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub(crate) message: String,
    /// Files first seen by this batch; their parent directories need
    /// watching.
    pub(crate) new_files: BTreeSet<FileId>,
    /// Per-file fix-it replacements in merge order; `None` clears.
    pub(crate) fix_its: Vec<(FileId, Option<BTreeSet<FixIt>>)>,
}

impl SyncOutcome {
    /// One-line batch summary; empty when the sync had nothing to do.
    pub fn message(&self) -> &str {
        &self.message
    }
}

pub(crate) struct SyncTask {
    pub tables: ProjectTables,
    pub index_data: BTreeMap<SourceKey, IndexData>,
    pub dirty_files: BTreeSet<FileId>,
    pub visited: Arc<VisitedFiles>,
    pub registry: Arc<FileIdRegistry>,
    pub objc_property_fallback: bool,
    pub file_ids_path: Option<PathBuf>,
    /// Wall time since the first job of the batch was submitted.
    pub jobs_elapsed: Duration,
}

impl SyncTask {
    pub fn run(self) -> SyncOutcome {
        if self.dirty_files.is_empty() && self.index_data.is_empty() {
            return SyncOutcome::default();
        }

        let mut stopwatch = Instant::now();

        if !self.dirty_files.is_empty() {
            if let Err(err) = self.tables.purge_dirty(&self.dirty_files) {
                tracing::error!(error = %err, "failed to purge dirty files");
            }
        }
        let dirty_time = stopwatch.elapsed();
        stopwatch = Instant::now();

        let mut new_files = BTreeSet::new();
        let mut fix_its = Vec::new();
        let mut all_usrs: BTreeMap<String, BTreeMap<Location, SymbolKind>> = BTreeMap::new();
        let mut all_references: BTreeMap<Location, BTreeSet<Location>> = BTreeMap::new();
        let mut all_targets: BTreeMap<Location, BTreeMap<Location, SymbolKind>> = BTreeMap::new();
        let mut pending_references = Vec::new();

        let mut symbols_written = 0usize;
        let mut symbol_names_written = 0usize;

        {
            let mut symbols_scope = self.tables.symbols.write_scope();
            for data in self.index_data.values() {
                self.add_dependencies(&data.dependencies, &mut new_files);
                for file_id in data.dependencies.keys() {
                    fix_its.push((*file_id, data.fix_its.get(file_id).cloned()));
                }
                unite_usr_map(&mut all_usrs, &data.usrs);
                symbols_written += write_symbols(&mut symbols_scope, data);
                symbol_names_written += self.write_symbol_names(data);
                unite_set_map(&mut all_references, &data.references);
                unite_kind_map(&mut all_targets, &data.targets);
                if !data.pending_references.is_empty() {
                    pending_references.push(&data.pending_references);
                }
            }
            // Pending-reference resolution below reads the symbols table, so
            // the batch has to land first.
            if let Err(err) = symbols_scope.flush() {
                tracing::error!(error = %err, "failed to write symbols");
            }
        }

        self.write_usrs(&all_usrs, &mut all_targets);
        for pending in pending_references {
            self.resolve_pending_references(pending, &mut all_targets, &mut all_references);
        }
        let references_written = commit_set_values(&self.tables.references, &all_references);
        let targets_written = commit_kind_values(&self.tables.targets, &all_targets);

        let sync_time = stopwatch.elapsed();
        stopwatch = Instant::now();

        if let Some(path) = &self.file_ids_path {
            for attempt in 1..=FILE_IDS_SAVE_ATTEMPTS {
                match self.registry.save(path) {
                    Ok(()) => break,
                    Err(err) => {
                        tracing::warn!(
                            attempt,
                            error = %err,
                            "failed to save file-id registry"
                        );
                        std::thread::sleep(FILE_IDS_SAVE_BACKOFF);
                    }
                }
            }
        }

        let snapshot = self.visited.snapshot();
        match encode_visited(&snapshot) {
            Ok(bytes) => {
                let mut scope = self.tables.general.write_scope();
                scope.set("visitedFiles".to_string(), bytes);
                if let Err(err) = scope.flush() {
                    tracing::error!(error = %err, "failed to persist visited files");
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to encode visited files");
            }
        }
        let save_time = stopwatch.elapsed();

        let jobs = self.index_data.len();
        let jobs_secs = self.jobs_elapsed.as_secs_f64();
        let average = if jobs > 1 {
            format!("(avg {:.2}s), ", jobs_secs / jobs as f64)
        } else {
            String::new()
        };
        let message = format!(
            "Jobs took {:.2}s, {}dirtying took {:.2}s, syncing took {:.2}s, \
             saving took {:.2}s. {} symbols, {} targets, {} references, {} symbolNames",
            jobs_secs,
            average,
            dirty_time.as_secs_f64(),
            sync_time.as_secs_f64(),
            save_time.as_secs_f64(),
            symbols_written,
            targets_written,
            references_written,
            symbol_names_written,
        );

        SyncOutcome {
            message,
            new_files,
            fix_its,
        }
    }

    /// Merges one TU's include graph into the dependencies table and
    /// collects every mentioned file into `new_files`.
    fn add_dependencies(
        &self,
        dependencies: &BTreeMap<FileId, BTreeSet<FileId>>,
        new_files: &mut BTreeSet<FileId>,
    ) {
        let mut scope = self.tables.dependencies.write_scope();
        for (header, dependents) in dependencies {
            match scope.value(header) {
                None => scope.set(*header, dependents.clone()),
                Some(mut current) => {
                    let before = current.len();
                    current.extend(dependents.iter().copied());
                    if current.len() != before {
                        scope.set(*header, current);
                    }
                }
            }
            new_files.insert(*header);
            new_files.extend(dependents.iter().copied());
        }
        if let Err(err) = scope.flush() {
            tracing::error!(error = %err, "failed to write dependencies");
        }
    }

    fn write_symbol_names(&self, data: &IndexData) -> usize {
        let mut written = 0;
        let mut scope = self.tables.symbol_names.write_scope();
        for (name, locations) in &data.symbol_names {
            match scope.value(name) {
                None => {
                    written += locations.len();
                    scope.set(name.clone(), locations.clone());
                }
                Some(mut current) => {
                    let before = current.len();
                    current.extend(locations.iter().copied());
                    if current.len() != before {
                        written += current.len() - before;
                        scope.set(name.clone(), current);
                    }
                }
            }
        }
        if let Err(err) = scope.flush() {
            tracing::error!(error = %err, "failed to write symbol names");
        }
        written
    }

    /// Merges the accumulated USR map into the table. Whenever a USR ends
    /// up naming more than one location, every pair of those locations gets
    /// a bidirectional target edge so navigation resolves across TU
    /// boundaries.
    fn write_usrs(
        &self,
        all_usrs: &BTreeMap<String, BTreeMap<Location, SymbolKind>>,
        all_targets: &mut BTreeMap<Location, BTreeMap<Location, SymbolKind>>,
    ) {
        let mut scope = self.tables.usrs.write_scope();
        for (usr, locations) in all_usrs {
            match scope.value(usr) {
                None => {
                    if locations.len() > 1 {
                        join_cursors(all_targets, locations);
                    }
                    scope.set(usr.clone(), locations.clone());
                }
                Some(mut current) => {
                    let mut added = false;
                    for (location, kind) in locations {
                        if !current.contains_key(location) {
                            current.insert(*location, *kind);
                            added = true;
                        }
                    }
                    if added {
                        if current.len() > 1 {
                            join_cursors(all_targets, &current);
                        }
                        scope.set(usr.clone(), current);
                    }
                }
            }
        }
        if let Err(err) = scope.flush() {
            tracing::error!(error = %err, "failed to write usrs");
        }
    }

    /// Resolves references the indexers could not bind inside their own TU
    /// by looking their USR up in the merged table.
    fn resolve_pending_references(
        &self,
        pending: &BTreeMap<String, BTreeMap<Location, SymbolKind>>,
        all_targets: &mut BTreeMap<Location, BTreeMap<Location, SymbolKind>>,
        all_references: &mut BTreeMap<Location, BTreeSet<Location>>,
    ) {
        for (usr, references) in pending {
            let mut candidates = vec![usr.clone()];
            if self.objc_property_fallback {
                // Assume an implicit instance method for a property and
                // retry with the last (im) decoration rewritten to (py).
                if let Some(index) = usr.rfind("(im)") {
                    let mut rewritten = usr.clone();
                    rewritten.replace_range(index..index + 4, "(py)");
                    candidates.push(rewritten);
                }
            }

            let mut declarations: BTreeMap<Location, SymbolKind> = BTreeMap::new();
            for candidate in &candidates {
                let Some(locations) = self.tables.usrs.value(candidate) else {
                    continue;
                };
                for location in locations.keys() {
                    let Some(symbol) = self.tables.symbols.value(location) else {
                        continue;
                    };
                    if !symbol.kind.is_reference() {
                        declarations.insert(*location, symbol.kind);
                    }
                }
            }

            if declarations.is_empty() {
                continue;
            }
            for reference in references.keys() {
                let targets = all_targets.entry(*reference).or_default();
                for (declaration, kind) in &declarations {
                    targets.insert(*declaration, *kind);
                    all_references
                        .entry(*declaration)
                        .or_default()
                        .insert(*reference);
                }
            }
        }
    }
}

/// Writes one TU's symbols through the shared scope, folding records that
/// collide on a location with [`symgraph_core::SymbolInfo::unite`]. Returns
/// the number of records written.
fn write_symbols(
    scope: &mut symgraph_store::WriteScope<Location, symgraph_core::SymbolInfo>,
    data: &IndexData,
) -> usize {
    let mut written = 0;
    for (location, info) in &data.symbols {
        match scope.value(location) {
            None => {
                scope.set(*location, info.clone());
                written += 1;
            }
            Some(mut current) => {
                if current.unite(info) {
                    scope.set(*location, current);
                    written += 1;
                }
            }
        }
    }
    written
}

fn unite_set_map(
    current: &mut BTreeMap<Location, BTreeSet<Location>>,
    new_values: &BTreeMap<Location, BTreeSet<Location>>,
) {
    for (key, values) in new_values {
        current
            .entry(*key)
            .or_default()
            .extend(values.iter().copied());
    }
}

fn unite_kind_map(
    current: &mut BTreeMap<Location, BTreeMap<Location, SymbolKind>>,
    new_values: &BTreeMap<Location, BTreeMap<Location, SymbolKind>>,
) {
    for (key, values) in new_values {
        let entry = current.entry(*key).or_default();
        for (location, kind) in values {
            entry.entry(*location).or_insert(*kind);
        }
    }
}

fn unite_usr_map(
    current: &mut BTreeMap<String, BTreeMap<Location, SymbolKind>>,
    new_values: &BTreeMap<String, BTreeMap<Location, SymbolKind>>,
) {
    for (usr, locations) in new_values {
        let entry = current.entry(usr.clone()).or_default();
        for (location, kind) in locations {
            entry.entry(*location).or_insert(*kind);
        }
    }
}

/// Gives every pair of distinct locations sharing a USR a mutual target
/// edge.
fn join_cursors(
    all_targets: &mut BTreeMap<Location, BTreeMap<Location, SymbolKind>>,
    locations: &BTreeMap<Location, SymbolKind>,
) {
    for location in locations.keys() {
        let targets = all_targets.entry(*location).or_default();
        for (other, kind) in locations {
            if other != location {
                targets.insert(*other, *kind);
            }
        }
    }
}

/// Commits accumulated reference sets: new rows are written outright,
/// existing rows only when the union strictly grows. Returns the number of
/// rows written.
fn commit_set_values(
    table: &symgraph_store::Table<Location, BTreeSet<Location>>,
    values: &BTreeMap<Location, BTreeSet<Location>>,
) -> usize {
    let mut written = 0;
    let mut scope = table.write_scope();
    for (key, new_values) in values {
        match scope.value(key) {
            None => {
                scope.set(*key, new_values.clone());
                written += 1;
            }
            Some(mut current) => {
                let before = current.len();
                current.extend(new_values.iter().copied());
                if current.len() != before {
                    scope.set(*key, current);
                    written += 1;
                }
            }
        }
    }
    if let Err(err) = scope.flush() {
        tracing::error!(error = %err, "failed to write references");
    }
    written
}

fn commit_kind_values(
    table: &symgraph_store::Table<Location, BTreeMap<Location, SymbolKind>>,
    values: &BTreeMap<Location, BTreeMap<Location, SymbolKind>>,
) -> usize {
    let mut written = 0;
    let mut scope = table.write_scope();
    for (key, new_values) in values {
        match scope.value(key) {
            None => {
                scope.set(*key, new_values.clone());
                written += 1;
            }
            Some(mut current) => {
                let mut added = false;
                for (location, kind) in new_values {
                    if !current.contains_key(location) {
                        current.insert(*location, *kind);
                        added = true;
                    }
                }
                if added {
                    scope.set(*key, current);
                    written += 1;
                }
            }
        }
    }
    if let Err(err) = scope.flush() {
        tracing::error!(error = %err, "failed to write targets");
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use symgraph_core::{BuildRootId, FileId, SymbolInfo};

    use crate::index_data::JobFlags;

    fn loc(file: u32, line: u32, column: u32) -> Location {
        Location::new(FileId::new(file), line, column)
    }

    fn task(dir: &tempfile::TempDir) -> SyncTask {
        SyncTask {
            tables: ProjectTables::open(dir.path()).unwrap(),
            index_data: BTreeMap::new(),
            dirty_files: BTreeSet::new(),
            visited: Arc::new(VisitedFiles::new()),
            registry: Arc::new(FileIdRegistry::new()),
            objc_property_fallback: true,
            file_ids_path: None,
            jobs_elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn empty_sync_produces_no_message() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = task(&dir).run();
        assert_eq!(outcome.message(), "");
        assert!(outcome.new_files.is_empty());
    }

    #[test]
    fn sync_reports_counters_and_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = task(&dir);

        let key = SourceKey::encode(FileId::new(1), BuildRootId::new(1));
        let mut data = IndexData::new(key, JobFlags::COMPLETE);
        let mut info = SymbolInfo::new();
        info.symbol_length = 3;
        info.symbol_name = "foo".into();
        data.symbols.insert(loc(1, 1, 1), info);
        data.symbol_names
            .entry("foo".to_string())
            .or_default()
            .insert(loc(1, 1, 1));
        data.dependencies
            .entry(FileId::new(2))
            .or_default()
            .insert(FileId::new(1));
        task.index_data.insert(key, data);

        let tables = task.tables.clone();
        let outcome = task.run();

        assert!(outcome.message().contains("1 symbols"));
        assert!(outcome.message().contains("1 symbolNames"));
        assert_eq!(
            outcome.new_files,
            BTreeSet::from([FileId::new(1), FileId::new(2)])
        );
        assert_eq!(tables.symbols.len(), 1);
        // The visited snapshot landed in the general table even when empty.
        assert!(tables.general.contains(&"visitedFiles".to_string()));
    }

    #[test]
    fn join_cursors_cross_links_every_pair() {
        let mut all_targets = BTreeMap::new();
        let locations = BTreeMap::from([
            (loc(1, 1, 1), SymbolKind::Function),
            (loc(2, 1, 1), SymbolKind::Function),
            (loc(3, 1, 1), SymbolKind::Function),
        ]);
        join_cursors(&mut all_targets, &locations);

        for (location, targets) in &all_targets {
            assert_eq!(targets.len(), 2);
            assert!(!targets.contains_key(location));
        }
        assert_eq!(all_targets.len(), 3);
    }

    #[test]
    fn unite_kind_map_keeps_the_first_kind_for_a_location() {
        let mut current = BTreeMap::from([(
            loc(1, 1, 1),
            BTreeMap::from([(loc(2, 1, 1), SymbolKind::Function)]),
        )]);
        let incoming = BTreeMap::from([(
            loc(1, 1, 1),
            BTreeMap::from([
                (loc(2, 1, 1), SymbolKind::Macro),
                (loc(3, 1, 1), SymbolKind::Class),
            ]),
        )]);
        unite_kind_map(&mut current, &incoming);

        let merged = &current[&loc(1, 1, 1)];
        assert_eq!(merged[&loc(2, 1, 1)], SymbolKind::Function);
        assert_eq!(merged[&loc(3, 1, 1)], SymbolKind::Class);
    }

    #[test]
    fn commit_set_values_writes_only_strict_growth() {
        let dir = tempfile::tempdir().unwrap();
        let table: symgraph_store::Table<Location, BTreeSet<Location>> =
            symgraph_store::Table::open(dir.path().join("references")).unwrap();

        let key = loc(1, 1, 1);
        let first = BTreeMap::from([(key, BTreeSet::from([loc(2, 1, 1)]))]);
        assert_eq!(commit_set_values(&table, &first), 1);

        // Same content again: nothing to write.
        assert_eq!(commit_set_values(&table, &first), 0);

        // A superset grows the row; the union survives, not the delta.
        let second = BTreeMap::from([(key, BTreeSet::from([loc(3, 1, 1)]))]);
        assert_eq!(commit_set_values(&table, &second), 1);
        assert_eq!(
            table.value(&key).unwrap(),
            BTreeSet::from([loc(2, 1, 1), loc(3, 1, 1)])
        );
    }

    #[test]
    fn write_symbols_unites_colliding_records() {
        let dir = tempfile::tempdir().unwrap();
        let tables = ProjectTables::open(dir.path()).unwrap();

        let location = loc(1, 4, 2);
        let key = SourceKey::encode(FileId::new(1), BuildRootId::new(1));

        let mut named = SymbolInfo::new();
        named.symbol_length = 3;
        named.symbol_name = "foo".into();
        let mut first = IndexData::new(key, JobFlags::COMPLETE);
        first.symbols.insert(location, named.clone());

        let mut anonymous = SymbolInfo::new();
        anonymous.references.insert(loc(2, 9, 9));
        let mut second = IndexData::new(key, JobFlags::COMPLETE);
        second.symbols.insert(location, anonymous);

        let mut scope = tables.symbols.write_scope();
        assert_eq!(write_symbols(&mut scope, &first), 1);
        assert_eq!(write_symbols(&mut scope, &second), 1);
        scope.flush().unwrap();

        let merged = tables.symbols.value(&location).unwrap();
        assert_eq!(merged.symbol_name, "foo");
        assert_eq!(merged.references, BTreeSet::from([loc(2, 9, 9)]));
    }
}

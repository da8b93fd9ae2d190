//! Query helpers shared by the project's lookup surface.

use std::collections::BTreeMap;

use symgraph_core::{Location, NameMatchMode, SymbolInfo};
use symgraph_store::Table;

pub const SORT_NONE: u32 = 0x0;
/// Drop definitions whose best target resolves to a live declaration.
pub const SORT_DECLARATION_ONLY: u32 = 0x1;
pub const SORT_REVERSE: u32 = 0x2;

/// Symbol-name matching.
///
/// Locals and parameters are indexed under names nested inside their
/// enclosing function's signature, e.g. `foo(int)::bar`. For kinds that may
/// be such locals, matching restarts after the `")::"` sentinel so `bar`
/// finds the local but `foo` does not accidentally hit it. A prefix match
/// is accepted when it either consumes the stored name entirely or stops at
/// the argument list of a function-style name.
pub fn match_symbol_name(needle: &str, haystack: &str, mode: NameMatchMode) -> bool {
    if needle == haystack {
        return true;
    }
    let mut rest = haystack;
    if mode == NameMatchMode::MaybeFunction {
        if let Some(index) = haystack.rfind(")::") {
            rest = &haystack[index + 3..];
        }
    }
    if !rest.starts_with(needle) {
        return false;
    }
    let tail = &rest[needle.len()..];
    tail.is_empty() || (tail.starts_with('(') && !tail.contains(")::"))
}

/// Location-tolerant symbol lookup.
///
/// A point query that misses falls back to the previous entry when it sits
/// on the same file and line and its symbol length spans the requested
/// column, so a query in the middle of an identifier still resolves.
pub(crate) fn find_symbol(
    symbols: &Table<Location, SymbolInfo>,
    location: Location,
) -> Option<(Location, SymbolInfo)> {
    let mut cursor = symbols.lower_bound(&location);
    match cursor.key() {
        Some(key) if key == location => {
            return cursor.value().map(|info| (key, info));
        }
        Some(_) => cursor.prev(),
        None => cursor.seek_to_end(),
    }

    let key = cursor.key()?;
    if key.file_id != location.file_id || key.line != location.line {
        return None;
    }
    let offset = location.column.checked_sub(key.column)?;
    let info = cursor.value()?;
    if u32::from(info.symbol_length) > offset {
        Some((key, info))
    } else {
        None
    }
}

/// Ranks `info`'s targets and returns the strongest one; ties go to
/// definitions. Targets whose record is missing from the table (e.g.
/// inclusion directives targeting a bare file) rank with an empty record.
pub(crate) fn best_target(
    info: &SymbolInfo,
    symbols: &Table<Location, SymbolInfo>,
) -> Option<(Location, SymbolInfo)> {
    let mut resolved: BTreeMap<Location, SymbolInfo> = BTreeMap::new();
    for &target in &info.targets {
        let record = find_symbol(symbols, target)
            .map(|(_, record)| record)
            .unwrap_or_else(SymbolInfo::new);
        resolved.insert(target, record);
    }

    let mut best: Option<(Location, SymbolInfo)> = None;
    let mut best_rank = -1;
    for (location, record) in resolved {
        let rank = record.kind.target_rank();
        if rank > best_rank || (rank == best_rank && record.is_definition()) {
            best_rank = rank;
            best = Some((location, record));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use symgraph_core::{FileId, SymbolKind};

    #[test]
    fn exact_and_call_style_names_match() {
        assert!(match_symbol_name("foo", "foo", NameMatchMode::MaybeFunction));
        assert!(match_symbol_name("foo", "foo(int)", NameMatchMode::MaybeFunction));
        assert!(match_symbol_name("foo", "foo(int)", NameMatchMode::NonFunction));
    }

    #[test]
    fn names_nested_in_signatures_do_not_match_the_function() {
        assert!(!match_symbol_name(
            "foo",
            "foo(int)::bar",
            NameMatchMode::MaybeFunction
        ));
        assert!(!match_symbol_name(
            "foo",
            "foo(int)::bar",
            NameMatchMode::NonFunction
        ));
    }

    #[test]
    fn matching_restarts_after_the_signature_sentinel() {
        assert!(match_symbol_name(
            "bar",
            "foo(int)::bar",
            NameMatchMode::MaybeFunction
        ));
        // The exact stored name always matches itself.
        assert!(match_symbol_name(
            "foo(int)::bar",
            "foo(int)::bar",
            NameMatchMode::MaybeFunction
        ));
    }

    #[test]
    fn plain_prefixes_do_not_match() {
        assert!(!match_symbol_name("fo", "foo", NameMatchMode::MaybeFunction));
        assert!(!match_symbol_name(
            "foo",
            "foobar",
            NameMatchMode::NonFunction
        ));
    }

    fn loc(file: u32, line: u32, column: u32) -> Location {
        Location::new(FileId::new(file), line, column)
    }

    fn symbols_table(dir: &tempfile::TempDir) -> Table<Location, SymbolInfo> {
        Table::open(dir.path().join("symbols")).unwrap()
    }

    #[test]
    fn find_symbol_tolerates_mid_identifier_columns() {
        let dir = tempfile::tempdir().unwrap();
        let table = symbols_table(&dir);
        let mut scope = table.write_scope();
        let mut info = SymbolInfo::new();
        info.symbol_length = 6;
        info.symbol_name = "foobar".into();
        info.kind = SymbolKind::Function;
        scope.set(loc(1, 3, 5), info);
        scope.flush().unwrap();

        // Exact hit.
        assert!(find_symbol(&table, loc(1, 3, 5)).is_some());
        // Inside the identifier.
        let (found, _) = find_symbol(&table, loc(1, 3, 9)).unwrap();
        assert_eq!(found, loc(1, 3, 5));
        // Past the identifier.
        assert!(find_symbol(&table, loc(1, 3, 11)).is_none());
        // Different line.
        assert!(find_symbol(&table, loc(1, 4, 5)).is_none());
    }

    #[test]
    fn best_target_prefers_strong_kinds_then_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let table = symbols_table(&dir);
        let mut scope = table.write_scope();

        let mut class_decl = SymbolInfo::new();
        class_decl.symbol_length = 1;
        class_decl.symbol_name = "C".into();
        class_decl.kind = SymbolKind::Class;
        scope.set(loc(1, 1, 1), class_decl);

        let mut method_decl = SymbolInfo::new();
        method_decl.symbol_length = 1;
        method_decl.symbol_name = "C::m".into();
        method_decl.kind = SymbolKind::Method;
        scope.set(loc(1, 2, 1), method_decl);

        let mut method_def = SymbolInfo::new();
        method_def.symbol_length = 1;
        method_def.symbol_name = "C::m".into();
        method_def.kind = SymbolKind::Method;
        method_def.definition = true;
        scope.set(loc(2, 10, 1), method_def);
        scope.flush().unwrap();

        let mut reference = SymbolInfo::new();
        reference.kind = SymbolKind::Call;
        reference.targets.insert(loc(1, 1, 1));
        reference.targets.insert(loc(1, 2, 1));
        reference.targets.insert(loc(2, 10, 1));

        let (best, record) = best_target(&reference, &table).unwrap();
        // Methods outrank the class declaration; the definition wins the
        // rank tie against the declaration.
        assert_eq!(best, loc(2, 10, 1));
        assert!(record.is_definition());
    }
}

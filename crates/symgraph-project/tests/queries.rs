//! Query surface coverage: name lookup, sorting, dependency traversal,
//! source admission, removal, re-indexing, and fix-its.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::*;
use pretty_assertions::assert_eq;
use symgraph_core::{FileId, PathMatch, SymbolKind};
use symgraph_project::{
    DependencyMode, ReindexMode, State, SyncMode, SORT_DECLARATION_ONLY, SORT_NONE, SORT_REVERSE,
};

/// Indexes one TU with a definition, a declaration in a header, and a call
/// site, then syncs.
fn indexed_fixture() -> (Fixture, FileId, FileId) {
    let mut fx = Fixture::new();
    fx.load();
    let a_cpp = fx.file("a.cpp");
    let a_h = fx.file("a.h");

    let job = fx.compile_job(a_cpp, 1, &["-O2"]);
    fx.project.index(Arc::clone(&job));

    let definition = loc(a_cpp, 10, 5);
    let declaration = loc(a_h, 2, 3);
    let call = loc(a_cpp, 20, 9);

    let mut def_info = symbol("ns::frob(int)", SymbolKind::Function, true);
    def_info.targets.insert(declaration);
    let mut decl_info = symbol("ns::frob(int)", SymbolKind::Function, false);
    decl_info.targets.insert(definition);

    let data = IndexDataBuilder::new(&job)
        .symbol(definition, def_info)
        .symbol(declaration, decl_info)
        .symbol(call, symbol("ns::frob", SymbolKind::Call, false))
        .reference(call, definition, SymbolKind::Function)
        .depends(a_h, a_cpp)
        .depends(a_cpp, a_cpp)
        .build();
    fx.project.on_job_finished(job, data);
    fx.project.start_sync(SyncMode::Synchronous);
    (fx, a_cpp, a_h)
}

#[test]
fn empty_name_returns_every_non_reference_symbol() {
    let (fx, a_cpp, a_h) = indexed_fixture();
    let all = fx.project.locations("", FileId::NONE);
    // The call site is a reference kind and must not appear.
    assert_eq!(
        all,
        BTreeSet::from([loc(a_cpp, 10, 5), loc(a_h, 2, 3)])
    );
}

#[test]
fn name_lookup_accepts_stripped_and_full_names() {
    let (fx, a_cpp, a_h) = indexed_fixture();
    let expected = BTreeSet::from([loc(a_cpp, 10, 5), loc(a_h, 2, 3)]);

    assert_eq!(fx.project.locations("ns::frob", FileId::NONE), expected);
    assert_eq!(fx.project.locations("ns::frob(int)", FileId::NONE), expected);
    // Plain prefixes don't match.
    assert!(fx.project.locations("ns::fro", FileId::NONE).is_empty());
}

#[test]
fn file_scoped_lookup_is_confined_to_the_file() {
    let (fx, a_cpp, a_h) = indexed_fixture();

    assert_eq!(
        fx.project.locations("", a_cpp),
        BTreeSet::from([loc(a_cpp, 10, 5)])
    );
    assert_eq!(
        fx.project.locations("ns::frob", a_h),
        BTreeSet::from([loc(a_h, 2, 3)])
    );
}

#[test]
fn symbols_for_file_scans_in_location_order() {
    let (fx, a_cpp, _a_h) = indexed_fixture();
    let symbols = fx.project.symbols_for_file(a_cpp);
    assert_eq!(
        symbols.keys().copied().collect::<Vec<_>>(),
        vec![loc(a_cpp, 10, 5), loc(a_cpp, 20, 9)]
    );
}

#[test]
fn sort_reverse_twice_is_the_default_order() {
    let (fx, _a_cpp, _a_h) = indexed_fixture();
    let all = fx.project.locations("", FileId::NONE);

    let default_order = fx.project.sort(&all, SORT_NONE);
    let mut double_reverse = fx.project.sort(&all, SORT_REVERSE);
    double_reverse.reverse();
    assert_eq!(default_order, double_reverse);
}

#[test]
fn sort_declaration_only_drops_definitions_with_live_declarations() {
    let (fx, a_cpp, a_h) = indexed_fixture();
    let all = BTreeSet::from([loc(a_cpp, 10, 5), loc(a_h, 2, 3)]);

    let sorted = fx.project.sort(&all, SORT_DECLARATION_ONLY);
    let locations: Vec<_> = sorted.iter().map(|node| node.location).collect();
    // The definition's best target is the (non-empty) declaration, so only
    // the declaration survives.
    assert_eq!(locations, vec![loc(a_h, 2, 3)]);
    assert!(!sorted[0].is_definition);
}

#[test]
fn symbol_at_resolves_mid_identifier_lookups() {
    let (fx, a_cpp, _a_h) = indexed_fixture();
    // `frob` has symbol length 4; column 7 is inside it.
    let (found, info) = fx.project.symbol_at(loc(a_cpp, 10, 7)).expect("hit");
    assert_eq!(found, loc(a_cpp, 10, 5));
    assert!(info.is_definition());
    assert!(fx.project.symbol_at(loc(a_cpp, 10, 3)).is_none());
}

#[test]
fn dependency_queries_work_in_both_directions() {
    let (fx, a_cpp, a_h) = indexed_fixture();

    assert_eq!(
        fx.project.dependencies(a_h, DependencyMode::DependsOnArg),
        BTreeSet::from([a_cpp])
    );
    assert_eq!(
        fx.project.dependencies(a_cpp, DependencyMode::ArgDependsOn),
        BTreeSet::from([a_cpp, a_h])
    );
}

#[test]
fn active_source_is_exclusive_per_file() {
    let mut fx = Fixture::new();
    fx.load();
    let a_cpp = fx.file("a.cpp");

    let build_one = fx.compile_job(a_cpp, 1, &["-DA"]);
    fx.project.index(Arc::clone(&build_one));
    let build_two = fx.compile_job(a_cpp, 2, &["-DB"]);
    fx.project.index(Arc::clone(&build_two));

    let sources = fx.project.sources(a_cpp);
    assert_eq!(sources.len(), 2);
    let active: Vec<_> = sources.iter().filter(|source| source.is_active()).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].build_root_id.to_raw(), 2);

    // Re-submitting the first build with identical arguments flips the
    // active build without starting a new job.
    fx.scheduler.take_added();
    let resubmit = fx.compile_job(a_cpp, 1, &["-DA"]);
    fx.project.index(resubmit);
    assert!(fx.scheduler.added().is_empty());

    let sources = fx.project.sources(a_cpp);
    let active: Vec<_> = sources.iter().filter(|source| source.is_active()).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].build_root_id.to_raw(), 1);
}

#[test]
fn disallow_multiple_sources_erases_competing_builds() {
    let mut options = symgraph_project::ProjectOptions::default();
    options.disallow_multiple_sources = true;
    let mut fx = Fixture::with_options(options);
    fx.load();
    let a_cpp = fx.file("a.cpp");

    let build_one = fx.compile_job(a_cpp, 1, &["-DA"]);
    fx.project.index(Arc::clone(&build_one));
    let build_two = fx.compile_job(a_cpp, 2, &["-DB"]);
    fx.project.index(Arc::clone(&build_two));

    let sources = fx.project.sources(a_cpp);
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].build_root_id.to_raw(), 2);
    assert!(sources[0].is_active());
}

#[test]
fn remove_erases_sources_and_purges_symbol_tables() {
    let (mut fx, a_cpp, a_h) = indexed_fixture();

    let removed = fx
        .project
        .remove(&PathMatch::path(fx.path_of(a_cpp)));
    assert_eq!(removed, 1);

    assert!(fx.project.sources(a_cpp).is_empty());
    assert!(fx.project.locations("", a_cpp).is_empty());
    // The declaration in the header survives, but its reverse links into
    // the removed file are gone.
    assert!(!fx.project.locations("", a_h).is_empty());
    assert!(fx.project.references_to(loc(a_cpp, 10, 5)).is_empty());
}

#[test]
fn remove_aborts_the_active_job() {
    let mut fx = Fixture::new();
    fx.load();
    let a_cpp = fx.file("a.cpp");

    let job = fx.compile_job(a_cpp, 1, &[]);
    fx.project.index(Arc::clone(&job));
    assert!(fx.claim(&job, a_cpp));

    let removed = fx.project.remove(&PathMatch::path(fx.path_of(a_cpp)));
    assert_eq!(removed, 1);
    assert!(!fx.project.is_indexing());
    assert!(fx.project.visited_files().is_empty());
    let aborted = fx.scheduler.aborted();
    assert_eq!(aborted.len(), 1);
    assert!(Arc::ptr_eq(&aborted[0], &job));
}

#[test]
fn reindex_resubmits_matching_sources() {
    let (mut fx, a_cpp, _a_h) = indexed_fixture();
    fx.scheduler.take_added();

    let started = fx.project.reindex(&PathMatch::any(), ReindexMode::Reindex);
    assert_eq!(started, 1);
    let added = fx.scheduler.added();
    assert_eq!(added[0].source.file_id, a_cpp);
    assert!(added[0].flags.contains(symgraph_project::JobFlags::DIRTY));
}

#[test]
fn check_reindex_skips_up_to_date_sources() {
    let (mut fx, _a_cpp, a_h) = indexed_fixture();
    fx.scheduler.take_added();

    // Nothing changed since the parse: no jobs.
    let started = fx
        .project
        .reindex(&PathMatch::any(), ReindexMode::CheckReindex);
    assert_eq!(started, 0);

    // After touching the header, the same query resubmits the TU. The
    // sleep keeps the new mtime strictly past the recorded parse time on
    // filesystems with millisecond stamps.
    std::thread::sleep(std::time::Duration::from_millis(10));
    fx.touch(a_h);
    let started = fx
        .project
        .reindex(&PathMatch::any(), ReindexMode::CheckReindex);
    assert_eq!(started, 1);
}

#[test]
fn fix_its_replace_per_file_and_render_newest_first() {
    let mut fx = Fixture::new();
    fx.load();
    let a_cpp = fx.file("a.cpp");

    let job = fx.compile_job(a_cpp, 1, &[]);
    fx.project.index(Arc::clone(&job));
    let data = IndexDataBuilder::new(&job)
        .depends(a_cpp, a_cpp)
        .fix_it(a_cpp, 3, 1, 4, "int")
        .fix_it(a_cpp, 7, 2, 0, ";")
        .build();
    fx.project.on_job_finished(job, data);
    fx.project.start_sync(SyncMode::Synchronous);

    assert_eq!(fx.project.fix_its(a_cpp), "7:2 0 ;\n3:1 4 int");

    // A clean rebuild clears the recorded fix-its.
    let rebuild = fx.compile_job(a_cpp, 1, &["-DCLEAN"]);
    fx.project.index(Arc::clone(&rebuild));
    let clean = IndexDataBuilder::new(&rebuild).depends(a_cpp, a_cpp).build();
    fx.project.on_job_finished(rebuild, clean);
    fx.project.start_sync(SyncMode::Synchronous);

    assert_eq!(fx.project.fix_its(a_cpp), "");
}

#[test]
fn merged_records_read_back_exactly_as_carried() {
    let mut fx = Fixture::new();
    fx.load();
    let a_cpp = fx.file("a.cpp");

    let job = fx.compile_job(a_cpp, 1, &[]);
    fx.project.index(Arc::clone(&job));

    let definition = loc(a_cpp, 10, 5);
    let mut info = symbol("ns::thing", SymbolKind::Variable, true);
    info.enum_value = None;
    info.start_line = 10;
    info.start_column = 5;
    info.end_line = 10;
    info.end_column = 13;

    let data = IndexDataBuilder::new(&job)
        .symbol(definition, info.clone())
        .depends(a_cpp, a_cpp)
        .build();
    fx.project.on_job_finished(job, data);
    fx.project.start_sync(SyncMode::Synchronous);

    // Merging into empty state is lossless: the stored record equals the
    // record the delta carried.
    let (found, stored) = fx.project.symbol_at(definition).expect("stored");
    assert_eq!(found, definition);
    assert_eq!(stored, info);
}

#[test]
fn suspend_set_round_trips() {
    let mut fx = Fixture::new();
    fx.load();
    let a_cpp = fx.file("a.cpp");
    let a_h = fx.file("a.h");

    assert!(fx.project.toggle_suspend_file(a_cpp));
    assert!(fx.project.toggle_suspend_file(a_h));
    assert!(fx.project.is_suspended(a_cpp));
    assert_eq!(fx.project.suspended_files().len(), 2);

    assert!(!fx.project.toggle_suspend_file(a_cpp));
    assert!(!fx.project.is_suspended(a_cpp));

    fx.project.clear_suspended_files();
    assert!(fx.project.suspended_files().is_empty());
}

#[test]
fn suspended_project_drops_known_compile_submissions() {
    let mut fx = Fixture::new();
    fx.load();
    let a_cpp = fx.file("a.cpp");

    let job = fx.compile_job(a_cpp, 1, &[]);
    fx.project.index(Arc::clone(&job));
    let data = IndexDataBuilder::new(&job).depends(a_cpp, a_cpp).build();
    fx.project.on_job_finished(job, data);
    fx.project.start_sync(SyncMode::Synchronous);
    fx.scheduler.take_added();

    fx.project.set_suspended(true);
    let resubmit = fx.compile_job(a_cpp, 1, &["-DNEW"]);
    fx.project.index(resubmit);
    assert!(fx.scheduler.added().is_empty());

    fx.project.set_suspended(false);
    let resubmit = fx.compile_job(a_cpp, 1, &["-DNEW"]);
    fx.project.index(resubmit);
    assert_eq!(fx.scheduler.added().len(), 1);
}

#[test]
fn is_indexed_and_project_matching() {
    let (fx, a_cpp, a_h) = indexed_fixture();

    assert!(fx.project.is_indexed(a_cpp));
    // The header has no source row and no live claim.
    assert!(!fx.project.is_indexed(a_h));

    assert!(fx.project.matches(&PathMatch::path(fx.path_of(a_cpp))));
    assert!(fx
        .project
        .matches(&PathMatch::path(fx.dir.path().join("project"))));
    assert!(!fx.project.matches(&PathMatch::path("/elsewhere")));
    assert_eq!(fx.project.state(), State::Loaded);
}

#[test]
fn file_filter_skips_non_matching_submissions() {
    let mut options = symgraph_project::ProjectOptions::default();
    options.file_filter = Some("keepme".to_string());
    let mut fx = Fixture::with_options(options);
    fx.load();
    let skipped = fx.file("other.cpp");
    let kept = fx.file("keepme.cpp");

    fx.project.index(fx.compile_job(skipped, 1, &[]));
    assert!(fx.scheduler.added().is_empty());

    fx.project.index(fx.compile_job(kept, 1, &[]));
    assert_eq!(fx.scheduler.added().len(), 1);
}

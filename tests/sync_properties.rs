//! End-to-end synchronization properties
//!
//! Each test drives a [`SyncCoordinator`] over a real temp tree, an in-memory
//! SQLite store and a [`MemoryIndex`], then checks both stores.

mod common;

use common::{assert_stores_agree, case_names, TestRepo, BROKEN_SOURCE, CART_CASES, LOGIN_CASES};

use case_indexer::{
    document_id, initial_scan, CaseParser, CaseStore, MemoryIndex, RetryPolicy, SyncCoordinator,
};
use md5::{Digest, Md5};

const FOO_SOURCE: &str = r#"class TestFoo:
    """desc"""

    def test_bar(self):
        """bar desc"""
        assert True
"#;

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_scenario_single_method_row_and_document() {
    let repo = TestRepo::new();
    let parser = CaseParser::new(repo.rules(), "gbk").unwrap();

    let cases = parser
        .parse_source("tests/proj_a/test_foo.py", FOO_SOURCE)
        .unwrap();
    assert_eq!(cases.len(), 1);
    let case = &cases[0];
    assert_eq!(case.project_name, "proj_a");
    assert_eq!(case.project_description.as_deref(), Some("desc"));
    assert_eq!(case.case_name, "test_bar");
    assert_eq!(case.case_description.as_deref(), Some("bar desc"));
    assert_eq!(case.file_path, "tests/proj_a/test_foo.py");
    assert!(case.case_code.starts_with("def test_bar(self):"));
    assert!(case.case_code.ends_with("assert True"));
    assert_eq!(
        case.document_id(),
        md5_hex("tests/proj_a/test_foo.py_test_bar")
    );
}

#[test]
fn test_scenario_on_disk_file_lands_in_both_stores() {
    let repo = TestRepo::new();
    repo.add_file("tests/proj_a/test_foo.py", FOO_SOURCE);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);

    let stats = coordinator.update(&repo.file("tests/proj_a/test_foo.py")).unwrap();
    assert_eq!(stats.cases_added, 1);
    assert!(stats.mirrored);

    let key = repo.key("tests/proj_a/test_foo.py");
    let docs = index.documents_for_file(&key);
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, document_id(&key, "test_bar"));
    assert_eq!(docs[0].project_name, "proj_a");
    assert_stores_agree(&coordinator, &index);
}

#[test]
fn test_syntax_error_yields_no_rows_and_spares_other_files() {
    let repo = TestRepo::new();
    repo.add_file("p/test_login.py", LOGIN_CASES)
        .add_file("p/test_broken.py", BROKEN_SOURCE);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);

    let stats = initial_scan(&mut coordinator, repo.path()).unwrap();
    assert_eq!(stats.files_scanned, 2);
    assert_eq!(stats.cases_indexed, 2);

    assert!(case_names(&coordinator, &repo.key("p/test_broken.py")).is_empty());
    assert_eq!(
        case_names(&coordinator, &repo.key("p/test_login.py")),
        vec!["test_valid_password", "test_wrong_password"]
    );
    assert_stores_agree(&coordinator, &index);
}

#[test]
fn test_file_that_breaks_loses_its_previous_rows() {
    let repo = TestRepo::new();
    repo.add_file("p/test_cart.py", CART_CASES);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);
    coordinator.update(&repo.file("p/test_cart.py")).unwrap();
    assert_eq!(index.len(), 1);

    repo.add_file("p/test_cart.py", BROKEN_SOURCE);
    let stats = coordinator.update(&repo.file("p/test_cart.py")).unwrap();
    assert_eq!(stats.cases_removed, 1);
    assert_eq!(stats.cases_added, 0);
    assert!(index.is_empty());
}

#[test]
fn test_recreate_flag_empties_then_repopulates() {
    let repo = TestRepo::new();
    repo.add_file("p/test_login.py", LOGIN_CASES);
    let db = repo.file("cases.db");
    let index = MemoryIndex::new();

    {
        let parser = CaseParser::new(repo.rules(), "gbk").unwrap();
        let mut coordinator = SyncCoordinator::new(
            CaseStore::open(&db).unwrap(),
            Box::new(index.clone()),
            parser,
            RetryPolicy::none(),
        );
        coordinator.setup(false).unwrap();
        initial_scan(&mut coordinator, repo.path()).unwrap();
        coordinator.close().unwrap();
    }
    assert_eq!(index.len(), 2);

    // Stale file only known to the stores
    repo.remove_file("p/test_login.py")
        .add_file("q/test_cart.py", CART_CASES);

    let parser = CaseParser::new(repo.rules(), "gbk").unwrap();
    let mut coordinator = SyncCoordinator::new(
        CaseStore::open(&db).unwrap(),
        Box::new(index.clone()),
        parser,
        RetryPolicy::none(),
    );
    coordinator.setup(true).unwrap();
    assert_eq!(coordinator.store().count().unwrap(), 0);
    assert!(index.is_empty());

    let stats = initial_scan(&mut coordinator, repo.path()).unwrap();
    assert_eq!(stats.cases_indexed, 1);
    assert_eq!(stats.files_pruned, 0);
    assert_eq!(index.snapshot()[0].case_name, "test_add_item");
    assert_stores_agree(&coordinator, &index);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_every_class_nested_method_appears_once() {
    let repo = TestRepo::new();
    repo.add_file(
        "p/test_many.py",
        r#"def test_module_level():
    pass

class TestA:
    def test_one(self):
        pass

    def test_two(self):
        pass

class TestB:
    class TestInner:
        def test_nested(self):
            pass

    @pytest.mark.slow
    def test_decorated(self):
        pass
"#,
    );
    repo.add_file("p/test_other.py", CART_CASES);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);
    coordinator.update(&repo.file("p/test_other.py")).unwrap();
    let other_before = index.documents_for_file(&repo.key("p/test_other.py"));

    coordinator.update(&repo.file("p/test_many.py")).unwrap();

    assert_eq!(
        case_names(&coordinator, &repo.key("p/test_many.py")),
        vec!["test_decorated", "test_nested", "test_one", "test_two"]
    );
    assert_eq!(
        index.documents_for_file(&repo.key("p/test_many.py")).len(),
        4
    );
    assert_eq!(
        index.documents_for_file(&repo.key("p/test_other.py")),
        other_before
    );
    assert_stores_agree(&coordinator, &index);
}

#[test]
fn test_reprocessing_unchanged_file_is_idempotent() {
    let repo = TestRepo::new();
    repo.add_file("p/test_login.py", LOGIN_CASES);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);
    let path = repo.file("p/test_login.py");

    coordinator.update(&path).unwrap();
    let rows = coordinator.store().all_cases().unwrap();
    let docs = index.snapshot();

    for _ in 0..3 {
        let stats = coordinator.update(&path).unwrap();
        assert_eq!(stats.cases_removed, 2);
        assert_eq!(stats.cases_added, 2);
    }
    assert_eq!(coordinator.store().all_cases().unwrap(), rows);
    assert_eq!(index.snapshot(), docs);
}

#[test]
fn test_delete_is_scoped_to_exact_file_path() {
    let repo = TestRepo::new();
    repo.add_file("p/test_a.py", CART_CASES)
        .add_file("p/test_a.py.orig/test_x.py", CART_CASES)
        .add_file("p/test_ab.py", CART_CASES)
        .add_file("q/test_a.py", CART_CASES);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);
    initial_scan(&mut coordinator, repo.path()).unwrap();
    assert_eq!(index.len(), 4);

    repo.remove_file("p/test_a.py");
    let stats = coordinator.delete(&repo.file("p/test_a.py")).unwrap();
    assert_eq!(stats.cases_removed, 1);

    assert_eq!(coordinator.store().count().unwrap(), 3);
    assert!(index.documents_for_file(&repo.key("p/test_a.py")).is_empty());
    for survivor in ["p/test_a.py.orig/test_x.py", "p/test_ab.py", "q/test_a.py"] {
        assert_eq!(index.documents_for_file(&repo.key(survivor)).len(), 1, "{}", survivor);
    }
    assert_stores_agree(&coordinator, &index);
}

#[test]
fn test_move_leaves_nothing_under_old_path() {
    let repo = TestRepo::new();
    repo.add_file("p/test_login.py", LOGIN_CASES);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);
    coordinator.update(&repo.file("p/test_login.py")).unwrap();

    repo.rename("p/test_login.py", "r/test_signin.py");
    let stats = coordinator
        .relocate(&repo.file("p/test_login.py"), &repo.file("r/test_signin.py"))
        .unwrap();
    assert_eq!(stats.cases_removed, 2);
    assert_eq!(stats.cases_added, 2);

    let old = repo.key("p/test_login.py");
    let new = repo.key("r/test_signin.py");
    assert!(coordinator.store().cases_for_file(&old).unwrap().is_empty());
    assert!(index.documents_for_file(&old).is_empty());

    let moved = coordinator.store().cases_for_file(&new).unwrap();
    assert_eq!(moved.len(), 2);
    assert!(moved.iter().all(|c| c.project_name == "r"));
    assert_eq!(index.documents_for_file(&new).len(), 2);
    assert_stores_agree(&coordinator, &index);
}

#[test]
fn test_move_into_test_name_indexes_destination() {
    let repo = TestRepo::new();
    repo.add_file("p/draft.py", CART_CASES);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);

    repo.rename("p/draft.py", "p/test_cart.py");
    coordinator
        .relocate(&repo.file("p/draft.py"), &repo.file("p/test_cart.py"))
        .unwrap();
    assert_eq!(
        case_names(&coordinator, &repo.key("p/test_cart.py")),
        vec!["test_add_item"]
    );
    assert_stores_agree(&coordinator, &index);
}

#[test]
fn test_structural_change_equals_fresh_scan() {
    let repo = TestRepo::new();
    repo.add_file("alpha/test_login.py", LOGIN_CASES)
        .add_file("alpha/test_cart.py", CART_CASES)
        .add_file("beta/test_cart.py", CART_CASES);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);
    initial_scan(&mut coordinator, repo.path()).unwrap();

    // Structural changes the per-file events cannot describe
    repo.rename("alpha", "gamma")
        .remove_dir("beta")
        .add_file("delta/sub/test_login.py", LOGIN_CASES);
    coordinator.rescan(repo.path()).unwrap();

    let fresh_index = MemoryIndex::new();
    let mut fresh = repo.coordinator(&fresh_index);
    initial_scan(&mut fresh, repo.path()).unwrap();

    assert_eq!(
        coordinator.store().all_cases().unwrap(),
        fresh.store().all_cases().unwrap()
    );
    assert_eq!(index.snapshot(), fresh_index.snapshot());
    assert_stores_agree(&coordinator, &index);
    assert!(index
        .snapshot()
        .iter()
        .all(|d| !d.file_path.contains("/alpha/") && !d.file_path.contains("/beta/")));
}

#[test]
fn test_initial_scan_prunes_files_deleted_while_offline() {
    let repo = TestRepo::new();
    repo.add_file("p/test_login.py", LOGIN_CASES)
        .add_file("p/test_cart.py", CART_CASES);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);
    initial_scan(&mut coordinator, repo.path()).unwrap();

    repo.remove_file("p/test_login.py");
    let stats = initial_scan(&mut coordinator, repo.path()).unwrap();
    assert_eq!(stats.files_pruned, 1);
    assert_eq!(coordinator.store().count().unwrap(), 1);
    assert_stores_agree(&coordinator, &index);
}

#[test]
fn test_outage_during_scan_is_repaired_by_reconcile() {
    let repo = TestRepo::new();
    repo.add_file("p/test_login.py", LOGIN_CASES)
        .add_file("p/test_cart.py", CART_CASES);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);

    // The first mirror fails; the rest of the scan is committed unmirrored
    index.fail_next(1);
    let stats = initial_scan(&mut coordinator, repo.path()).unwrap();
    assert_eq!(stats.cases_indexed, 3);
    assert_eq!(stats.mirror_deferred, 2);
    assert_eq!(coordinator.store().pending_paths().unwrap().len(), 2);

    let replay = coordinator.reconcile().unwrap();
    assert_eq!(replay.replayed, 2);
    assert!(coordinator.store().pending_paths().unwrap().is_empty());
    assert_stores_agree(&coordinator, &index);
}

#[test]
fn test_gbk_encoded_file_is_indexed() {
    let repo = TestRepo::new();
    let mut bytes = b"class TestZh:\n    def test_zh(self):\n        \"\"\"".to_vec();
    // "中文" in GBK
    bytes.extend_from_slice(&[0xD6, 0xD0, 0xCE, 0xC4]);
    bytes.extend_from_slice(b"\"\"\"\n        pass\n");
    repo.add_bytes("p/test_zh.py", &bytes);
    let index = MemoryIndex::new();
    let mut coordinator = repo.coordinator(&index);

    coordinator.update(&repo.file("p/test_zh.py")).unwrap();
    let rows = coordinator
        .store()
        .cases_for_file(&repo.key("p/test_zh.py"))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].case_description.as_deref(), Some("中文"));
}

//! Custom assertions for integration tests

use case_indexer::{CaseDocument, MemoryIndex, SyncCoordinator, TestCase};
use serde_json::Value;

/// Assert that output is valid JSON and return parsed value
pub fn assert_valid_json(output: &str, context: &str) -> Value {
    serde_json::from_str(output).unwrap_or_else(|e| {
        panic!(
            "Expected valid JSON ({}): {}\nOutput:\n{}",
            context, e, output
        )
    })
}

/// Documents the index should hold for the store's current rows, by id
pub fn expected_documents(coordinator: &SyncCoordinator) -> Vec<CaseDocument> {
    let mut docs: Vec<CaseDocument> = coordinator
        .store()
        .all_cases()
        .expect("all_cases")
        .iter()
        .map(TestCase::to_document)
        .collect();
    docs.sort_by(|a, b| a.id.cmp(&b.id));
    docs
}

/// Assert the index mirrors the store exactly
pub fn assert_stores_agree(coordinator: &SyncCoordinator, index: &MemoryIndex) {
    let expected = expected_documents(coordinator);
    let actual = index.snapshot();
    assert_eq!(
        actual.len(),
        expected.len(),
        "index holds {} documents, store {} rows",
        actual.len(),
        expected.len()
    );
    assert_eq!(actual, expected, "index documents differ from store rows");
}

/// Sorted case names stored for one file
pub fn case_names(coordinator: &SyncCoordinator, file_path: &str) -> Vec<String> {
    let mut names: Vec<String> = coordinator
        .store()
        .cases_for_file(file_path)
        .expect("cases_for_file")
        .into_iter()
        .map(|c| c.case_name)
        .collect();
    names.sort();
    names
}

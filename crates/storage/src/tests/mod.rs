//! Test utilities and module declarations for store tests.

mod observation_tests;
mod token_row_tests;

use tempfile::TempDir;
use toolscribe_core::ObservationDraft;

use crate::Store;

pub fn create_test_store() -> (Store, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let store = Store::new(&db_path).unwrap();
    (store, temp_dir)
}

pub fn sample_draft(title: &str) -> ObservationDraft {
    ObservationDraft {
        observation_type: "discovery".to_owned(),
        title: title.to_owned(),
        subtitle: Some("context".to_owned()),
        narrative: Some("what happened and why".to_owned()),
        text: Some("short body".to_owned()),
        facts: vec!["fact one".to_owned(), "fact two".to_owned()],
        concepts: vec!["how-it-works".to_owned()],
        files_read: vec!["src/lib.rs".to_owned()],
        files_modified: vec![],
    }
}

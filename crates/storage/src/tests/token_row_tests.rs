use toolscribe_core::ObservationDraft;

use super::{create_test_store, sample_draft};

#[test]
fn stat_rows_compute_the_read_heuristic() {
    let (store, _temp_dir) = create_test_store();

    // title "ok", everything else empty: 2 chars -> ceil(2/4) = 1
    let draft = ObservationDraft { title: "ok".to_owned(), ..ObservationDraft::default() };
    store.insert_observation("s", "p", &draft, None, 40).unwrap();

    let rows = store.token_stat_rows(None, None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].read_tokens, 1);
    assert_eq!(rows[0].discovery_tokens, 40);
}

#[test]
fn stat_rows_honor_project_and_since_filters() {
    let (store, _temp_dir) = create_test_store();

    store.insert_observation("s", "alpha", &sample_draft("a"), None, 10).unwrap();
    store.insert_observation("s", "beta", &sample_draft("b"), None, 20).unwrap();

    let alpha_only = store.token_stat_rows(Some("alpha"), None).unwrap();
    assert_eq!(alpha_only.len(), 1);
    assert_eq!(alpha_only[0].discovery_tokens, 10);

    let future = store.token_stat_rows(None, Some(i64::MAX)).unwrap();
    assert!(future.is_empty());
}

#[test]
fn recent_costs_are_newest_first_and_bounded() {
    let (store, _temp_dir) = create_test_store();

    for tokens in [10u64, 20, 30] {
        let draft = ObservationDraft { title: "x".to_owned(), ..ObservationDraft::default() };
        store.insert_observation("s", "p", &draft, None, tokens).unwrap();
    }

    let costs = store.recent_observation_costs(Some("p"), 2).unwrap();
    assert_eq!(costs.len(), 2);
    assert_eq!(costs[0].discovery_tokens, 30);
    assert_eq!(costs[1].discovery_tokens, 20);
}

#[test]
fn distinct_project_count_spans_observations() {
    let (store, _temp_dir) = create_test_store();

    store.insert_observation("s", "alpha", &sample_draft("a"), None, 1).unwrap();
    store.insert_observation("s", "alpha", &sample_draft("b"), None, 1).unwrap();
    store.insert_observation("s", "beta", &sample_draft("c"), None, 1).unwrap();

    assert_eq!(store.distinct_project_count().unwrap(), 2);
}

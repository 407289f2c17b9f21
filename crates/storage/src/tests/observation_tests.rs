use super::{create_test_store, sample_draft};

#[test]
fn insert_returns_store_assigned_fields() {
    let (store, _temp_dir) = create_test_store();

    let obs = store
        .insert_observation("sess-1", "proj", &sample_draft("First"), Some(1), 120)
        .unwrap();
    assert!(obs.id > 0);
    assert!(obs.created_at_epoch > 0);
    assert_eq!(obs.discovery_tokens, 120);
    assert_eq!(obs.title, "First");
}

#[test]
fn ids_follow_insertion_order_per_session() {
    let (store, _temp_dir) = create_test_store();

    let a = store.insert_observation("s", "p", &sample_draft("a"), None, 1).unwrap();
    let b = store.insert_observation("s", "p", &sample_draft("b"), None, 1).unwrap();
    let c = store.insert_observation("s", "p", &sample_draft("c"), None, 1).unwrap();
    assert!(a.id < b.id && b.id < c.id);

    let in_session = store.session_observations("s").unwrap();
    let titles: Vec<_> = in_session.iter().map(|o| o.title.clone()).collect();
    assert_eq!(titles, vec!["a", "b", "c"]);
}

#[test]
fn page_is_newest_first_with_cursor() {
    let (store, _temp_dir) = create_test_store();

    for i in 0..5 {
        store.insert_observation("s", "p", &sample_draft(&format!("obs{i}")), None, 1).unwrap();
    }

    let page = store.observations_page(None, None, 2).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].title, "obs4");
    assert_eq!(page[1].title, "obs3");

    let next = store.observations_page(None, Some(page[1].id), 10).unwrap();
    assert_eq!(next.len(), 3);
    assert_eq!(next[0].title, "obs2");
}

#[test]
fn page_filters_by_project() {
    let (store, _temp_dir) = create_test_store();

    store.insert_observation("s", "alpha", &sample_draft("a"), None, 1).unwrap();
    store.insert_observation("s", "beta", &sample_draft("b"), None, 1).unwrap();

    let page = store.observations_page(Some("alpha"), None, 10).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].project, "alpha");
}

#[test]
fn list_fields_round_trip_as_json() {
    let (store, _temp_dir) = create_test_store();

    let draft = sample_draft("lists");
    store.insert_observation("s", "p", &draft, None, 1).unwrap();

    let stored = &store.session_observations("s").unwrap()[0];
    assert_eq!(stored.facts, draft.facts);
    assert_eq!(stored.concepts, draft.concepts);
    assert_eq!(stored.files_read, draft.files_read);
    assert!(stored.files_modified.is_empty());
}

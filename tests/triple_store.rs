use knowledge_repo::triple::TripleStore;

fn store() -> TripleStore {
    let mut store = TripleStore::new();
    store.insert("a", "imports", "b");
    store.insert("b", "imports", "c");
    store.insert("c", "imports", "d");
    store.insert("a", "label", "Alpha");
    store.insert("b", "label", "Alpha");
    store
}

#[test]
fn duplicate_triples_are_stored_once() {
    let mut store = store();
    assert_eq!(store.len(), 5);
    assert!(!store.insert("a", "imports", "b"));
    assert!(store.insert("a", "imports", "c"));
    assert_eq!(store.len(), 6);
}

#[test]
fn terms_round_trip_through_interning() {
    let mut store = TripleStore::new();
    let term = store.intern("urn:series:1");
    assert_eq!(store.intern("urn:series:1"), term);
    assert_eq!(store.term("urn:series:1"), Some(term));
    assert_eq!(store.resolve(term), Some("urn:series:1"));
    assert_eq!(store.term("never seen"), None);
}

#[test]
fn patterns_bind_any_position() {
    let store = store();
    let mut subjects = store.subjects("label", "Alpha");
    subjects.sort();
    assert_eq!(subjects, vec!["a", "b"]);
    assert_eq!(store.objects("a", "imports"), vec!["b"]);
    assert_eq!(store.matching(Some("a"), None, None).len(), 2);
    assert_eq!(store.matching(None, None, Some("Alpha")).len(), 2);
    assert_eq!(store.matching(None, Some("imports"), None).len(), 3);
    assert_eq!(store.matching(None, None, None).len(), 5);
    assert!(store.matching(Some("zzz"), None, None).is_empty());
    assert!(store.contains("b", "imports", "c"));
    assert!(!store.contains("c", "imports", "b"));
}

#[test]
fn removal_keeps_indexes_consistent() {
    let mut store = store();
    assert_eq!(store.remove_matching(None, Some("label"), None), 2);
    assert_eq!(store.len(), 3);
    assert!(store.subjects("label", "Alpha").is_empty());
    assert!(store.matching(None, None, Some("Alpha")).is_empty());
    assert_eq!(store.remove_matching(Some("a"), Some("label"), None), 0);
    store.insert("a", "label", "Again");
    assert_eq!(store.objects("a", "label"), vec!["Again"]);
}

#[test]
fn reachability_respects_depth_and_predicates() {
    let store = store();
    let predicates = vec!["imports".to_string()];
    let mut all = store.reachable("a", &predicates, None);
    all.sort();
    assert_eq!(all, vec!["a", "b", "c", "d"]);
    assert_eq!(store.reachable("a", &predicates, Some(1)).len(), 2);
    assert_eq!(store.reachable("a", &["label".to_string()], None).len(), 2);
    assert_eq!(store.reachable("unknown", &predicates, None), vec!["unknown"]);
}

#[test]
fn clearing_empties_the_store() {
    let mut store = store();
    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.term("a"), None);
}

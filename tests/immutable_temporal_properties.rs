//! Property coverage for `ImmutableStore`'s as-of-timestamp reads and
//! version-pruning, and `MutableStore`'s atomic update linearization.
use agent_memory_core::{ImmutableStore, MutableStore};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #[test]
    fn get_at_timestamp_always_resolves_to_some_version_at_or_before_the_latest_write(
        revisions in prop::collection::vec(0i64..1000, 1..6),
    ) {
        let store = ImmutableStore::new();
        let mut last_updated_at = 0i64;
        for (i, rev) in revisions.iter().enumerate() {
            let entry = store.store("doc", "a", json!({"rev": rev}), None, None);
            last_updated_at = entry.updated_at;
            prop_assert_eq!(entry.version, (i + 1) as u64);
        }

        let snapshot = store.get_at_timestamp("doc", "a", last_updated_at);
        prop_assert_eq!(snapshot, Some(json!({"rev": revisions.last().unwrap()})));

        let before_anything = store.get_at_timestamp("doc", "a", -1);
        prop_assert_eq!(before_anything, None);
    }

    #[test]
    fn purge_versions_never_drops_more_than_requested(
        write_count in 1usize..10,
        keep in 0usize..10,
    ) {
        let store = ImmutableStore::new();
        for i in 0..write_count {
            store.store("doc", "a", json!({"rev": i}), None, None);
        }
        store.purge_versions("doc", "a", keep).unwrap();
        let entry = store.get("doc", "a").unwrap();
        prop_assert!(entry.previous_versions.len() <= keep);
        prop_assert_eq!(entry.version, write_count as u64, "current version is never touched by pruning");
    }
}

#[test]
fn mutable_update_is_atomic_under_sequential_read_modify_write() {
    let store = MutableStore::new();
    store.set("ns", "counter", json!(0), None);

    for _ in 0..50 {
        store
            .update("ns", "counter", |current| {
                let n = current.and_then(|v| v.as_i64()).unwrap_or(0);
                Some(json!(n + 1))
            })
            .unwrap();
    }

    assert_eq!(store.get("ns", "counter").unwrap(), json!(50));
}

#[test]
fn mutable_update_with_none_result_never_creates_a_missing_key() {
    let store = MutableStore::new();
    let result = store.update("ns", "ghost", |_| None).unwrap();
    assert!(result.is_none());
    assert!(!store.exists("ns", "ghost"));
}

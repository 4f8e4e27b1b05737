//! Recompute Ordering Tests
//!
//! Drives `RecomputeCoordinator` and `DataCache` together without the event
//! loop: every arrival order of overlapping responses must leave the cache
//! holding the answer for the latest inputs.

use std::collections::BTreeMap;

use farmscope::cache::{DataCache, DatasetKey, DatasetStatus};
use farmscope::recompute::{RecomputeCoordinator, RecomputePhase, RecomputeRequest, ResponseOutcome};
use farmscope::selection::SelectionStore;
use farmscope::types::{AnomalySnapshot, EntityId, ScoreSample, TimeWindow};

fn tagged(tag: f64) -> AnomalySnapshot {
    AnomalySnapshot {
        zscores: BTreeMap::from([(
            EntityId::new("n1"),
            vec![ScoreSample {
                bucket: 0,
                value: Some(tag),
            }],
        )]),
        baselines: BTreeMap::new(),
    }
}

fn tag_of(cache: &DataCache) -> Option<f64> {
    cache
        .anomaly()
        .data()
        .and_then(|s| s.zscores_for(&EntityId::new("n1")).first())
        .and_then(|s| s.value)
}

/// Store with a window and the default-ish dimension set, nothing selected.
fn store() -> SelectionStore {
    let mut store = SelectionStore::new();
    store.set_window(TimeWindow::new(0, 1_000).unwrap());
    store.toggle_dimension("bytes_out");
    store
}

/// Issue three requests by growing the selection one entity at a time.
fn three_requests(
    store: &mut SelectionStore,
    coordinator: &mut RecomputeCoordinator,
    cache: &mut DataCache,
) -> Vec<RecomputeRequest> {
    ["n1", "n2", "n3"]
        .into_iter()
        .map(|id| {
            store.toggle_entity(EntityId::new(id));
            coordinator.observe(store.state(), cache).unwrap()
        })
        .collect()
}

const ORDERS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

#[test]
fn every_arrival_order_commits_only_the_latest() {
    for order in ORDERS {
        let mut store = store();
        let mut coordinator = RecomputeCoordinator::new();
        let mut cache = DataCache::new();
        let requests = three_requests(&mut store, &mut coordinator, &mut cache);

        let mut committed = 0;
        for &i in &order {
            let outcome = coordinator.resolve(
                requests[i].token,
                Ok::<_, String>(tagged(i as f64)),
                &mut cache,
            );
            match outcome {
                ResponseOutcome::Committed { .. } => {
                    assert_eq!(i, 2, "order {order:?}");
                    committed += 1;
                }
                ResponseOutcome::Stale => assert_ne!(i, 2, "order {order:?}"),
                ResponseOutcome::Failed { .. } => panic!("no failure was sent"),
            }
        }
        assert_eq!(committed, 1);
        assert_eq!(tag_of(&cache), Some(2.0), "order {order:?}");
        assert_eq!(coordinator.phase(), RecomputePhase::Idle);
        assert_eq!(cache.status(DatasetKey::Anomaly), &DatasetStatus::Ready);
    }
}

#[test]
fn stale_response_after_newer_commit_is_ignored() {
    let mut store = store();
    let mut coordinator = RecomputeCoordinator::new();
    let mut cache = DataCache::new();

    store.toggle_entity(EntityId::new("n1"));
    let first = coordinator.observe(store.state(), &mut cache).unwrap();
    let outcome = coordinator.resolve(first.token, Ok::<_, String>(tagged(1.0)), &mut cache);
    assert!(matches!(outcome, ResponseOutcome::Committed { .. }));

    store.toggle_entity(EntityId::new("n2"));
    let second = coordinator.observe(store.state(), &mut cache).unwrap();
    assert!(second.token.seq > first.token.seq);
    // Replaying the first answer while the second is in flight.
    assert_eq!(
        coordinator.resolve(first.token, Ok::<_, String>(tagged(9.0)), &mut cache),
        ResponseOutcome::Stale
    );
    assert_eq!(tag_of(&cache), Some(1.0));
    assert!(coordinator.is_requesting());
}

#[test]
fn stale_failure_does_not_touch_the_cache() {
    let mut store = store();
    let mut coordinator = RecomputeCoordinator::new();
    let mut cache = DataCache::new();
    let requests = three_requests(&mut store, &mut coordinator, &mut cache);

    assert_eq!(
        coordinator.resolve(requests[0].token, Err("timeout"), &mut cache),
        ResponseOutcome::Stale
    );
    assert!(coordinator.last_error().is_none());
    assert_eq!(cache.status(DatasetKey::Anomaly), &DatasetStatus::Pending);
}

#[test]
fn invalid_inputs_supersede_in_flight_request() {
    let mut store = store();
    let mut coordinator = RecomputeCoordinator::new();
    let mut cache = DataCache::new();

    store.toggle_entity(EntityId::new("n1"));
    let request = coordinator.observe(store.state(), &mut cache).unwrap();

    // Deselecting the only entity makes the inputs invalid.
    store.toggle_entity(EntityId::new("n1"));
    assert!(coordinator.observe(store.state(), &mut cache).is_none());
    assert_eq!(coordinator.phase(), RecomputePhase::Idle);
    assert_eq!(cache.status(DatasetKey::Anomaly), &DatasetStatus::Absent);

    assert_eq!(
        coordinator.resolve(request.token, Ok::<_, String>(tagged(5.0)), &mut cache),
        ResponseOutcome::Stale
    );
    assert!(cache.anomaly().data().is_none());
}

#[test]
fn unchanged_inputs_issue_nothing_until_forced() {
    let mut store = store();
    let mut coordinator = RecomputeCoordinator::new();
    let mut cache = DataCache::new();

    store.toggle_entity(EntityId::new("n1"));
    let first = coordinator.observe(store.state(), &mut cache).unwrap();
    // A hover transition leaves the inputs untouched.
    store.set_hovered(Some(EntityId::new("n1")));
    assert!(coordinator.observe(store.state(), &mut cache).is_none());

    let forced = coordinator.force(store.state(), &mut cache).unwrap();
    assert_eq!(forced.key.nonce, first.key.nonce + 1);
    assert_eq!(forced.key.entities, first.key.entities);
    assert_ne!(forced.token.fingerprint, first.token.fingerprint);
    assert_eq!(coordinator.nonce(), 1);
}

#[test]
fn latest_failure_keeps_previous_snapshot_and_records_error() {
    let mut store = store();
    let mut coordinator = RecomputeCoordinator::new();
    let mut cache = DataCache::new();

    store.toggle_entity(EntityId::new("n1"));
    let ok = coordinator.observe(store.state(), &mut cache).unwrap();
    coordinator.resolve(ok.token, Ok::<_, String>(tagged(3.0)), &mut cache);

    let failing = coordinator.force(store.state(), &mut cache).unwrap();
    let outcome = coordinator.resolve(failing.token, Err("503"), &mut cache);
    assert_eq!(
        outcome,
        ResponseOutcome::Failed {
            message: "503".to_string()
        }
    );
    assert_eq!(coordinator.last_error(), Some("503"));
    assert_eq!(tag_of(&cache), Some(3.0));
    assert!(matches!(
        cache.status(DatasetKey::Anomaly),
        DatasetStatus::Failed { .. }
    ));

    // A later success clears the recorded error.
    store.toggle_entity(EntityId::new("n2"));
    let next = coordinator.observe(store.state(), &mut cache).unwrap();
    coordinator.resolve(next.token, Ok::<_, String>(tagged(4.0)), &mut cache);
    assert!(coordinator.last_error().is_none());
    assert_eq!(tag_of(&cache), Some(4.0));
}

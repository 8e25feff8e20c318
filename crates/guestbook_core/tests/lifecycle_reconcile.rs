mod common;

use common::{created_at_desc, manager, seeded, settle_tasks};
use guestbook_core::{
    EntryState, InMemoryRemoteLog, ReconcileError, ReconcileOutcome, RemoteError, RemoteId,
    SubmitOutcome,
};
use std::sync::Arc;

#[tokio::test]
async fn reconcile_orders_store_records_newest_first() {
    let remote = Arc::new(InMemoryRemoteLog::new());
    remote.seed(seeded("a", "Ann", "pw1", 300));
    remote.seed(seeded("b", "Bo", "pw2", 100));
    remote.seed(seeded("c", "Cy", "pw3", 200));
    let manager = manager(&remote);

    manager.reconcile().await.unwrap();

    let snapshot = manager.snapshot();
    let stamps: Vec<i64> = snapshot.iter().map(|entry| entry.created_at).collect();
    assert_eq!(stamps, vec![300, 200, 100]);
    assert!(created_at_desc(&snapshot));
    assert!(snapshot
        .iter()
        .all(|entry| entry.state == EntryState::Confirmed));
}

#[tokio::test]
async fn repeated_reconcile_is_stable() {
    let remote = Arc::new(InMemoryRemoteLog::new());
    remote.seed(seeded("a", "Ann", "pw1", 100));
    remote.seed(seeded("b", "Bo", "pw2", 200));
    let manager = manager(&remote);

    manager.reconcile().await.unwrap();
    let first = manager.snapshot();
    let outcome = manager.reconcile().await.unwrap();

    assert_eq!(manager.snapshot(), first);
    match outcome {
        ReconcileOutcome::Applied(summary) => {
            assert_eq!(summary.seq, 2);
            assert_eq!(summary.confirmed, 2);
            assert_eq!(summary.removed, 0);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn lagging_list_keeps_entry_pending_until_it_propagates() {
    let remote = Arc::new(InMemoryRemoteLog::new().with_list_lag(1));
    let manager = manager(&remote);

    let submission = manager.submit("Ann", "Hi", "pw1").unwrap();
    let local_id = submission.local_id();
    let outcome = submission.settled().await;

    assert_eq!(
        outcome,
        SubmitOutcome::AwaitingPropagation {
            remote_id: RemoteId::new("r1")
        }
    );
    assert_eq!(manager.get(local_id).unwrap().state, EntryState::Pending);

    manager.reconcile().await.unwrap();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].local_id, local_id);
    assert_eq!(snapshot[0].state, EntryState::Confirmed);
    assert_eq!(snapshot[0].remote_id, Some(RemoteId::new("r1")));
}

#[tokio::test]
async fn entry_deleted_elsewhere_disappears_on_reconcile() {
    let remote = Arc::new(InMemoryRemoteLog::new());
    remote.seed(seeded("a", "Ann", "pw1", 100));
    remote.seed(seeded("b", "Bo", "pw2", 200));
    let manager = manager(&remote);
    manager.reconcile().await.unwrap();

    assert!(remote.remove_external(&RemoteId::new("a")));
    let outcome = manager.reconcile().await.unwrap();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].author, "Bo");
    assert!(matches!(
        outcome,
        ReconcileOutcome::Applied(summary) if summary.removed == 1
    ));
}

#[tokio::test]
async fn failed_list_leaves_local_view_untouched() {
    let remote = Arc::new(InMemoryRemoteLog::new());
    remote.seed(seeded("a", "Ann", "pw1", 100));
    let manager = manager(&remote);
    manager.reconcile().await.unwrap();
    let before = manager.snapshot();

    remote.fail_next_list(RemoteError::StoreUnavailable("offline".to_string()));
    let err = manager.reconcile().await.unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Remote(RemoteError::StoreUnavailable(_))
    ));
    assert_eq!(manager.snapshot(), before);
}

#[tokio::test]
async fn older_reply_arriving_late_is_dropped() {
    let remote = Arc::new(InMemoryRemoteLog::new());
    remote.seed(seeded("a", "Ann", "pw1", 100));
    let manager = manager(&remote);

    let gate = remote.pause_lists();
    let older = tokio::spawn({
        let manager = manager.clone();
        async move { manager.reconcile().await }
    });
    settle_tasks().await;
    assert_eq!(remote.list_calls(), 1);

    remote.seed(seeded("b", "Bo", "pw2", 200));
    remote.resume_all();
    let newer = manager.reconcile().await.unwrap();
    assert!(matches!(newer, ReconcileOutcome::Applied(summary) if summary.seq == 2));
    assert_eq!(manager.snapshot().len(), 2);

    gate.release(1);
    let late = older.await.unwrap().unwrap();

    assert_eq!(late, ReconcileOutcome::Stale { seq: 1, applied: 2 });
    let authors: Vec<String> = manager
        .snapshot()
        .into_iter()
        .map(|entry| entry.author)
        .collect();
    assert_eq!(authors, vec!["Bo", "Ann"]);
}

#[tokio::test]
async fn in_flight_list_does_not_resurrect_retracted_entry() {
    let remote = Arc::new(InMemoryRemoteLog::new());
    remote.seed(seeded("a", "Ann", "pw1", 100));
    let manager = manager(&remote);
    manager.reconcile().await.unwrap();
    let local_id = manager.snapshot()[0].local_id;

    // This list captures "a" before the delete lands.
    let gate = remote.pause_lists();
    let in_flight = tokio::spawn({
        let manager = manager.clone();
        async move { manager.reconcile().await }
    });
    settle_tasks().await;
    remote.resume_all();

    manager.retract(local_id, "pw1").await.unwrap();
    assert!(manager.snapshot().is_empty());

    gate.release(1);
    let outcome = in_flight.await.unwrap().unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Applied(summary) if summary.seq == 2));
    assert!(manager.snapshot().is_empty());

    manager.reconcile().await.unwrap();
    assert!(manager.snapshot().is_empty());
}

#[tokio::test]
async fn unconfirmed_entries_survive_reconcile_alongside_listed_ones() {
    let remote = Arc::new(InMemoryRemoteLog::new());
    remote.seed(seeded("a", "Ann", "pw1", 100));
    let manager = manager(&remote);
    remote.fail_next_insert(RemoteError::StoreUnavailable("offline".to_string()));

    let submission = manager.submit("Bo", "Yo", "pw2").unwrap();
    let local_id = submission.local_id();
    submission.settled().await;
    manager.reconcile().await.unwrap();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert!(created_at_desc(&snapshot));
    let errored = snapshot
        .iter()
        .find(|entry| entry.local_id == local_id)
        .unwrap();
    assert_eq!(errored.state, EntryState::Errored);
}

#[tokio::test]
async fn record_listed_before_insert_reply_confirms_pending_entry_in_place() {
    let remote = Arc::new(InMemoryRemoteLog::new());
    let replies = remote.pause_insert_replies();
    let manager = manager(&remote);

    let submission = manager.submit("Ann", "Hi", "pw1").unwrap();
    let local_id = submission.local_id();
    settle_tasks().await;
    assert_eq!(remote.records().len(), 1);

    manager.reconcile().await.unwrap();

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].local_id, local_id);
    assert_eq!(snapshot[0].state, EntryState::Confirmed);
    assert_eq!(snapshot[0].remote_id, Some(RemoteId::new("r1")));
    assert_eq!(snapshot[0].created_at, 100);

    replies.release(1);
    let outcome = submission.settled().await;

    assert_eq!(
        outcome,
        SubmitOutcome::Confirmed {
            remote_id: RemoteId::new("r1")
        }
    );
    assert_eq!(manager.snapshot(), snapshot);
}

#[tokio::test]
async fn identical_posts_listed_early_each_keep_their_own_entry() {
    let remote = Arc::new(InMemoryRemoteLog::new());
    let replies = remote.pause_insert_replies();
    let manager = manager(&remote);

    let first = manager.submit("Ann", "Hi", "pw1").unwrap();
    let second = manager.submit("Ann", "Hi", "pw1").unwrap();
    let (first_id, second_id) = (first.local_id(), second.local_id());
    settle_tasks().await;
    assert_eq!(remote.records().len(), 2);

    manager.reconcile().await.unwrap();
    let snapshot = manager.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot
        .iter()
        .all(|entry| entry.state == EntryState::Confirmed));
    let mut local_ids: Vec<_> = snapshot.iter().map(|entry| entry.local_id).collect();
    local_ids.sort();
    let mut submitted = vec![first_id, second_id];
    submitted.sort();
    assert_eq!(local_ids, submitted);

    replies.release(2);
    first.settled().await;
    second.settled().await;
    assert_eq!(manager.snapshot().len(), 2);
}

#[tokio::test]
async fn repeated_reconcile_is_stable_with_unconfirmed_entries() {
    let remote = Arc::new(InMemoryRemoteLog::new());
    remote.seed(seeded("a", "Ann", "pw1", 100));
    let manager = manager(&remote);

    remote.fail_next_insert(RemoteError::StoreUnavailable("offline".to_string()));
    manager.submit("Bo", "Yo", "pw2").unwrap().settled().await;
    let _inserts = remote.pause_inserts();
    manager.submit("Cy", "Hey", "pw3").unwrap();
    settle_tasks().await;

    manager.reconcile().await.unwrap();
    let first = manager.snapshot();
    manager.reconcile().await.unwrap();

    assert_eq!(manager.snapshot(), first);
    let mut states: Vec<EntryState> = first.iter().map(|entry| entry.state).collect();
    states.sort_by_key(|state| state.as_str());
    assert_eq!(
        states,
        vec![EntryState::Confirmed, EntryState::Errored, EntryState::Pending]
    );
    assert!(created_at_desc(&first));
}

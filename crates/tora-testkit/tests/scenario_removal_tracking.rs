use chrono::{TimeZone, Utc};

use tora_reconcile::{ReconcileEngine, RemovalEvent, StoreError, SyncError};
use tora_testkit::{
    fast_settings, linked_pair, seed, MemoryBlossom, MemoryQueue, QueueOp, RemoteCall, RemoteOp,
};

fn removal(moderator: &str, permalink: &str) -> RemovalEvent {
    RemovalEvent {
        moderator: moderator.to_string(),
        target_permalink: permalink.to_string(),
        created_utc: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
    }
}

fn setup() -> (MemoryBlossom, MemoryQueue, ReconcileEngine<MemoryBlossom, MemoryQueue>) {
    let blossom = MemoryBlossom::new();
    let queue = MemoryQueue::new();
    let engine = ReconcileEngine::new(blossom.clone(), queue.clone(), fast_settings());
    (blossom, queue, engine)
}

#[tokio::test]
async fn removal_is_mirrored_once() {
    let (blossom, queue, engine) = setup();
    let pair = linked_pair(1);
    seed(&blossom, &queue, &pair);
    queue.log_removal(removal("some_mod", &pair.0.permalink));

    let first = engine.track_removals().await.unwrap();
    assert_eq!(first.writes_ok, 1);
    assert_eq!(blossom.writes(), vec![RemoteCall::MarkRemoved(pair.1.id)]);

    blossom.clear_calls();
    let second = engine.track_removals().await.unwrap();
    assert_eq!(second.writes_ok, 0);
    assert_eq!(second.skipped, 1);
    assert!(blossom.writes().is_empty(), "second run must not write");
}

#[tokio::test]
async fn own_removals_are_ignored_case_insensitively() {
    let (blossom, queue, engine) = setup();
    let a = linked_pair(1);
    let b = linked_pair(2);
    seed(&blossom, &queue, &a);
    seed(&blossom, &queue, &b);
    queue.log_removal(removal("TOR_Archivist", &a.0.permalink));
    queue.log_removal(removal("Blossom", &b.0.permalink));

    let summary = engine.track_removals().await.unwrap();
    assert_eq!(summary.skipped, 2);
    assert!(blossom.calls().is_empty(), "no lookup for our own actions");
}

#[tokio::test]
async fn unknown_submission_is_skipped() {
    let (blossom, queue, engine) = setup();
    queue.log_removal(removal("some_mod", "/r/TranscribersOfReddit/comments/zz/gone/"));

    let summary = engine.track_removals().await.unwrap();
    assert_eq!(summary.not_found, 1);
    assert!(blossom.writes().is_empty());
}

#[tokio::test]
async fn one_failed_write_does_not_stop_the_pass() {
    let (blossom, queue, engine) = setup();
    let a = linked_pair(1);
    let b = linked_pair(2);
    seed(&blossom, &queue, &a);
    seed(&blossom, &queue, &b);
    queue.log_removal(removal("mod_a", &a.0.permalink));
    queue.log_removal(removal("mod_b", &b.0.permalink));
    blossom.fail_n(
        RemoteOp::MarkRemoved,
        Some(&a.1.id.to_string()),
        StoreError::Unavailable { status: 502 },
        1,
    );

    let summary = engine.track_removals().await.unwrap();
    assert_eq!(summary.writes_failed, 1);
    assert_eq!(summary.writes_ok, 1);
    assert!(blossom.submission(b.1.id).unwrap().removed_from_queue);
    assert!(!blossom.submission(a.1.id).unwrap().removed_from_queue);
}

#[tokio::test]
async fn failed_lookup_is_not_treated_as_missing() {
    let (blossom, queue, engine) = setup();
    let a = linked_pair(1);
    seed(&blossom, &queue, &a);
    queue.log_removal(removal("mod_a", &a.0.permalink));
    blossom.fail_once(RemoteOp::FindByUrl, StoreError::Transport("reset".into()));

    let summary = engine.track_removals().await.unwrap();
    assert_eq!(summary.lookup_failed, 1);
    assert_eq!(summary.not_found, 0);
}

#[tokio::test]
async fn log_failure_surfaces_as_enumeration_error() {
    let (_blossom, queue, engine) = setup();
    queue.fail_once(QueueOp::RemovalLog, StoreError::Unavailable { status: 503 });

    let err = engine.track_removals().await.unwrap_err();
    assert!(matches!(err, SyncError::Enumeration { .. }), "{err}");
}

#[tokio::test]
async fn rate_limit_aborts_the_pass() {
    let (blossom, queue, engine) = setup();
    let a = linked_pair(1);
    let b = linked_pair(2);
    seed(&blossom, &queue, &a);
    seed(&blossom, &queue, &b);
    queue.log_removal(removal("mod_a", &a.0.permalink));
    queue.log_removal(removal("mod_b", &b.0.permalink));
    blossom.fail_once(
        RemoteOp::MarkRemoved,
        StoreError::RateLimited {
            retry_after: Some(std::time::Duration::from_secs(30)),
        },
    );

    let err = engine.track_removals().await.unwrap_err();
    match err {
        SyncError::RateLimited { retry_after, .. } => {
            assert_eq!(retry_after, Some(std::time::Duration::from_secs(30)));
        }
        other => panic!("expected rate limit, got {other}"),
    }
    assert_eq!(
        blossom.count(|c| matches!(c, RemoteCall::MarkRemoved(_))),
        1,
        "second item must not be attempted"
    );
}

use tora_reconcile::{
    PartnerLookup, ReconcileEngine, Report, StoreError, NSFW_REPORT_REASON,
};
use tora_testkit::{
    fast_settings, linked_pair, partner, seed, MemoryBlossom, MemoryQueue, QueueCall, QueueOp,
    RemoteCall,
};

fn setup() -> (MemoryBlossom, MemoryQueue, ReconcileEngine<MemoryBlossom, MemoryQueue>) {
    let blossom = MemoryBlossom::new();
    let queue = MemoryQueue::new();
    let engine = ReconcileEngine::new(blossom.clone(), queue.clone(), fast_settings());
    (blossom, queue, engine)
}

#[tokio::test]
async fn mod_report_reason_is_filed_over_user_report() {
    let (blossom, queue, engine) = setup();
    let (mut item, sub) = linked_pair(1);
    item.user_reports.push(Report::new("spam", "1"));
    item.mod_reports.push(Report::new("Rule 3", "some_mod"));
    seed(&blossom, &queue, &(item, sub.clone()));

    let summary = engine.track_reports().await.unwrap();
    assert_eq!(summary.reported, 1);
    assert_eq!(
        blossom.writes(),
        vec![RemoteCall::FileReport(sub.id, "Rule 3".to_string())]
    );
}

#[tokio::test]
async fn nsfw_partner_is_flagged_and_report_still_filed() {
    let (blossom, queue, engine) = setup();
    let (mut item, sub) = linked_pair(1);
    item.user_reports.push(Report::new("spam", "1"));
    seed(&blossom, &queue, &(item.clone(), sub.clone()));
    queue.set_partner(&item.url, partner(&item.url, true, None));

    let summary = engine.track_reports().await.unwrap();

    assert_eq!(queue.writes(), vec![QueueCall::MarkNsfw(item.fullname.clone())]);
    assert_eq!(
        blossom.writes(),
        vec![
            RemoteCall::MarkNsfw(sub.id),
            RemoteCall::FileReport(sub.id, "spam".to_string()),
        ]
    );
    assert_eq!(summary.auto_handled, 0);
    assert_eq!(summary.reported, 1);
    assert!(queue.item(&item.fullname).unwrap().nsfw);
}

#[tokio::test]
async fn nsfw_sentinel_approves_both_sides_without_report() {
    let (blossom, queue, engine) = setup();
    let (mut item, sub) = linked_pair(1);
    item.user_reports.push(Report::new(NSFW_REPORT_REASON, "1"));
    seed(&blossom, &queue, &(item.clone(), sub.clone()));

    let summary = engine.track_reports().await.unwrap();

    assert_eq!(summary.auto_handled, 1);
    assert_eq!(summary.reported, 0);
    assert_eq!(queue.writes(), vec![QueueCall::Approve(item.fullname.clone())]);
    assert_eq!(blossom.writes(), vec![RemoteCall::MarkApproved(sub.id)]);
}

#[tokio::test]
async fn nsfw_and_removed_partner_removes_both_sides() {
    let (blossom, queue, engine) = setup();
    let (mut item, sub) = linked_pair(1);
    item.user_reports.push(Report::new("spam", "1"));
    seed(&blossom, &queue, &(item.clone(), sub.clone()));
    queue.set_partner(&item.url, partner(&item.url, true, Some("moderator")));

    let summary = engine.track_reports().await.unwrap();

    assert_eq!(summary.auto_handled, 1);
    assert!(queue.writes().contains(&QueueCall::Remove(item.fullname.clone())));
    assert!(blossom.writes().contains(&RemoteCall::MarkRemoved(sub.id)));
    assert_eq!(
        blossom.count(|c| matches!(c, RemoteCall::FileReport(..))),
        0,
        "removal settles the report"
    );
}

#[tokio::test]
async fn forbidden_partner_removes_each_side_once() {
    let (blossom, queue, engine) = setup();
    let (mut item, sub) = linked_pair(1);
    item.user_reports.push(Report::new("spam", "1"));
    seed(&blossom, &queue, &(item.clone(), sub.clone()));
    queue.set_partner(&item.url, PartnerLookup::Forbidden);

    let summary = engine.track_reports().await.unwrap();

    assert_eq!(summary.auto_handled, 1);
    assert_eq!(queue.writes(), vec![QueueCall::Remove(item.fullname.clone())]);
    assert_eq!(blossom.writes(), vec![RemoteCall::MarkRemoved(sub.id)]);
}

#[tokio::test]
async fn resolved_and_unreported_items_are_skipped() {
    let (blossom, queue, engine) = setup();
    let (mut approved, a) = linked_pair(1);
    approved.approved = true;
    approved.user_reports.push(Report::new("spam", "1"));
    let (quiet, b) = linked_pair(2);
    seed(&blossom, &queue, &(approved, a));
    seed(&blossom, &queue, &(quiet, b));

    let summary = engine.track_reports().await.unwrap();
    assert_eq!(summary.skipped, 2);
    assert!(blossom.calls().is_empty());
}

#[tokio::test]
async fn already_reported_submission_is_left_alone() {
    let (blossom, queue, engine) = setup();
    let (mut item, mut sub) = linked_pair(1);
    item.user_reports.push(Report::new("spam", "1"));
    sub.report_reason = Some("spam".to_string());
    seed(&blossom, &queue, &(item, sub));

    let summary = engine.track_reports().await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert!(blossom.writes().is_empty());
    assert_eq!(queue.count(|c| matches!(c, QueueCall::ResolvePartner(_))), 0);
}

#[tokio::test]
async fn transient_partner_failure_defers_item_without_report() {
    let (blossom, queue, engine) = setup();
    let (mut item, sub) = linked_pair(1);
    item.user_reports.push(Report::new("spam", "1"));
    seed(&blossom, &queue, &(item.clone(), sub.clone()));
    queue.set_partner(&item.url, partner(&item.url, false, Some("deleted")));
    queue.fail_once(
        QueueOp::ResolvePartner,
        StoreError::Transport("connection reset".into()),
    );

    let first = engine.track_reports().await.unwrap();
    assert_eq!(first.lookup_failed, 1);
    assert!(blossom.writes().is_empty());
    assert!(queue.writes().is_empty());

    let second = engine.track_reports().await.unwrap();
    assert_eq!(second.auto_handled, 1);
    assert_eq!(blossom.writes(), vec![RemoteCall::MarkRemoved(sub.id)]);
    assert!(queue.writes().contains(&QueueCall::Remove(item.fullname.clone())));
}

#[tokio::test]
async fn unavailable_partner_lookup_files_nothing() {
    let (blossom, queue, engine) = setup();
    let (mut item, sub) = linked_pair(1);
    item.user_reports.push(Report::new("spam", "1"));
    seed(&blossom, &queue, &(item, sub));
    queue.fail_once(QueueOp::ResolvePartner, StoreError::Unavailable { status: 503 });

    let summary = engine.track_reports().await.unwrap();
    assert_eq!(summary.lookup_failed, 1);
    assert_eq!(summary.reported, 0);
    assert!(blossom.writes().is_empty());
}

#[tokio::test]
async fn rejected_partner_lookup_still_files_report() {
    let (blossom, queue, engine) = setup();
    let (mut item, sub) = linked_pair(1);
    item.user_reports.push(Report::new("spam", "1"));
    seed(&blossom, &queue, &(item, sub.clone()));
    queue.fail_once(
        QueueOp::ResolvePartner,
        StoreError::Api { status: 404, message: "not found".into() },
    );

    let summary = engine.track_reports().await.unwrap();
    assert_eq!(summary.lookup_failed, 1);
    assert_eq!(
        blossom.writes(),
        vec![RemoteCall::FileReport(sub.id, "spam".to_string())]
    );
}

#[tokio::test]
async fn partner_rate_limit_surfaces() {
    let (blossom, queue, engine) = setup();
    let (mut item, sub) = linked_pair(1);
    item.user_reports.push(Report::new("spam", "1"));
    seed(&blossom, &queue, &(item, sub));
    queue.fail_once(
        QueueOp::ResolvePartner,
        StoreError::RateLimited { retry_after: None },
    );

    assert!(engine.track_reports().await.is_err());
    assert!(blossom.writes().is_empty());
}

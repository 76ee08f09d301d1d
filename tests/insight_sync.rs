use driftlog::connectivity::ConnectivityMonitor;
use driftlog::crypto::{AppSecret, KdfParams};
use driftlog::db::StoreHandle;
use driftlog::model::{AiInsight, Collection, SyncStatus};
use driftlog::remote::{insight_to_remote, InMemoryRemoteGateway, RetryPolicy};
use driftlog::sync;

fn open_store(dir: &std::path::Path) -> StoreHandle {
    let secret = AppSecret::new("test-secret").expect("secret");
    StoreHandle::open(dir, secret, KdfParams::for_test()).expect("open store")
}

#[test]
fn insight_roundtrips_encrypted_at_rest() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());

    let insight = AiInsight::new(
        "user-1",
        Some("entry-1"),
        "weekly_summary",
        "You wrote most on days you rated below 5.",
    );
    store.put_insight(&insight).expect("put");

    let fetched = store
        .get_insight(&insight.id, "user-1")
        .expect("get")
        .expect("present");
    assert!(!fetched.content.is_encrypted());
    assert_eq!(
        fetched.content.as_plain().expect("plain"),
        "You wrote most on days you rated below 5."
    );
    assert_eq!(fetched.entry_id.as_deref(), Some("entry-1"));
}

#[test]
fn offline_insight_goes_pending_then_push_syncs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());
    let gateway = InMemoryRemoteGateway::new();
    let policy = RetryPolicy::for_test();
    let monitor = ConnectivityMonitor::new(false);

    let mut insight = AiInsight::new("user-1", None, "mood_trend", "Mood trends upward.");
    sync::save_insight(&store, &gateway, &policy, &monitor, &mut insight).expect("save");
    assert_eq!(insight.sync_status, SyncStatus::Pending);

    monitor.set_online(true);
    let report = sync::push_pending(
        &store,
        &gateway,
        &policy,
        &monitor,
        Collection::AiInsights,
        "user-1",
    )
    .expect("push");
    assert_eq!(report.pushed, 1);
    assert!(store.pending_insights("user-1").expect("pending").is_empty());
}

#[test]
fn reconcile_warms_remote_only_insights_into_the_cache() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());
    let gateway = InMemoryRemoteGateway::new();
    let policy = RetryPolicy::for_test();
    let monitor = ConnectivityMonitor::new(true);

    let remote_only = AiInsight::new("user-1", None, "recommendation", "Try an earlier bedtime.");
    gateway.seed(insight_to_remote(&remote_only).expect("to remote"));

    let merged = sync::reconcile_read_insights(&store, &gateway, &policy, &monitor, "user-1")
        .expect("reconcile");
    assert_eq!(merged.records.len(), 1);

    let cached = store
        .get_insight(&remote_only.id, "user-1")
        .expect("get")
        .expect("cached");
    assert_eq!(cached.sync_status, SyncStatus::Synced);
}

#[test]
fn deleting_an_entry_does_not_cascade_to_its_insights() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());

    let insight = AiInsight::new("user-1", Some("entry-1"), "summary", "kept around");
    store.put_insight(&insight).expect("put");

    store.delete_entry("entry-1").expect("delete entry");
    assert!(
        store.get_insight(&insight.id, "user-1").expect("get").is_some(),
        "cascade is not enforced"
    );

    store.delete_insight(&insight.id).expect("delete");
    store.delete_insight(&insight.id).expect("idempotent delete");
}

use driftlog::connectivity::ConnectivityMonitor;
use driftlog::crypto::{AppSecret, KdfParams};
use driftlog::db::StoreHandle;
use driftlog::model::{Collection, JournalEntry, Sensitive, SessionType, SyncStatus};
use driftlog::remote::{InMemoryRemoteGateway, RetryPolicy};
use driftlog::sync;

fn open_store(dir: &std::path::Path) -> StoreHandle {
    let secret = AppSecret::new("test-secret").expect("secret");
    StoreHandle::open(dir, secret, KdfParams::for_test()).expect("open store")
}

#[test]
fn offline_save_is_pending_then_push_marks_synced() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());
    let gateway = InMemoryRemoteGateway::new();
    let policy = RetryPolicy::for_test();
    let monitor = ConnectivityMonitor::new(false);

    let mut entry = JournalEntry::new("user-1", SessionType::QuickCheckin);
    entry.entry_text = Sensitive::Plain("written on the subway".to_string());
    sync::save_entry(&store, &gateway, &policy, &monitor, &mut entry).expect("save offline");

    assert_eq!(entry.sync_status, SyncStatus::Pending);
    assert!(gateway.upsert_log().is_empty(), "no remote call while offline");

    let pending = store.pending_entries("user-1").expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, entry.id);

    // Connectivity returns.
    assert!(monitor.set_online(true).is_some());
    let report = sync::push_pending(
        &store,
        &gateway,
        &policy,
        &monitor,
        Collection::JournalEntries,
        "user-1",
    )
    .expect("push");
    assert_eq!(report.pushed, 1);
    assert!(report.failures.is_empty());

    let fetched = store
        .get_entry(&entry.id, "user-1")
        .expect("get")
        .expect("present");
    assert_eq!(fetched.sync_status, SyncStatus::Synced);

    assert!(
        store.pending_entries("user-1").expect("pending").is_empty(),
        "pending scan no longer returns the synced record"
    );
}

#[test]
fn online_save_mirrors_immediately_and_is_synced() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());
    let gateway = InMemoryRemoteGateway::new();
    let policy = RetryPolicy::for_test();
    let monitor = ConnectivityMonitor::new(true);

    let mut entry = JournalEntry::new("user-1", SessionType::StandardSession);
    entry.entry_text = Sensitive::Plain("written at home".to_string());
    sync::save_entry(&store, &gateway, &policy, &monitor, &mut entry).expect("save online");

    assert_eq!(entry.sync_status, SyncStatus::Synced);
    assert_eq!(gateway.upsert_log().len(), 1);
    assert!(gateway.get(Collection::JournalEntries, &entry.id).is_some());

    // The local write happened regardless of the successful mirror.
    assert!(store.get_entry(&entry.id, "user-1").expect("get").is_some());
}

#[test]
fn failed_mirror_downgrades_to_pending_without_failing_the_save() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());
    let gateway = InMemoryRemoteGateway::new();
    let policy = RetryPolicy::for_test();
    let monitor = ConnectivityMonitor::new(true);

    gateway.fail_next(10); // more than the retry budget

    let mut entry = JournalEntry::new("user-1", SessionType::QuickCheckin);
    entry.entry_text = Sensitive::Plain("flaky network".to_string());
    sync::save_entry(&store, &gateway, &policy, &monitor, &mut entry)
        .expect("save succeeds despite remote failure");

    assert_eq!(entry.sync_status, SyncStatus::Pending);
    let pending = store.pending_entries("user-1").expect("pending");
    assert_eq!(pending.len(), 1);
}

#[test]
fn paused_entries_are_not_pushed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());
    let gateway = InMemoryRemoteGateway::new();
    let policy = RetryPolicy::for_test();
    let monitor = ConnectivityMonitor::new(false);

    let mut entry = JournalEntry::new("user-1", SessionType::DeepDive);
    sync::save_entry(&store, &gateway, &policy, &monitor, &mut entry).expect("save");
    sync::pause_entry(&store, &entry.id).expect("pause");

    monitor.set_online(true);
    let report = sync::push_pending(
        &store,
        &gateway,
        &policy,
        &monitor,
        Collection::JournalEntries,
        "user-1",
    )
    .expect("push");
    assert_eq!(report.pushed, 0);
    assert!(gateway.upsert_log().is_empty());

    sync::resume_entry(&store, &entry.id).expect("resume");
    let report = sync::push_pending(
        &store,
        &gateway,
        &policy,
        &monitor,
        Collection::JournalEntries,
        "user-1",
    )
    .expect("push after resume");
    assert_eq!(report.pushed, 1);
}

use driftlog::connectivity::ConnectivityMonitor;
use driftlog::crypto::{AppSecret, KdfParams};
use driftlog::db::StoreHandle;
use driftlog::model::{now_ms, Collection, Profile, SyncStatus, UserPreferences};
use driftlog::remote::{InMemoryRemoteGateway, RetryPolicy};
use driftlog::sync;

fn open_store(dir: &std::path::Path) -> StoreHandle {
    let secret = AppSecret::new("test-secret").expect("secret");
    StoreHandle::open(dir, secret, KdfParams::for_test()).expect("open store")
}

fn profile(name: &str) -> Profile {
    let now = now_ms();
    Profile {
        user_id: "user-1".to_string(),
        display_name: name.to_string(),
        timezone: Some("Europe/Berlin".to_string()),
        created_at_ms: now,
        updated_at_ms: now,
    }
}

#[test]
fn profile_is_overwritten_in_place() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());
    let gateway = InMemoryRemoteGateway::new();
    let policy = RetryPolicy::for_test();
    let monitor = ConnectivityMonitor::new(true);

    assert!(store.get_profile("user-1").expect("get").is_none(), "lazy create");

    sync::save_profile(&store, &gateway, &policy, &monitor, &profile("Ada")).expect("save");
    sync::save_profile(&store, &gateway, &policy, &monitor, &profile("Ada L.")).expect("save again");

    let (stored, status) = store.get_profile("user-1").expect("get").expect("present");
    assert_eq!(stored.display_name, "Ada L.");
    assert_eq!(status, SyncStatus::Synced);
}

#[test]
fn offline_profile_write_goes_pending_and_push_syncs_it() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());
    let gateway = InMemoryRemoteGateway::new();
    let policy = RetryPolicy::for_test();
    let monitor = ConnectivityMonitor::new(false);

    sync::save_profile(&store, &gateway, &policy, &monitor, &profile("Ada")).expect("save");
    let (_, status) = store.get_profile("user-1").expect("get").expect("present");
    assert_eq!(status, SyncStatus::Pending);

    monitor.set_online(true);
    let report = sync::push_pending(
        &store,
        &gateway,
        &policy,
        &monitor,
        Collection::Profiles,
        "user-1",
    )
    .expect("push");
    assert_eq!(report.pushed, 1);

    let (_, status) = store.get_profile("user-1").expect("get").expect("present");
    assert_eq!(status, SyncStatus::Synced);
    assert!(gateway.get(Collection::Profiles, "user-1").is_some());
}

#[test]
fn preferences_roundtrip_and_sync() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());
    let gateway = InMemoryRemoteGateway::new();
    let policy = RetryPolicy::for_test();
    let monitor = ConnectivityMonitor::new(false);

    let mut prefs = UserPreferences::defaults("user-1");
    prefs.reminder_enabled = true;
    prefs.reminder_hour = Some(21);
    sync::save_preferences(&store, &gateway, &policy, &monitor, &prefs).expect("save");

    let (stored, status) = store.get_preferences("user-1").expect("get").expect("present");
    assert_eq!(stored.reminder_hour, Some(21));
    assert_eq!(status, SyncStatus::Pending);

    monitor.set_online(true);
    let report = sync::push_pending(
        &store,
        &gateway,
        &policy,
        &monitor,
        Collection::UserPreferences,
        "user-1",
    )
    .expect("push");
    assert_eq!(report.pushed, 1);

    let (_, status) = store.get_preferences("user-1").expect("get").expect("present");
    assert_eq!(status, SyncStatus::Synced);
}

use anyhow::{anyhow, Result};
use driftlog::assistant::{self, Collaborator};
use driftlog::connectivity::ConnectivityMonitor;
use driftlog::crypto::{AppSecret, KdfParams};
use driftlog::db::StoreHandle;
use driftlog::model::{JournalEntry, Sensitive, SessionType, SyncStatus};
use driftlog::remote::{InMemoryRemoteGateway, RetryPolicy};
use driftlog::sync;

fn open_store(dir: &std::path::Path) -> StoreHandle {
    let secret = AppSecret::new("test-secret").expect("secret");
    StoreHandle::open(dir, secret, KdfParams::for_test()).expect("open store")
}

/// Fails until flipped, then answers with canned text.
struct FlakyCollaborator {
    available: std::sync::atomic::AtomicBool,
}

impl FlakyCollaborator {
    fn new(available: bool) -> Self {
        Self {
            available: std::sync::atomic::AtomicBool::new(available),
        }
    }

    fn set_available(&self, available: bool) {
        self.available
            .store(available, std::sync::atomic::Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.available.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(())
        } else {
            Err(anyhow!("collaborator unreachable"))
        }
    }
}

impl Collaborator for FlakyCollaborator {
    fn generate_question(&self, _mood: Option<u8>) -> Result<String> {
        self.check()?;
        Ok("What stood out today?".to_string())
    }
    fn analyze_response(&self, text: &str) -> Result<String> {
        self.check()?;
        Ok(format!("Reflection noted: {}", text.len()))
    }
    fn suggest_follow_up(&self, _history: &[String]) -> Result<String> {
        self.check()?;
        Ok("Tell me more about that.".to_string())
    }
    fn generate_insights(&self, _texts: &[String]) -> Result<String> {
        self.check()?;
        Ok("Steady week overall.".to_string())
    }
    fn generate_recommendations(&self, _texts: &[String]) -> Result<Vec<String>> {
        self.check()?;
        Ok(vec!["Keep the evening walks.".to_string()])
    }
}

#[test]
fn on_online_pushes_pending_then_reanalyzes_fallback_entries() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());
    let gateway = InMemoryRemoteGateway::new();
    let policy = RetryPolicy::for_test();
    let monitor = ConnectivityMonitor::new(false);
    let collaborator = FlakyCollaborator::new(false);

    // Session ends offline: fallback analysis, pending status.
    let mut entry = JournalEntry::new("user-1", SessionType::StandardSession);
    entry.entry_text = Sensitive::Plain("a long, scattered day".to_string());
    sync::end_session(&store, &gateway, &policy, &monitor, &collaborator, &mut entry)
        .expect("end session offline");

    let saved = store.get_entry(&entry.id, "user-1").expect("get").expect("present");
    assert!(saved.needs_analysis);
    assert_eq!(saved.sync_status, SyncStatus::Pending);

    // Device reconnects and the collaborator is reachable again.
    monitor.set_online(true);
    collaborator.set_available(true);

    let report = sync::on_online(&store, &gateway, &policy, &monitor, &collaborator, "user-1")
        .expect("on_online");
    assert_eq!(report.pushed, 1, "pending entry pushed first");
    assert_eq!(report.push_failures, 0);
    assert_eq!(report.reanalyzed, 1);

    let refreshed = store.get_entry(&entry.id, "user-1").expect("get").expect("present");
    assert!(!refreshed.needs_analysis);
    assert_eq!(refreshed.sync_status, SyncStatus::Synced);
    let analysis = refreshed
        .ai_analysis
        .expect("analysis")
        .as_plain()
        .expect("plain")
        .clone();
    assert_ne!(analysis, assistant::FALLBACK_ANALYSIS);
    assert!(analysis.starts_with("Reflection noted:"));
}

#[test]
fn collaborator_failure_during_reanalysis_keeps_the_fallback() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = open_store(temp.path());
    let gateway = InMemoryRemoteGateway::new();
    let policy = RetryPolicy::for_test();
    let monitor = ConnectivityMonitor::new(false);
    let collaborator = FlakyCollaborator::new(false);

    let mut entry = JournalEntry::new("user-1", SessionType::QuickCheckin);
    entry.entry_text = Sensitive::Plain("short note".to_string());
    sync::end_session(&store, &gateway, &policy, &monitor, &collaborator, &mut entry)
        .expect("end session offline");

    // Back online, but the collaborator still errors.
    monitor.set_online(true);
    let reanalyzed =
        sync::reanalyze_pending(&store, &gateway, &policy, &monitor, &collaborator, "user-1")
            .expect("reanalyze");
    assert_eq!(reanalyzed, 0);

    let kept = store.get_entry(&entry.id, "user-1").expect("get").expect("present");
    assert!(kept.needs_analysis, "still parked for the next attempt");
    assert_eq!(
        kept.ai_analysis.expect("analysis").as_plain().expect("plain"),
        assistant::FALLBACK_ANALYSIS
    );
}

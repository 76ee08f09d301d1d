//! Reconciles local and remote record sets and drives outbound sync.
//!
//! Every write lands in the local store first; the remote mirror is
//! best-effort and a miss merely leaves the record `pending` for the next
//! connectivity event. Nothing here persists outside `StoreHandle`.

use anyhow::Result;
use tracing::{info, warn};

use crate::assistant::{self, Collaborator};
use crate::connectivity::{ConnectivityMonitor, Transition};
use crate::db::{DegradedRead, ReadFailure, StoreHandle};
use crate::error::RemoteUnavailable;
use crate::model::{
    now_ms, AiInsight, Collection, JournalEntry, Profile, Sensitive, SyncStatus, UserPreferences,
};
use crate::remote::{
    call_with_retry, entry_from_remote, entry_to_remote, insight_from_remote, insight_to_remote,
    preferences_to_remote, profile_to_remote, RemoteGateway, RemoteRecord, RetryPolicy,
};

#[derive(Debug)]
pub struct PushFailure {
    pub id: String,
    pub error: anyhow::Error,
}

/// Outcome of one `push_pending` invocation. Best-effort: failures on
/// individual records never abort the rest.
#[derive(Debug, Default)]
pub struct PushReport {
    pub pushed: u64,
    pub failures: Vec<PushFailure>,
}

#[derive(Debug, Default)]
pub struct OnlineReport {
    pub pushed: u64,
    pub push_failures: usize,
    pub reanalyzed: usize,
}

fn mirror(
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    record: &RemoteRecord,
) -> Result<()> {
    if !monitor.is_online() {
        return Err(RemoteUnavailable {
            reason: "device is offline".to_string(),
        }
        .into());
    }
    call_with_retry(policy, || monitor.is_online(), || {
        gateway.upsert(record).map(|_| ())
    })
}

/// The canonical write path: local durable write first, always; then a
/// best-effort remote mirror. A failed mirror downgrades to `pending`
/// instead of failing the operation — the user's entry is already saved.
/// Local failures (crypto, storage) propagate untouched.
pub fn save_entry(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    entry: &mut JournalEntry,
) -> Result<()> {
    entry.sync_status = SyncStatus::Pending;
    entry.updated_at_ms = now_ms();
    store.put_entry(entry)?;

    match entry_to_remote(entry).and_then(|record| mirror(gateway, policy, monitor, &record)) {
        Ok(()) => {
            store.mark_entry_synced(&entry.id)?;
            entry.sync_status = SyncStatus::Synced;
        }
        Err(e) => {
            warn!(entry_id = %entry.id, error = %e, "remote mirror failed, entry stays pending");
        }
    }
    Ok(())
}

pub fn save_insight(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    insight: &mut AiInsight,
) -> Result<()> {
    insight.sync_status = SyncStatus::Pending;
    store.put_insight(insight)?;

    match insight_to_remote(insight).and_then(|record| mirror(gateway, policy, monitor, &record)) {
        Ok(()) => {
            store.mark_insight_synced(&insight.id)?;
            insight.sync_status = SyncStatus::Synced;
        }
        Err(e) => {
            warn!(insight_id = %insight.id, error = %e, "remote mirror failed, insight stays pending");
        }
    }
    Ok(())
}

pub fn save_profile(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    profile: &Profile,
) -> Result<()> {
    store.upsert_profile(profile, SyncStatus::Pending)?;

    match profile_to_remote(profile).and_then(|record| mirror(gateway, policy, monitor, &record)) {
        Ok(()) => store.mark_profile_synced(&profile.user_id)?,
        Err(e) => {
            warn!(user_id = %profile.user_id, error = %e, "profile mirror failed, stays pending");
        }
    }
    Ok(())
}

pub fn save_preferences(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    prefs: &UserPreferences,
) -> Result<()> {
    store.upsert_preferences(prefs, SyncStatus::Pending)?;

    match preferences_to_remote(prefs).and_then(|record| mirror(gateway, policy, monitor, &record))
    {
        Ok(()) => store.mark_preferences_synced(&prefs.user_id)?,
        Err(e) => {
            warn!(user_id = %prefs.user_id, error = %e, "preferences mirror failed, stays pending");
        }
    }
    Ok(())
}

/// Explicit user discard: local removal is authoritative; the remote
/// delete is best-effort (no tombstones — an offline discard does not
/// propagate, matching the last-writer-wins model).
pub fn discard_entry(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    id: &str,
) -> Result<()> {
    store.delete_entry(id)?;
    if monitor.is_online() {
        if let Err(e) = call_with_retry(policy, || monitor.is_online(), || {
            gateway.delete(Collection::JournalEntries, id)
        }) {
            warn!(entry_id = %id, error = %e, "remote delete failed");
        }
    }
    Ok(())
}

pub fn pause_entry(store: &StoreHandle, id: &str) -> Result<()> {
    store.set_entry_status(id, SyncStatus::Paused)
}

pub fn resume_entry(store: &StoreHandle, id: &str) -> Result<()> {
    store.set_entry_status(id, SyncStatus::Pending)
}

/// Pushes every `pending` record of `collection`, strictly one at a time
/// in creation order. A failure on one record is recorded and the loop
/// moves on; no retry loop runs here beyond the bounded gateway retry.
pub fn push_pending(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    collection: Collection,
    user_id: &str,
) -> Result<PushReport> {
    let mut report = PushReport::default();

    match collection {
        Collection::JournalEntries => {
            for entry in store.pending_entries(user_id)? {
                let result = entry_to_remote(&entry)
                    .and_then(|record| mirror(gateway, policy, monitor, &record));
                match result {
                    Ok(()) => {
                        store.mark_entry_synced(&entry.id)?;
                        report.pushed += 1;
                    }
                    Err(error) => report.failures.push(PushFailure {
                        id: entry.id,
                        error,
                    }),
                }
            }
        }
        Collection::AiInsights => {
            for insight in store.pending_insights(user_id)? {
                let result = insight_to_remote(&insight)
                    .and_then(|record| mirror(gateway, policy, monitor, &record));
                match result {
                    Ok(()) => {
                        store.mark_insight_synced(&insight.id)?;
                        report.pushed += 1;
                    }
                    Err(error) => report.failures.push(PushFailure {
                        id: insight.id,
                        error,
                    }),
                }
            }
        }
        Collection::Profiles => {
            if let Some((profile, SyncStatus::Pending)) = store.get_profile(user_id)? {
                let result = profile_to_remote(&profile)
                    .and_then(|record| mirror(gateway, policy, monitor, &record));
                match result {
                    Ok(()) => {
                        store.mark_profile_synced(user_id)?;
                        report.pushed += 1;
                    }
                    Err(error) => report.failures.push(PushFailure {
                        id: user_id.to_string(),
                        error,
                    }),
                }
            }
        }
        Collection::UserPreferences => {
            if let Some((prefs, SyncStatus::Pending)) = store.get_preferences(user_id)? {
                let result = preferences_to_remote(&prefs)
                    .and_then(|record| mirror(gateway, policy, monitor, &record));
                match result {
                    Ok(()) => {
                        store.mark_preferences_synced(user_id)?;
                        report.pushed += 1;
                    }
                    Err(error) => report.failures.push(PushFailure {
                        id: user_id.to_string(),
                        error,
                    }),
                }
            }
        }
        // The fallback pool is device-local and never synced.
        Collection::QuestionPool => {}
    }

    if report.pushed > 0 || !report.failures.is_empty() {
        info!(
            collection = collection.table_name(),
            pushed = report.pushed,
            failed = report.failures.len(),
            "push_pending finished"
        );
    }
    Ok(report)
}

/// Merged read of journal entries. Local wins for any record still
/// `pending` (it carries unsynced edits); an acknowledged remote copy is
/// authoritative otherwise and is written back into the local cache as
/// `synced`, as are remote-only records never cached locally.
pub fn reconcile_read_entries(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    user_id: &str,
) -> Result<DegradedRead<JournalEntry>> {
    let local = store.list_entries(user_id)?;
    if !monitor.is_online() {
        return Ok(local);
    }

    let remote_records = match call_with_retry(policy, || monitor.is_online(), || {
        gateway.select_by_owner(Collection::JournalEntries, user_id)
    }) {
        Ok(records) => records,
        Err(e) => {
            // Degrade to local-only; background sync will catch up later.
            warn!(error = %e, "remote fetch failed, serving local entries only");
            return Ok(local);
        }
    };

    let DegradedRead {
        records: local_entries,
        mut failures,
    } = local;

    let mut merged: Vec<JournalEntry> = Vec::new();
    let mut remote_ids = std::collections::BTreeSet::new();

    for record in &remote_records {
        remote_ids.insert(record.id.clone());
        let local_match = local_entries.iter().find(|e| e.id == record.id);
        match local_match {
            Some(entry) if entry.sync_status == SyncStatus::Pending => {
                merged.push(entry.clone());
            }
            _ => match entry_from_remote(record, SyncStatus::Synced) {
                Ok(entry) => {
                    store.put_entry(&entry)?;
                    merged.push(entry);
                }
                // A malformed remote record degrades like a corrupted
                // local row: keep the cached copy if there is one,
                // otherwise report and move on.
                Err(error) => match local_match {
                    Some(entry) => {
                        warn!(record_id = %record.id, error = %error, "malformed remote entry, keeping cached copy");
                        merged.push(entry.clone());
                    }
                    None => {
                        warn!(record_id = %record.id, error = %error, "dropping malformed remote entry");
                        failures.push(ReadFailure {
                            id: record.id.clone(),
                            error,
                        });
                    }
                },
            },
        }
    }

    for entry in local_entries {
        if !remote_ids.contains(&entry.id) {
            merged.push(entry);
        }
    }

    merged.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
    Ok(DegradedRead {
        records: merged,
        failures,
    })
}

pub fn reconcile_read_insights(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    user_id: &str,
) -> Result<DegradedRead<AiInsight>> {
    let local = store.list_insights(user_id)?;
    if !monitor.is_online() {
        return Ok(local);
    }

    let remote_records = match call_with_retry(policy, || monitor.is_online(), || {
        gateway.select_by_owner(Collection::AiInsights, user_id)
    }) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "remote fetch failed, serving local insights only");
            return Ok(local);
        }
    };

    let DegradedRead {
        records: local_insights,
        mut failures,
    } = local;

    let mut merged: Vec<AiInsight> = Vec::new();
    let mut remote_ids = std::collections::BTreeSet::new();

    for record in &remote_records {
        remote_ids.insert(record.id.clone());
        let local_match = local_insights.iter().find(|i| i.id == record.id);
        match local_match {
            Some(insight) if insight.sync_status == SyncStatus::Pending => {
                merged.push(insight.clone());
            }
            _ => match insight_from_remote(record, SyncStatus::Synced) {
                Ok(insight) => {
                    store.put_insight(&insight)?;
                    merged.push(insight);
                }
                Err(error) => match local_match {
                    Some(insight) => {
                        warn!(record_id = %record.id, error = %error, "malformed remote insight, keeping cached copy");
                        merged.push(insight.clone());
                    }
                    None => {
                        warn!(record_id = %record.id, error = %error, "dropping malformed remote insight");
                        failures.push(ReadFailure {
                            id: record.id.clone(),
                            error,
                        });
                    }
                },
            },
        }
    }

    for insight in local_insights {
        if !remote_ids.contains(&insight.id) {
            merged.push(insight);
        }
    }

    merged.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
    Ok(DegradedRead {
        records: merged,
        failures,
    })
}

/// Session end: attach an analysis (collaborator when reachable, static
/// fallback otherwise) and run the entry through the canonical write path.
pub fn end_session(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    collaborator: &dyn Collaborator,
    entry: &mut JournalEntry,
) -> Result<()> {
    let text = entry.entry_text.as_plain()?.clone();
    let analysis = assistant::analysis_with_fallback(collaborator, monitor.is_online(), &text);
    entry.needs_analysis = analysis == assistant::FALLBACK_ANALYSIS;
    entry.ai_analysis = Some(Sensitive::Plain(analysis));
    save_entry(store, gateway, policy, monitor, entry)
}

/// Re-runs the collaborator over entries parked with the fallback
/// analysis. Per-entry failures are skipped; the flag stays set so the
/// next online transition tries again.
pub fn reanalyze_pending(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    collaborator: &dyn Collaborator,
    user_id: &str,
) -> Result<usize> {
    let mut reanalyzed = 0usize;
    for mut entry in store.entries_needing_analysis(user_id)? {
        let text = entry.entry_text.as_plain()?.clone();
        match collaborator.analyze_response(&text) {
            Ok(analysis) => {
                entry.ai_analysis = Some(Sensitive::Plain(analysis));
                entry.needs_analysis = false;
                save_entry(store, gateway, policy, monitor, &mut entry)?;
                reanalyzed += 1;
            }
            Err(e) => {
                warn!(entry_id = %entry.id, error = %e, "reanalysis failed, keeping fallback");
            }
        }
    }
    Ok(reanalyzed)
}

/// Connectivity hook: on an online transition, push pending writes for
/// every collection that can hold them, then resume the suspended
/// reanalysis work.
pub fn on_online(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    collaborator: &dyn Collaborator,
    user_id: &str,
) -> Result<OnlineReport> {
    let mut report = OnlineReport::default();

    for collection in [
        Collection::JournalEntries,
        Collection::AiInsights,
        Collection::Profiles,
        Collection::UserPreferences,
    ] {
        let push = push_pending(store, gateway, policy, monitor, collection, user_id)?;
        report.pushed += push.pushed;
        report.push_failures += push.failures.len();
    }

    report.reanalyzed = reanalyze_pending(store, gateway, policy, monitor, collaborator, user_id)?;
    Ok(report)
}

/// Entry point for the platform connectivity signal. Feeds the raw state
/// through the monitor and, when a deduplicated transition to online
/// comes out, runs the full online pass (push, then reanalysis). Offline
/// transitions and swallowed duplicates do nothing.
pub fn drive_transition(
    store: &StoreHandle,
    gateway: &dyn RemoteGateway,
    policy: &RetryPolicy,
    monitor: &ConnectivityMonitor,
    collaborator: &dyn Collaborator,
    user_id: &str,
    online: bool,
) -> Result<Option<OnlineReport>> {
    match monitor.set_online(online) {
        Some(Transition::Online) => {
            on_online(store, gateway, policy, monitor, collaborator, user_id).map(Some)
        }
        Some(Transition::Offline) | None => Ok(None),
    }
}

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::json;
use tracing::debug;

use crate::error::{RemoteRejected, RemoteRetryExhausted, RemoteUnavailable};
use crate::model::{
    AiInsight, Collection, ConversationTurn, JournalEntry, Profile, Sensitive, SessionType,
    SyncStatus, UserPreferences,
};

/// Plaintext wire representation of one record. Sensitive fields cross
/// this boundary decrypted; at-rest encryption is a local concern.
#[derive(Clone, Debug)]
pub struct RemoteRecord {
    pub id: String,
    pub user_id: String,
    pub collection: Collection,
    pub payload: serde_json::Value,
    pub updated_at_ms: i64,
}

/// The remote record store contract. Production backends live in the
/// hosting application; this crate ships the in-memory implementation
/// used by tests.
pub trait RemoteGateway: Send + Sync {
    fn upsert(&self, record: &RemoteRecord) -> Result<RemoteRecord>;
    fn update(&self, collection: Collection, id: &str, patch: &serde_json::Value)
        -> Result<RemoteRecord>;
    fn delete(&self, collection: Collection, id: &str) -> Result<()>;
    fn select_by_owner(&self, collection: Collection, user_id: &str) -> Result<Vec<RemoteRecord>>;
    /// Filters on the `status` key that entry and insight payloads carry
    /// (the record's sync status at push time). Profile and preferences
    /// payloads have no status key; they are singletons fetched by owner.
    fn select_by_owner_and_status(
        &self,
        collection: Collection,
        user_id: &str,
        status: &str,
    ) -> Result<Vec<RemoteRecord>>;
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn for_test() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }
}

/// Bounded exponential backoff around one gateway call. An explicit loop
/// with an attempt counter, never recursion. Only transport failures
/// (`RemoteUnavailable`) are retried, and only while `is_online` still
/// reports true — if connectivity drops mid-retry the call fails fast
/// with the last transport error instead of spinning.
pub fn call_with_retry<T>(
    policy: &RetryPolicy,
    is_online: impl Fn() -> bool,
    mut op: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is::<RemoteUnavailable>() => {
                if attempt >= policy.max_attempts {
                    return Err(RemoteRetryExhausted { attempts: attempt }.into());
                }
                if !is_online() {
                    return Err(e);
                }
                let delay = policy.base_delay * 2u32.saturating_pow(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "remote retry");
                thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

// --- wire conversions ---------------------------------------------------

pub fn entry_to_remote(entry: &JournalEntry) -> Result<RemoteRecord> {
    let conversation = entry.conversation.as_plain()?;
    let entry_text = entry.entry_text.as_plain()?;
    let ai_analysis = match &entry.ai_analysis {
        Some(field) => Some(field.as_plain()?.clone()),
        None => None,
    };

    let payload = json!({
        "session_type": entry.session_type.as_str(),
        "mood_rating": entry.mood_rating,
        "conversation": conversation,
        "entry_text": entry_text,
        "ai_analysis": ai_analysis,
        "tags": entry.tags,
        "status": entry.sync_status.as_str(),
        "created_at_ms": entry.created_at_ms,
    });
    Ok(RemoteRecord {
        id: entry.id.clone(),
        user_id: entry.user_id.clone(),
        collection: Collection::JournalEntries,
        payload,
        updated_at_ms: entry.updated_at_ms,
    })
}

pub fn entry_from_remote(record: &RemoteRecord, status: SyncStatus) -> Result<JournalEntry> {
    let p = &record.payload;
    let session_type = SessionType::parse(
        p["session_type"]
            .as_str()
            .ok_or_else(|| anyhow!("remote entry missing session_type"))?,
    )?;
    let turns: Vec<ConversationTurn> = serde_json::from_value(p["conversation"].clone())?;
    let entry_text = p["entry_text"]
        .as_str()
        .ok_or_else(|| anyhow!("remote entry missing entry_text"))?
        .to_string();
    let tags: Vec<String> = serde_json::from_value(p["tags"].clone()).unwrap_or_default();

    // An out-of-range remote mood is dropped rather than truncated; the
    // local store would reject it on the cache warm otherwise.
    let mood_rating = p["mood_rating"]
        .as_u64()
        .and_then(|v| u8::try_from(v).ok())
        .filter(|v| (1..=10).contains(v));

    Ok(JournalEntry {
        id: record.id.clone(),
        user_id: record.user_id.clone(),
        created_at_ms: p["created_at_ms"].as_i64().unwrap_or(record.updated_at_ms),
        updated_at_ms: record.updated_at_ms,
        session_type,
        mood_rating,
        conversation: Sensitive::Plain(turns),
        entry_text: Sensitive::Plain(entry_text),
        ai_analysis: p["ai_analysis"].as_str().map(|v| Sensitive::Plain(v.to_string())),
        tags,
        sync_status: status,
        needs_analysis: false,
    })
}

pub fn insight_to_remote(insight: &AiInsight) -> Result<RemoteRecord> {
    let content = insight.content.as_plain()?;
    let payload = json!({
        "entry_id": insight.entry_id,
        "insight_type": insight.insight_type,
        "content": content,
        "status": insight.sync_status.as_str(),
        "created_at_ms": insight.created_at_ms,
    });
    Ok(RemoteRecord {
        id: insight.id.clone(),
        user_id: insight.user_id.clone(),
        collection: Collection::AiInsights,
        payload,
        updated_at_ms: insight.created_at_ms,
    })
}

pub fn insight_from_remote(record: &RemoteRecord, status: SyncStatus) -> Result<AiInsight> {
    let p = &record.payload;
    Ok(AiInsight {
        id: record.id.clone(),
        user_id: record.user_id.clone(),
        entry_id: p["entry_id"].as_str().map(|v| v.to_string()),
        insight_type: p["insight_type"]
            .as_str()
            .ok_or_else(|| anyhow!("remote insight missing insight_type"))?
            .to_string(),
        content: Sensitive::Plain(
            p["content"]
                .as_str()
                .ok_or_else(|| anyhow!("remote insight missing content"))?
                .to_string(),
        ),
        created_at_ms: p["created_at_ms"].as_i64().unwrap_or(record.updated_at_ms),
        sync_status: status,
    })
}

pub fn profile_to_remote(profile: &Profile) -> Result<RemoteRecord> {
    Ok(RemoteRecord {
        id: profile.user_id.clone(),
        user_id: profile.user_id.clone(),
        collection: Collection::Profiles,
        payload: serde_json::to_value(profile)?,
        updated_at_ms: profile.updated_at_ms,
    })
}

pub fn preferences_to_remote(prefs: &UserPreferences) -> Result<RemoteRecord> {
    Ok(RemoteRecord {
        id: prefs.user_id.clone(),
        user_id: prefs.user_id.clone(),
        collection: Collection::UserPreferences,
        payload: serde_json::to_value(prefs)?,
        updated_at_ms: prefs.updated_at_ms,
    })
}

// --- in-memory gateway --------------------------------------------------

/// BTreeMap-backed gateway for tests: records every upsert in order and
/// can be told to fail the next N calls at the transport level.
pub struct InMemoryRemoteGateway {
    records: Mutex<BTreeMap<(Collection, String), RemoteRecord>>,
    upsert_log: Mutex<Vec<(Collection, String)>>,
    fail_next: AtomicU32,
}

impl InMemoryRemoteGateway {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            upsert_log: Mutex::new(Vec::new()),
            fail_next: AtomicU32::new(0),
        }
    }

    /// The next `n` gateway calls fail with `RemoteUnavailable`.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn upsert_log(&self) -> Vec<(Collection, String)> {
        self.upsert_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Seeds a record without touching the upsert log.
    pub fn seed(&self, record: RemoteRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.insert((record.collection, record.id.clone()), record);
        }
    }

    pub fn get(&self, collection: Collection, id: &str) -> Option<RemoteRecord> {
        self.records
            .lock()
            .ok()?
            .get(&(collection, id.to_string()))
            .cloned()
    }

    fn check_transport(&self) -> Result<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(RemoteUnavailable {
                reason: "injected transport failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for InMemoryRemoteGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteGateway for InMemoryRemoteGateway {
    fn upsert(&self, record: &RemoteRecord) -> Result<RemoteRecord> {
        self.check_transport()?;
        let mut records = self.records.lock().map_err(|_| anyhow!("poisoned lock"))?;
        records.insert((record.collection, record.id.clone()), record.clone());

        let mut log = self.upsert_log.lock().map_err(|_| anyhow!("poisoned lock"))?;
        log.push((record.collection, record.id.clone()));
        Ok(record.clone())
    }

    fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: &serde_json::Value,
    ) -> Result<RemoteRecord> {
        self.check_transport()?;
        let mut records = self.records.lock().map_err(|_| anyhow!("poisoned lock"))?;
        let record = records.get_mut(&(collection, id.to_string())).ok_or_else(|| {
            anyhow::Error::from(RemoteRejected {
                collection,
                id: id.to_string(),
                reason: "no such record".to_string(),
            })
        })?;

        if let (Some(target), Some(fields)) = (record.payload.as_object_mut(), patch.as_object()) {
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
        }
        record.updated_at_ms = crate::model::now_ms();
        Ok(record.clone())
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.check_transport()?;
        let mut records = self.records.lock().map_err(|_| anyhow!("poisoned lock"))?;
        records.remove(&(collection, id.to_string()));
        Ok(())
    }

    fn select_by_owner(&self, collection: Collection, user_id: &str) -> Result<Vec<RemoteRecord>> {
        self.check_transport()?;
        let records = self.records.lock().map_err(|_| anyhow!("poisoned lock"))?;
        Ok(records
            .values()
            .filter(|r| r.collection == collection && r.user_id == user_id)
            .cloned()
            .collect())
    }

    fn select_by_owner_and_status(
        &self,
        collection: Collection,
        user_id: &str,
        status: &str,
    ) -> Result<Vec<RemoteRecord>> {
        self.check_transport()?;
        let records = self.records.lock().map_err(|_| anyhow!("poisoned lock"))?;
        Ok(records
            .values()
            .filter(|r| {
                r.collection == collection
                    && r.user_id == user_id
                    && r.payload["status"].as_str() == Some(status)
            })
            .cloned()
            .collect())
    }
}

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Local sync state of a record. `pending` writes have not been
/// acknowledged by the remote store yet; `paused` sessions are parked and
/// excluded from pushes until resumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Paused,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Paused => "paused",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            "paused" => Ok(SyncStatus::Paused),
            other => Err(anyhow!("unknown sync status: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    QuickCheckin,
    StandardSession,
    DeepDive,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::QuickCheckin => "quick_checkin",
            SessionType::StandardSession => "standard_session",
            SessionType::DeepDive => "deep_dive",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "quick_checkin" => Ok(SessionType::QuickCheckin),
            "standard_session" => Ok(SessionType::StandardSession),
            "deep_dive" => Ok(SessionType::DeepDive),
            other => Err(anyhow!("unknown session type: {other}")),
        }
    }
}

/// A sensitive field is either the caller-facing plaintext value or the
/// at-rest base64 ciphertext. The variant *is* the encryption state, so it
/// cannot drift out of sync with the bytes the way a separate boolean can.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sensitive<T> {
    Plain(T),
    Encrypted(String),
}

impl<T> Sensitive<T> {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Sensitive::Encrypted(_))
    }

    /// The plaintext value. Records handed out by the store are always
    /// `Plain`; hitting `Encrypted` here means a layering bug.
    pub fn as_plain(&self) -> Result<&T> {
        match self {
            Sensitive::Plain(value) => Ok(value),
            Sensitive::Encrypted(_) => Err(anyhow!("sensitive field is still encrypted")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One role-tagged turn of a journaling conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Clone, Debug)]
pub struct JournalEntry {
    pub id: String,
    pub user_id: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub session_type: SessionType,
    /// 1..=10 when present; validated on `put_entry`.
    pub mood_rating: Option<u8>,
    pub conversation: Sensitive<Vec<ConversationTurn>>,
    pub entry_text: Sensitive<String>,
    pub ai_analysis: Option<Sensitive<String>>,
    pub tags: Vec<String>,
    pub sync_status: SyncStatus,
    /// Set when `ai_analysis` holds the offline fallback text; cleared
    /// once the collaborator has produced a real analysis.
    pub needs_analysis: bool,
}

impl JournalEntry {
    pub fn new(user_id: &str, session_type: SessionType) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at_ms: now,
            updated_at_ms: now,
            session_type,
            mood_rating: None,
            conversation: Sensitive::Plain(Vec::new()),
            entry_text: Sensitive::Plain(String::new()),
            ai_analysis: None,
            tags: Vec::new(),
            sync_status: SyncStatus::Pending,
            needs_analysis: false,
        }
    }

    pub fn push_turn(&mut self, role: TurnRole, content: &str) -> Result<()> {
        match &mut self.conversation {
            Sensitive::Plain(turns) => {
                turns.push(ConversationTurn {
                    role,
                    content: content.to_string(),
                });
                self.updated_at_ms = now_ms();
                Ok(())
            }
            Sensitive::Encrypted(_) => Err(anyhow!("cannot append to an encrypted conversation")),
        }
    }
}

/// Immutable once created; removed only by explicit delete. Deleting the
/// parent entry does not cascade here.
#[derive(Clone, Debug)]
pub struct AiInsight {
    pub id: String,
    pub user_id: String,
    pub entry_id: Option<String>,
    pub insight_type: String,
    pub content: Sensitive<String>,
    pub created_at_ms: i64,
    pub sync_status: SyncStatus,
}

impl AiInsight {
    pub fn new(user_id: &str, entry_id: Option<&str>, insight_type: &str, content: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            entry_id: entry_id.map(|v| v.to_string()),
            insight_type: insight_type.to_string(),
            content: Sensitive::Plain(content.to_string()),
            created_at_ms: now_ms(),
            sync_status: SyncStatus::Pending,
        }
    }
}

/// One row per user, overwritten in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    pub timezone: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: String,
    pub reminder_enabled: bool,
    pub reminder_hour: Option<u8>,
    pub theme: String,
    pub updated_at_ms: i64,
}

impl UserPreferences {
    pub fn defaults(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            reminder_enabled: false,
            reminder_hour: None,
            theme: "system".to_string(),
            updated_at_ms: now_ms(),
        }
    }
}

/// The five local collections. `table_name` doubles as the remote
/// collection name on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    JournalEntries,
    AiInsights,
    Profiles,
    UserPreferences,
    QuestionPool,
}

impl Collection {
    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::JournalEntries => "journal_entries",
            Collection::AiInsights => "ai_insights",
            Collection::Profiles => "profiles",
            Collection::UserPreferences => "user_preferences",
            Collection::QuestionPool => "question_pool",
        }
    }
}

pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

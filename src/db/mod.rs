use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::crypto::{decrypt_string, derive_user_key, encrypt_string, AppSecret, KdfParams};
use crate::error::LocalStoreUnavailable;
use crate::model::{
    AiInsight, ConversationTurn, JournalEntry, Profile, Sensitive, SessionType, SyncStatus,
    UserPreferences,
};

/// One record that could not be decrypted during a bulk read. The read
/// itself still succeeds with the remaining records.
#[derive(Debug)]
pub struct ReadFailure {
    pub id: String,
    pub error: anyhow::Error,
}

/// A bulk read that tolerates per-record decryption failures.
#[derive(Debug)]
pub struct DegradedRead<T> {
    pub records: Vec<T>,
    pub failures: Vec<ReadFailure>,
}

/// The process-wide store handle: one sqlite connection per device,
/// opened once and injected into everything that needs it. Also carries
/// the key-derivation inputs so callers never touch raw keys.
pub struct StoreHandle {
    conn: Connection,
    secret: AppSecret,
    kdf_params: KdfParams,
}

fn db_path(app_dir: &Path) -> PathBuf {
    app_dir.join("driftlog.sqlite3")
}

fn store_err(e: rusqlite::Error) -> anyhow::Error {
    LocalStoreUnavailable(e).into()
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(store_err)?;

    let user_version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(store_err)?;

    if user_version < 1 {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS journal_entries (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  session_type TEXT NOT NULL,
  mood_rating INTEGER,
  conversation TEXT NOT NULL,
  entry_text TEXT NOT NULL,
  ai_analysis TEXT,
  tags TEXT NOT NULL,
  sync_status TEXT NOT NULL,
  needs_analysis INTEGER NOT NULL DEFAULT 0,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_journal_entries_user_created
  ON journal_entries(user_id, created_at);

CREATE TABLE IF NOT EXISTS ai_insights (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  entry_id TEXT,
  insight_type TEXT NOT NULL,
  content TEXT NOT NULL,
  sync_status TEXT NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ai_insights_user_created
  ON ai_insights(user_id, created_at);

CREATE TABLE IF NOT EXISTS profiles (
  user_id TEXT PRIMARY KEY,
  display_name TEXT NOT NULL,
  timezone TEXT,
  sync_status TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_preferences (
  user_id TEXT PRIMARY KEY,
  reminder_enabled INTEGER NOT NULL,
  reminder_hour INTEGER,
  theme TEXT NOT NULL,
  sync_status TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS question_pool (
  id TEXT PRIMARY KEY,
  prompt TEXT NOT NULL
);

PRAGMA user_version = 1;
"#,
        )
        .map_err(store_err)?;
    }

    if user_version < 2 {
        // v2: secondary indexes on sync_status so the pending scan is
        // O(pending count). Index-only upgrade; row data is untouched.
        conn.execute_batch(
            r#"
CREATE INDEX IF NOT EXISTS idx_journal_entries_status
  ON journal_entries(sync_status);
CREATE INDEX IF NOT EXISTS idx_ai_insights_status
  ON ai_insights(sync_status);
PRAGMA user_version = 2;
"#,
        )
        .map_err(store_err)?;
    }

    Ok(())
}

impl StoreHandle {
    /// Opens (or creates) the on-device store and runs schema migrations.
    /// Call once at process start and share the handle.
    pub fn open(app_dir: &Path, secret: AppSecret, kdf_params: KdfParams) -> Result<Self> {
        fs::create_dir_all(app_dir)?;
        let conn = Connection::open(db_path(app_dir)).map_err(store_err)?;
        migrate(&conn)?;
        Ok(Self {
            conn,
            secret,
            kdf_params,
        })
    }

    /// Test hook: an in-memory store with the same schema.
    pub fn open_in_memory(secret: AppSecret, kdf_params: KdfParams) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        migrate(&conn)?;
        Ok(Self {
            conn,
            secret,
            kdf_params,
        })
    }

    /// Rederived per operation; key material is never cached.
    fn key_for(&self, user_id: &str) -> Result<[u8; 32]> {
        derive_user_key(&self.secret, user_id, &self.kdf_params)
    }

    // --- journal entries -------------------------------------------------

    /// Encrypts the sensitive fields and upserts the record atomically.
    /// The caller's copy must be plaintext (`Sensitive::Plain`).
    pub fn put_entry(&self, entry: &JournalEntry) -> Result<()> {
        if let Some(mood) = entry.mood_rating {
            if !(1..=10).contains(&mood) {
                return Err(anyhow!("mood rating out of range: {mood}"));
            }
        }

        let key = self.key_for(&entry.user_id)?;
        let turns = entry.conversation.as_plain()?;
        let conversation_json = serde_json::to_string(turns)?;
        let conversation_ct = encrypt_string(
            &key,
            &conversation_json,
            &format!("entry.conversation:{}", entry.id),
        )?;
        let entry_text_ct = encrypt_string(
            &key,
            entry.entry_text.as_plain()?,
            &format!("entry.body:{}", entry.id),
        )?;
        let analysis_ct = match &entry.ai_analysis {
            Some(field) => Some(encrypt_string(
                &key,
                field.as_plain()?,
                &format!("entry.analysis:{}", entry.id),
            )?),
            None => None,
        };
        let tags_json = serde_json::to_string(&entry.tags)?;

        self.conn
            .execute(
                r#"INSERT INTO journal_entries
               (id, user_id, session_type, mood_rating, conversation, entry_text,
                ai_analysis, tags, sync_status, needs_analysis, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
               ON CONFLICT(id) DO UPDATE SET
                 session_type = excluded.session_type,
                 mood_rating = excluded.mood_rating,
                 conversation = excluded.conversation,
                 entry_text = excluded.entry_text,
                 ai_analysis = excluded.ai_analysis,
                 tags = excluded.tags,
                 sync_status = excluded.sync_status,
                 needs_analysis = excluded.needs_analysis,
                 updated_at = excluded.updated_at"#,
                params![
                    entry.id,
                    entry.user_id,
                    entry.session_type.as_str(),
                    entry.mood_rating,
                    conversation_ct,
                    entry_text_ct,
                    analysis_ct,
                    tags_json,
                    entry.sync_status.as_str(),
                    entry.needs_analysis as i64,
                    entry.created_at_ms,
                    entry.updated_at_ms,
                ],
            )
            .map_err(store_err)?;

        Ok(())
    }

    pub fn get_entry(&self, id: &str, user_id: &str) -> Result<Option<JournalEntry>> {
        let row = self
            .conn
            .query_row(
                r#"SELECT id, user_id, session_type, mood_rating, conversation, entry_text,
                      ai_analysis, tags, sync_status, needs_analysis, created_at, updated_at
               FROM journal_entries
               WHERE id = ?1 AND user_id = ?2"#,
                params![id, user_id],
                row_to_raw_entry,
            )
            .optional()
            .map_err(store_err)?;

        let Some(raw) = row else {
            return Ok(None);
        };
        let key = self.key_for(user_id)?;
        decrypt_entry(&key, raw).map(Some)
    }

    /// Every entry for `user_id`, newest first. A record whose ciphertext
    /// cannot be decrypted is dropped and reported; the call succeeds with
    /// the rest (degraded-but-available read).
    pub fn list_entries(&self, user_id: &str) -> Result<DegradedRead<JournalEntry>> {
        let key = self.key_for(user_id)?;

        let mut stmt = self
            .conn
            .prepare(
                r#"SELECT id, user_id, session_type, mood_rating, conversation, entry_text,
                      ai_analysis, tags, sync_status, needs_analysis, created_at, updated_at
               FROM journal_entries
               WHERE user_id = ?1
               ORDER BY created_at DESC"#,
            )
            .map_err(store_err)?;

        let mut rows = stmt.query(params![user_id]).map_err(store_err)?;
        let mut records = Vec::new();
        let mut failures = Vec::new();
        while let Some(row) = rows.next().map_err(store_err)? {
            let raw = row_to_raw_entry(row).map_err(store_err)?;
            let id = raw.id.clone();
            match decrypt_entry(&key, raw) {
                Ok(entry) => records.push(entry),
                Err(error) => {
                    warn!(entry_id = %id, "dropping undecryptable journal entry");
                    failures.push(ReadFailure { id, error });
                }
            }
        }

        Ok(DegradedRead { records, failures })
    }

    /// Physically removes the record. Deleting an absent id is a success.
    pub fn delete_entry(&self, id: &str) -> Result<()> {
        self.conn
            .execute(r#"DELETE FROM journal_entries WHERE id = ?1"#, params![id])
            .map_err(store_err)?;
        Ok(())
    }

    /// Pending records in creation order, via the sync_status index.
    pub fn pending_entries(&self, user_id: &str) -> Result<Vec<JournalEntry>> {
        let key = self.key_for(user_id)?;

        let mut stmt = self
            .conn
            .prepare(
                r#"SELECT id, user_id, session_type, mood_rating, conversation, entry_text,
                      ai_analysis, tags, sync_status, needs_analysis, created_at, updated_at
               FROM journal_entries
               WHERE sync_status = 'pending' AND user_id = ?1
               ORDER BY created_at ASC"#,
            )
            .map_err(store_err)?;

        let mut rows = stmt.query(params![user_id]).map_err(store_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(store_err)? {
            let raw = row_to_raw_entry(row).map_err(store_err)?;
            out.push(decrypt_entry(&key, raw)?);
        }
        Ok(out)
    }

    pub fn set_entry_status(&self, id: &str, status: SyncStatus) -> Result<()> {
        self.conn
            .execute(
                r#"UPDATE journal_entries SET sync_status = ?2 WHERE id = ?1"#,
                params![id, status.as_str()],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn mark_entry_synced(&self, id: &str) -> Result<()> {
        self.set_entry_status(id, SyncStatus::Synced)
    }

    /// Entries parked with the offline-fallback analysis, oldest first.
    pub fn entries_needing_analysis(&self, user_id: &str) -> Result<Vec<JournalEntry>> {
        let key = self.key_for(user_id)?;

        let mut stmt = self
            .conn
            .prepare(
                r#"SELECT id, user_id, session_type, mood_rating, conversation, entry_text,
                      ai_analysis, tags, sync_status, needs_analysis, created_at, updated_at
               FROM journal_entries
               WHERE user_id = ?1 AND needs_analysis = 1
               ORDER BY created_at ASC"#,
            )
            .map_err(store_err)?;

        let mut rows = stmt.query(params![user_id]).map_err(store_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(store_err)? {
            let raw = row_to_raw_entry(row).map_err(store_err)?;
            out.push(decrypt_entry(&key, raw)?);
        }
        Ok(out)
    }

    // --- AI insights -----------------------------------------------------

    pub fn put_insight(&self, insight: &AiInsight) -> Result<()> {
        let key = self.key_for(&insight.user_id)?;
        let content_ct = encrypt_string(
            &key,
            insight.content.as_plain()?,
            &format!("insight.content:{}", insight.id),
        )?;

        self.conn
            .execute(
                r#"INSERT INTO ai_insights
               (id, user_id, entry_id, insight_type, content, sync_status, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(id) DO UPDATE SET
                 content = excluded.content,
                 sync_status = excluded.sync_status"#,
                params![
                    insight.id,
                    insight.user_id,
                    insight.entry_id,
                    insight.insight_type,
                    content_ct,
                    insight.sync_status.as_str(),
                    insight.created_at_ms,
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn get_insight(&self, id: &str, user_id: &str) -> Result<Option<AiInsight>> {
        let row = self
            .conn
            .query_row(
                r#"SELECT id, user_id, entry_id, insight_type, content, sync_status, created_at
               FROM ai_insights
               WHERE id = ?1 AND user_id = ?2"#,
                params![id, user_id],
                row_to_raw_insight,
            )
            .optional()
            .map_err(store_err)?;

        let Some(raw) = row else {
            return Ok(None);
        };
        let key = self.key_for(user_id)?;
        decrypt_insight(&key, raw).map(Some)
    }

    pub fn list_insights(&self, user_id: &str) -> Result<DegradedRead<AiInsight>> {
        let key = self.key_for(user_id)?;

        let mut stmt = self
            .conn
            .prepare(
                r#"SELECT id, user_id, entry_id, insight_type, content, sync_status, created_at
               FROM ai_insights
               WHERE user_id = ?1
               ORDER BY created_at DESC"#,
            )
            .map_err(store_err)?;

        let mut rows = stmt.query(params![user_id]).map_err(store_err)?;
        let mut records = Vec::new();
        let mut failures = Vec::new();
        while let Some(row) = rows.next().map_err(store_err)? {
            let raw = row_to_raw_insight(row).map_err(store_err)?;
            let id = raw.id.clone();
            match decrypt_insight(&key, raw) {
                Ok(insight) => records.push(insight),
                Err(error) => {
                    warn!(insight_id = %id, "dropping undecryptable insight");
                    failures.push(ReadFailure { id, error });
                }
            }
        }

        Ok(DegradedRead { records, failures })
    }

    pub fn pending_insights(&self, user_id: &str) -> Result<Vec<AiInsight>> {
        let key = self.key_for(user_id)?;

        let mut stmt = self
            .conn
            .prepare(
                r#"SELECT id, user_id, entry_id, insight_type, content, sync_status, created_at
               FROM ai_insights
               WHERE sync_status = 'pending' AND user_id = ?1
               ORDER BY created_at ASC"#,
            )
            .map_err(store_err)?;

        let mut rows = stmt.query(params![user_id]).map_err(store_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(store_err)? {
            let raw = row_to_raw_insight(row).map_err(store_err)?;
            out.push(decrypt_insight(&key, raw)?);
        }
        Ok(out)
    }

    pub fn mark_insight_synced(&self, id: &str) -> Result<()> {
        self.conn
            .execute(
                r#"UPDATE ai_insights SET sync_status = 'synced' WHERE id = ?1"#,
                params![id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn delete_insight(&self, id: &str) -> Result<()> {
        self.conn
            .execute(r#"DELETE FROM ai_insights WHERE id = ?1"#, params![id])
            .map_err(store_err)?;
        Ok(())
    }

    // --- profile / preferences ------------------------------------------

    pub fn upsert_profile(&self, profile: &Profile, status: SyncStatus) -> Result<()> {
        self.conn
            .execute(
                r#"INSERT INTO profiles
               (user_id, display_name, timezone, sync_status, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(user_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 timezone = excluded.timezone,
                 sync_status = excluded.sync_status,
                 updated_at = excluded.updated_at"#,
                params![
                    profile.user_id,
                    profile.display_name,
                    profile.timezone,
                    status.as_str(),
                    profile.created_at_ms,
                    profile.updated_at_ms,
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn get_profile(&self, user_id: &str) -> Result<Option<(Profile, SyncStatus)>> {
        self.conn
            .query_row(
                r#"SELECT user_id, display_name, timezone, sync_status, created_at, updated_at
               FROM profiles WHERE user_id = ?1"#,
                params![user_id],
                |row| {
                    Ok((
                        Profile {
                            user_id: row.get(0)?,
                            display_name: row.get(1)?,
                            timezone: row.get(2)?,
                            created_at_ms: row.get(4)?,
                            updated_at_ms: row.get(5)?,
                        },
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(store_err)?
            .map(|(profile, status)| Ok((profile, SyncStatus::parse(&status)?)))
            .transpose()
    }

    pub fn upsert_preferences(&self, prefs: &UserPreferences, status: SyncStatus) -> Result<()> {
        self.conn
            .execute(
                r#"INSERT INTO user_preferences
               (user_id, reminder_enabled, reminder_hour, theme, sync_status, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(user_id) DO UPDATE SET
                 reminder_enabled = excluded.reminder_enabled,
                 reminder_hour = excluded.reminder_hour,
                 theme = excluded.theme,
                 sync_status = excluded.sync_status,
                 updated_at = excluded.updated_at"#,
                params![
                    prefs.user_id,
                    prefs.reminder_enabled as i64,
                    prefs.reminder_hour,
                    prefs.theme,
                    status.as_str(),
                    prefs.updated_at_ms,
                ],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn get_preferences(&self, user_id: &str) -> Result<Option<(UserPreferences, SyncStatus)>> {
        self.conn
            .query_row(
                r#"SELECT user_id, reminder_enabled, reminder_hour, theme, sync_status, updated_at
               FROM user_preferences WHERE user_id = ?1"#,
                params![user_id],
                |row| {
                    Ok((
                        UserPreferences {
                            user_id: row.get(0)?,
                            reminder_enabled: row.get::<_, i64>(1)? != 0,
                            reminder_hour: row.get(2)?,
                            theme: row.get(3)?,
                            updated_at_ms: row.get(5)?,
                        },
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(store_err)?
            .map(|(prefs, status)| Ok((prefs, SyncStatus::parse(&status)?)))
            .transpose()
    }

    pub fn mark_profile_synced(&self, user_id: &str) -> Result<()> {
        self.conn
            .execute(
                r#"UPDATE profiles SET sync_status = 'synced' WHERE user_id = ?1"#,
                params![user_id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    pub fn mark_preferences_synced(&self, user_id: &str) -> Result<()> {
        self.conn
            .execute(
                r#"UPDATE user_preferences SET sync_status = 'synced' WHERE user_id = ?1"#,
                params![user_id],
            )
            .map_err(store_err)?;
        Ok(())
    }

    // --- fallback question pool -----------------------------------------

    /// Seeds the fallback prompts once; a non-empty pool is left alone.
    pub fn seed_question_pool(&self, prompts: &[&str]) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(r#"SELECT COUNT(*) FROM question_pool"#, [], |row| row.get(0))
            .map_err(store_err)?;
        if count > 0 {
            return Ok(0);
        }

        let mut inserted = 0usize;
        for prompt in prompts {
            self.conn
                .execute(
                    r#"INSERT INTO question_pool (id, prompt) VALUES (?1, ?2)"#,
                    params![uuid::Uuid::new_v4().to_string(), prompt],
                )
                .map_err(store_err)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    pub fn question_pool(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(r#"SELECT prompt FROM question_pool ORDER BY prompt ASC"#)
            .map_err(store_err)?;
        let mut rows = stmt.query([]).map_err(store_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(store_err)? {
            out.push(row.get(0).map_err(store_err)?);
        }
        Ok(out)
    }

    /// Test hook: raw ciphertext access for corruption scenarios.
    pub fn raw_entry_ciphertext(&self, id: &str) -> Result<String> {
        self.conn
            .query_row(
                r#"SELECT entry_text FROM journal_entries WHERE id = ?1"#,
                params![id],
                |row| row.get(0),
            )
            .map_err(store_err)
    }

    /// Test hook: overwrite stored ciphertext to simulate corruption.
    pub fn overwrite_entry_ciphertext(&self, id: &str, ciphertext: &str) -> Result<()> {
        self.conn
            .execute(
                r#"UPDATE journal_entries SET entry_text = ?2 WHERE id = ?1"#,
                params![id, ciphertext],
            )
            .map_err(store_err)?;
        Ok(())
    }
}

/// A journal row as stored: sensitive columns still ciphertext.
struct RawEntry {
    id: String,
    user_id: String,
    session_type: String,
    mood_rating: Option<u8>,
    conversation_ct: String,
    entry_text_ct: String,
    analysis_ct: Option<String>,
    tags_json: String,
    sync_status: String,
    needs_analysis: bool,
    created_at_ms: i64,
    updated_at_ms: i64,
}

fn row_to_raw_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_type: row.get(2)?,
        mood_rating: row.get(3)?,
        conversation_ct: row.get(4)?,
        entry_text_ct: row.get(5)?,
        analysis_ct: row.get(6)?,
        tags_json: row.get(7)?,
        sync_status: row.get(8)?,
        needs_analysis: row.get::<_, i64>(9)? != 0,
        created_at_ms: row.get(10)?,
        updated_at_ms: row.get(11)?,
    })
}

fn decrypt_entry(key: &[u8; 32], raw: RawEntry) -> Result<JournalEntry> {
    let conversation_json = decrypt_string(
        key,
        &raw.conversation_ct,
        &format!("entry.conversation:{}", raw.id),
    )?;
    let turns: Vec<ConversationTurn> = serde_json::from_str(&conversation_json)?;

    let entry_text = decrypt_string(key, &raw.entry_text_ct, &format!("entry.body:{}", raw.id))?;

    let ai_analysis = match &raw.analysis_ct {
        Some(ct) => Some(Sensitive::Plain(decrypt_string(
            key,
            ct,
            &format!("entry.analysis:{}", raw.id),
        )?)),
        None => None,
    };

    Ok(JournalEntry {
        session_type: SessionType::parse(&raw.session_type)?,
        sync_status: SyncStatus::parse(&raw.sync_status)?,
        tags: serde_json::from_str(&raw.tags_json)?,
        id: raw.id,
        user_id: raw.user_id,
        created_at_ms: raw.created_at_ms,
        updated_at_ms: raw.updated_at_ms,
        mood_rating: raw.mood_rating,
        conversation: Sensitive::Plain(turns),
        entry_text: Sensitive::Plain(entry_text),
        ai_analysis,
        needs_analysis: raw.needs_analysis,
    })
}

struct RawInsight {
    id: String,
    user_id: String,
    entry_id: Option<String>,
    insight_type: String,
    content_ct: String,
    sync_status: String,
    created_at_ms: i64,
}

fn row_to_raw_insight(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawInsight> {
    Ok(RawInsight {
        id: row.get(0)?,
        user_id: row.get(1)?,
        entry_id: row.get(2)?,
        insight_type: row.get(3)?,
        content_ct: row.get(4)?,
        sync_status: row.get(5)?,
        created_at_ms: row.get(6)?,
    })
}

fn decrypt_insight(key: &[u8; 32], raw: RawInsight) -> Result<AiInsight> {
    let content = decrypt_string(key, &raw.content_ct, &format!("insight.content:{}", raw.id))?;
    Ok(AiInsight {
        sync_status: SyncStatus::parse(&raw.sync_status)?,
        id: raw.id,
        user_id: raw.user_id,
        entry_id: raw.entry_id,
        insight_type: raw.insight_type,
        content: Sensitive::Plain(content),
        created_at_ms: raw.created_at_ms,
    })
}

/// Exercised by the schema-upgrade test: creates a v1 layout (without the
/// status indexes) so a later `open` can prove the non-destructive v2 step.
pub fn open_at_version_1(app_dir: &Path) -> Result<()> {
    fs::create_dir_all(app_dir)?;
    let conn = Connection::open(db_path(app_dir)).map_err(store_err)?;
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS journal_entries (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  session_type TEXT NOT NULL,
  mood_rating INTEGER,
  conversation TEXT NOT NULL,
  entry_text TEXT NOT NULL,
  ai_analysis TEXT,
  tags TEXT NOT NULL,
  sync_status TEXT NOT NULL,
  needs_analysis INTEGER NOT NULL DEFAULT 0,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_journal_entries_user_created
  ON journal_entries(user_id, created_at);

CREATE TABLE IF NOT EXISTS ai_insights (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  entry_id TEXT,
  insight_type TEXT NOT NULL,
  content TEXT NOT NULL,
  sync_status TEXT NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ai_insights_user_created
  ON ai_insights(user_id, created_at);

CREATE TABLE IF NOT EXISTS profiles (
  user_id TEXT PRIMARY KEY,
  display_name TEXT NOT NULL,
  timezone TEXT,
  sync_status TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_preferences (
  user_id TEXT PRIMARY KEY,
  reminder_enabled INTEGER NOT NULL,
  reminder_hour INTEGER,
  theme TEXT NOT NULL,
  sync_status TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS question_pool (
  id TEXT PRIMARY KEY,
  prompt TEXT NOT NULL
);

PRAGMA user_version = 1;
"#,
    )
    .map_err(store_err)?;
    Ok(())
}

/// Test hook: does the named index exist?
pub fn index_exists(store: &StoreHandle, name: &str) -> Result<bool> {
    let found: Option<String> = store
        .conn
        .query_row(
            r#"SELECT name FROM sqlite_master WHERE type = 'index' AND name = ?1"#,
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(store_err)?;
    Ok(found.is_some())
}

/// Record store for users and conversations
///
/// The engine only ever reads through [`RecordSource`]. Two sources exist: an
/// in-memory [`Snapshot`] loaded from a JSON export of the document store,
/// and [`MetricsDb`], a SQLite mirror of the same records.
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{Conversation, ConversationMetadata, Preferences, Profile, Region, Theme, User};
use crate::window::TimeWindow;

/// Read-only access to the records behind a report
pub trait RecordSource: Send + Sync {
    /// All users, deleted ones included
    fn load_users(&self) -> Result<Vec<User>>;

    /// Non-archived conversations with `updatedAt` inside the window
    fn load_conversations(&self, window: &TimeWindow) -> Result<Vec<Conversation>>;
}

/// Export of users and conversations
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

impl Snapshot {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot file: {}", path.display()))?;

        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON from: {}", path.display()))?;

        Ok(snapshot)
    }
}

impl RecordSource for Snapshot {
    fn load_users(&self) -> Result<Vec<User>> {
        Ok(self.users.clone())
    }

    fn load_conversations(&self, window: &TimeWindow) -> Result<Vec<Conversation>> {
        Ok(self
            .conversations
            .iter()
            .filter(|c| !c.metadata.is_archived && window.contains(c.updated_at))
            .cloned()
            .collect())
    }
}

/// SQLite mirror of the user and conversation collections
///
/// Messages stay embedded: each conversation row carries its ordered message
/// array as JSON.
pub struct MetricsDb {
    path: PathBuf,
}

impl MetricsDb {
    /// Initialize or open the database, creating the schema if needed
    pub fn init(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT NOT NULL PRIMARY KEY,
                created_at INTEGER NOT NULL,
                last_login INTEGER,
                theme TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                primary_jurisdiction TEXT
            );
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT NOT NULL PRIMARY KEY,
                user_id TEXT NOT NULL,
                region TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                is_archived INTEGER NOT NULL DEFAULT 0,
                messages TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_users_created_at ON users(created_at);
            CREATE INDEX IF NOT EXISTS idx_users_last_login ON users(last_login);
            CREATE INDEX IF NOT EXISTS idx_conversations_updated_at ON conversations(updated_at);",
        )
        .context("Failed to create metrics schema")?;

        Ok(Self {
            path: db_path.to_path_buf(),
        })
    }

    /// Open an existing database for reading only
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            anyhow::bail!("Database not found: {}", db_path.display());
        }
        Ok(Self {
            path: db_path.to_path_buf(),
        })
    }

    fn read_connection(&self) -> Result<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open database at {}", self.path.display()))
    }

    /// Upsert every record of a snapshot. Returns (users, conversations) written.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> Result<(usize, usize)> {
        let mut conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to open database at {}", self.path.display()))?;
        let tx = conn.transaction()?;

        for user in &snapshot.users {
            let theme = match user.preferences.theme {
                Theme::Dark => Some("dark"),
                Theme::Light => Some("light"),
                Theme::Unset => None,
            };
            tx.execute(
                "INSERT INTO users (id, created_at, last_login, theme, is_deleted, primary_jurisdiction)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    created_at = excluded.created_at,
                    last_login = excluded.last_login,
                    theme = excluded.theme,
                    is_deleted = excluded.is_deleted,
                    primary_jurisdiction = excluded.primary_jurisdiction",
                params![
                    user.id,
                    user.created_at.timestamp_millis(),
                    user.last_login.map(|ts| ts.timestamp_millis()),
                    theme,
                    user.is_deleted,
                    user.profile.primary_jurisdiction,
                ],
            )
            .with_context(|| format!("Failed to import user {}", user.id))?;
        }

        for conversation in &snapshot.conversations {
            let messages = serde_json::to_string(&conversation.messages)
                .with_context(|| format!("Failed to encode messages of {}", conversation.id))?;
            tx.execute(
                "INSERT INTO conversations (id, user_id, region, created_at, updated_at, is_archived, messages)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    region = excluded.region,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    is_archived = excluded.is_archived,
                    messages = excluded.messages",
                params![
                    conversation.id,
                    conversation.user_id,
                    conversation.region.as_str(),
                    conversation.created_at.timestamp_millis(),
                    conversation.updated_at.timestamp_millis(),
                    conversation.metadata.is_archived,
                    messages,
                ],
            )
            .with_context(|| format!("Failed to import conversation {}", conversation.id))?;
        }

        tx.commit().context("Failed to commit snapshot import")?;
        Ok((snapshot.users.len(), snapshot.conversations.len()))
    }
}

impl RecordSource for MetricsDb {
    fn load_users(&self) -> Result<Vec<User>> {
        let conn = self.read_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, last_login, theme, is_deleted, primary_jurisdiction FROM users",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read users")?;

        rows.into_iter()
            .map(|(id, created_at, last_login, theme, is_deleted, jurisdiction)| {
                Ok(User {
                    created_at: from_millis(created_at)
                        .with_context(|| format!("User {} has an invalid created_at", id))?,
                    last_login: last_login.and_then(from_millis),
                    preferences: Preferences {
                        theme: Theme::from(theme),
                    },
                    is_deleted,
                    profile: Profile {
                        primary_jurisdiction: jurisdiction,
                    },
                    id,
                })
            })
            .collect()
    }

    fn load_conversations(&self, window: &TimeWindow) -> Result<Vec<Conversation>> {
        let conn = self.read_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, region, created_at, updated_at, messages
             FROM conversations
             WHERE is_archived = 0 AND updated_at BETWEEN ?1 AND ?2
             ORDER BY updated_at, id",
        )?;

        let rows = stmt
            .query_map(
                params![window.start.timestamp_millis(), window.end.timestamp_millis()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read conversations")?;

        rows.into_iter()
            .map(|(id, user_id, region, created_at, updated_at, messages)| {
                let messages = serde_json::from_str(&messages)
                    .with_context(|| format!("Conversation {} has malformed messages", id))?;
                Ok(Conversation {
                    user_id,
                    region: Region::from(Some(region)),
                    created_at: from_millis(created_at)
                        .with_context(|| format!("Conversation {} has an invalid created_at", id))?,
                    updated_at: from_millis(updated_at)
                        .with_context(|| format!("Conversation {} has an invalid updated_at", id))?,
                    metadata: ConversationMetadata { is_archived: false },
                    messages,
                    id,
                })
            })
            .collect()
    }
}

fn from_millis(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ts).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::RangeKind;
    use serde_json::json;

    fn snapshot() -> Snapshot {
        serde_json::from_value(json!({
            "users": [
                {
                    "_id": "u1",
                    "createdAt": "2025-01-02T08:00:00Z",
                    "lastLogin": "2025-01-20T08:00:00Z",
                    "preferences": { "theme": "dark" },
                    "profile": { "primaryJurisdiction": "Dubai" }
                },
                {
                    "_id": "u2",
                    "createdAt": "2024-12-01T08:00:00Z",
                    "isDeleted": true
                }
            ],
            "conversations": [
                {
                    "_id": "c1",
                    "userId": "u1",
                    "region": "Dubai",
                    "createdAt": "2025-01-10T08:00:00Z",
                    "updatedAt": "2025-01-10T08:30:00Z",
                    "messages": [
                        { "role": "user", "content": "Fire exit width?", "timestamp": "2025-01-10T08:00:00Z" },
                        { "role": "assistant", "content": "At least 1.1 m.", "timestamp": "2025-01-10T08:00:05Z",
                          "regulation": { "confidence": 0.9, "processingTime": 2.5, "query_type": "building_codes" },
                          "feedback": { "userVote": "helpful" } }
                    ]
                },
                {
                    "_id": "c2",
                    "userId": "u1",
                    "region": "Dubai",
                    "createdAt": "2025-01-11T08:00:00Z",
                    "updatedAt": "2025-01-11T08:30:00Z",
                    "metadata": { "isArchived": true },
                    "messages": []
                },
                {
                    "_id": "c3",
                    "userId": "u1",
                    "region": "India",
                    "createdAt": "2024-11-11T08:00:00Z",
                    "updatedAt": "2024-11-11T08:30:00Z",
                    "messages": []
                }
            ]
        }))
        .unwrap()
    }

    fn january() -> TimeWindow {
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        TimeWindow::resolve(RangeKind::Custom, Some("2025-01-01"), Some("2025-01-31"), now)
            .unwrap()
    }

    #[test]
    fn test_snapshot_filters_archived_and_out_of_window() {
        let conversations = snapshot().load_conversations(&january()).unwrap();
        let ids: Vec<&str> = conversations.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1"]);
    }

    #[test]
    fn test_db_import_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let db = MetricsDb::init(&dir.path().join("metrics.sqlite")).unwrap();

        let (users, conversations) = db.import_snapshot(&snapshot()).unwrap();
        assert_eq!((users, conversations), (2, 3));

        let users = db.load_users().unwrap();
        assert_eq!(users.len(), 2);
        let u1 = users.iter().find(|u| u.id == "u1").unwrap();
        assert_eq!(u1.preferences.theme, Theme::Dark);
        assert_eq!(u1.profile.primary_jurisdiction.as_deref(), Some("Dubai"));
        assert!(users.iter().any(|u| u.id == "u2" && u.is_deleted));

        let conversations = db.load_conversations(&january()).unwrap();
        assert_eq!(conversations.len(), 1);
        let c1 = &conversations[0];
        assert_eq!(c1.region, Region::Dubai);
        assert_eq!(c1.messages.len(), 2);
        let regulation = c1.messages[1].assistant_regulation().unwrap();
        assert_eq!(regulation.confidence, Some(0.9));
    }

    #[test]
    fn test_db_import_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = MetricsDb::init(&dir.path().join("metrics.sqlite")).unwrap();
        db.import_snapshot(&snapshot()).unwrap();
        db.import_snapshot(&snapshot()).unwrap();
        assert_eq!(db.load_users().unwrap().len(), 2);
    }

    #[test]
    fn test_open_missing_db_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MetricsDb::open(&dir.path().join("absent.sqlite")).is_err());
    }
}

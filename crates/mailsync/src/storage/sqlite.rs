//! SQLite-based storage for accounts, messages, analysis, and audit logs

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::MailStore;
use crate::models::{
    AccountId, ActionItem, ActionStatus, AnalysisResult, EmailAddress, MailboxAccount, Message,
    MessageId, NotificationDisposition, NotificationLogEntry, SequencePosition,
    SyncAttemptOutcome, SyncLogEntry,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Connected mailbox accounts, one row each
            CREATE TABLE accounts (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                email_address TEXT NOT NULL UNIQUE,
                last_sequence TEXT,
                needs_full_resync INTEGER NOT NULL DEFAULT 0,
                lock_expires_at TEXT,
                last_synced_at TEXT,
                sync_enabled INTEGER NOT NULL DEFAULT 1
            );

            -- Synced messages; provider ids are unique per account
            CREATE TABLE messages (
                account_id TEXT NOT NULL,
                id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                from_name TEXT,
                from_email TEXT NOT NULL,
                to_json TEXT NOT NULL DEFAULT '[]',
                subject TEXT NOT NULL,
                snippet TEXT NOT NULL,
                body TEXT,
                received_at TEXT NOT NULL,
                label_ids TEXT NOT NULL DEFAULT '[]',
                category TEXT,
                client_id TEXT,
                analyzed_at TEXT,
                PRIMARY KEY (account_id, id),
                FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_messages_received_at
                ON messages(account_id, received_at DESC);

            -- One analysis row per message, overwritten on re-analysis
            CREATE TABLE analysis_results (
                message_id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                category TEXT,
                category_confidence REAL,
                action_kind TEXT,
                action_title TEXT,
                action_urgency REAL,
                action_due_date TEXT,
                action_actionable INTEGER,
                client_id TEXT,
                client_confidence REAL,
                task_errors TEXT NOT NULL DEFAULT '[]',
                total_cost_units INTEGER NOT NULL DEFAULT 0,
                total_duration_ms INTEGER NOT NULL DEFAULT 0,
                analyzer_version TEXT NOT NULL,
                analyzed_at TEXT NOT NULL
            );

            CREATE TABLE action_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                urgency REAL NOT NULL,
                due_date TEXT,
                status TEXT NOT NULL DEFAULT 'open'
            );

            CREATE INDEX idx_action_items_message ON action_items(message_id);

            -- Append-only audit trails
            CREATE TABLE sync_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                messages_ingested INTEGER NOT NULL DEFAULT 0,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                detail TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX idx_sync_log_account ON sync_log(account_id);

            CREATE TABLE notification_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                delivery_id TEXT,
                email_address TEXT,
                claimed_sequence TEXT,
                disposition TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        ),
    ])
}

/// SQLite-backed implementation of MailStore
///
/// A single connection behind a mutex; the lock acquire path relies on the
/// conditional UPDATE being one statement.
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
}

impl SqliteMailStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL for concurrent readers, NORMAL sync is safe with WAL,
        // foreign_keys required for ON DELETE CASCADE
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp in database: {}", s))
}

fn parse_optional_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_timestamp).transpose()
}

impl MailStore for SqliteMailStore {
    fn upsert_account(&self, account: MailboxAccount) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO accounts
                (id, owner_id, email_address, last_sequence, needs_full_resync,
                 lock_expires_at, last_synced_at, sync_enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                email_address = excluded.email_address,
                last_sequence = excluded.last_sequence,
                needs_full_resync = excluded.needs_full_resync,
                lock_expires_at = excluded.lock_expires_at,
                last_synced_at = excluded.last_synced_at,
                sync_enabled = excluded.sync_enabled",
            params![
                account.id.as_str(),
                account.owner_id,
                account.email_address,
                account.last_sequence.as_ref().map(|s| s.as_str()),
                account.needs_full_resync,
                account.lock_expires_at.map(|t| t.to_rfc3339()),
                account.last_synced_at.map(|t| t.to_rfc3339()),
                account.sync_enabled,
            ],
        )?;
        Ok(())
    }

    fn get_account(&self, id: &AccountId) -> Result<Option<MailboxAccount>> {
        let conn = self.conn.lock().unwrap();
        load_account(&conn, "id", id.as_str())
    }

    fn get_account_by_address(&self, email_address: &str) -> Result<Option<MailboxAccount>> {
        let conn = self.conn.lock().unwrap();
        load_account(&conn, "email_address", email_address)
    }

    fn set_needs_full_resync(&self, id: &AccountId, needs: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE accounts SET needs_full_resync = ?1 WHERE id = ?2",
            params![needs, id.as_str()],
        )?;
        Ok(())
    }

    fn complete_sync(
        &self,
        id: &AccountId,
        sequence: &SequencePosition,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE accounts SET last_sequence = ?1, last_synced_at = ?2 WHERE id = ?3",
            params![sequence.as_str(), at.to_rfc3339(), id.as_str()],
        )?;
        Ok(())
    }

    fn try_acquire_sync_lock(
        &self,
        id: &AccountId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        // Conditional update: succeeds only when no live lock exists.
        // RFC3339 UTC strings compare correctly as text.
        let updated = conn.execute(
            "UPDATE accounts SET lock_expires_at = ?1
             WHERE id = ?2
               AND (lock_expires_at IS NULL OR lock_expires_at <= ?3)",
            params![(now + ttl).to_rfc3339(), id.as_str(), now.to_rfc3339()],
        )?;
        Ok(updated > 0)
    }

    fn release_sync_lock(&self, id: &AccountId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE accounts SET lock_expires_at = NULL WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(())
    }

    fn insert_message(&self, message: Message) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let to_json = serde_json::to_string(&message.to)?;
        let labels_json = serde_json::to_string(&message.label_ids)?;

        let inserted = conn.execute(
            "INSERT INTO messages
                (account_id, id, owner_id, from_name, from_email, to_json, subject,
                 snippet, body, received_at, label_ids, category, client_id, analyzed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(account_id, id) DO NOTHING",
            params![
                message.account_id.as_str(),
                message.id.as_str(),
                message.owner_id,
                message.from.name,
                message.from.email,
                to_json,
                message.subject,
                message.snippet,
                message.body,
                message.received_at.to_rfc3339(),
                labels_json,
                message.category,
                message.client_id,
                message.analyzed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn has_message(&self, account_id: &AccountId, id: &MessageId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM messages WHERE account_id = ?1 AND id = ?2",
                params![account_id.as_str(), id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_message(&self, account_id: &AccountId, id: &MessageId) -> Result<Option<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT account_id, id, owner_id, from_name, from_email, to_json, subject,
                    snippet, body, received_at, label_ids, category, client_id, analyzed_at
             FROM messages WHERE account_id = ?1 AND id = ?2",
        )?;

        let row = stmt
            .query_row(params![account_id.as_str(), id.as_str()], row_to_raw_message)
            .optional()?;

        row.map(raw_to_message).transpose()
    }

    fn filter_unknown_ids(
        &self,
        account_id: &AccountId,
        ids: &[MessageId],
    ) -> Result<Vec<MessageId>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT 1 FROM messages WHERE account_id = ?1 AND id = ?2")?;

        let mut unknown = Vec::new();
        for id in ids {
            let found: Option<i64> = stmt
                .query_row(params![account_id.as_str(), id.as_str()], |row| row.get(0))
                .optional()?;
            if found.is_none() {
                unknown.push(id.clone());
            }
        }
        Ok(unknown)
    }

    fn count_messages(&self, account_id: &AccountId) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE account_id = ?1",
            params![account_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn set_message_category(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        category: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET category = ?1 WHERE account_id = ?2 AND id = ?3",
            params![category, account_id.as_str(), id.as_str()],
        )?;
        Ok(())
    }

    fn link_message_client(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        client_id: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET client_id = ?1 WHERE account_id = ?2 AND id = ?3",
            params![client_id, account_id.as_str(), id.as_str()],
        )?;
        Ok(())
    }

    fn mark_message_analyzed(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET analyzed_at = ?1 WHERE account_id = ?2 AND id = ?3",
            params![at.to_rfc3339(), account_id.as_str(), id.as_str()],
        )?;
        Ok(())
    }

    fn upsert_analysis_result(&self, result: AnalysisResult) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let task_errors = serde_json::to_string(&result.task_errors)?;

        conn.execute(
            "INSERT INTO analysis_results
                (message_id, owner_id, category, category_confidence,
                 action_kind, action_title, action_urgency, action_due_date,
                 action_actionable, client_id, client_confidence, task_errors,
                 total_cost_units, total_duration_ms, analyzer_version, analyzed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(message_id) DO UPDATE SET
                owner_id = excluded.owner_id,
                category = excluded.category,
                category_confidence = excluded.category_confidence,
                action_kind = excluded.action_kind,
                action_title = excluded.action_title,
                action_urgency = excluded.action_urgency,
                action_due_date = excluded.action_due_date,
                action_actionable = excluded.action_actionable,
                client_id = excluded.client_id,
                client_confidence = excluded.client_confidence,
                task_errors = excluded.task_errors,
                total_cost_units = excluded.total_cost_units,
                total_duration_ms = excluded.total_duration_ms,
                analyzer_version = excluded.analyzer_version,
                analyzed_at = excluded.analyzed_at",
            params![
                result.message_id.as_str(),
                result.owner_id,
                result.category.as_ref().map(|c| c.category.clone()),
                result.category.as_ref().map(|c| c.confidence as f64),
                result.action.as_ref().map(|a| a.kind.clone()),
                result.action.as_ref().map(|a| a.title.clone()),
                result.action.as_ref().map(|a| a.urgency as f64),
                result
                    .action
                    .as_ref()
                    .and_then(|a| a.due_date.map(|d| d.to_rfc3339())),
                result.action.as_ref().map(|a| a.actionable),
                result.client_match.as_ref().map(|c| c.client_id.clone()),
                result.client_match.as_ref().map(|c| c.confidence as f64),
                task_errors,
                result.total_cost_units as i64,
                result.total_duration_ms as i64,
                result.analyzer_version,
                result.analyzed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_analysis_result(&self, message_id: &MessageId) -> Result<Option<AnalysisResult>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT message_id, owner_id, category, category_confidence,
                    action_kind, action_title, action_urgency, action_due_date,
                    action_actionable, client_id, client_confidence, task_errors,
                    total_cost_units, total_duration_ms, analyzer_version, analyzed_at
             FROM analysis_results WHERE message_id = ?1",
        )?;

        let row = stmt
            .query_row(params![message_id.as_str()], row_to_raw_analysis)
            .optional()?;

        row.map(raw_to_analysis).transpose()
    }

    fn insert_action_item(&self, item: ActionItem) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO action_items
                (message_id, owner_id, kind, title, urgency, due_date, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                item.message_id.as_str(),
                item.owner_id,
                item.kind,
                item.title,
                item.urgency as f64,
                item.due_date.map(|d| d.to_rfc3339()),
                item.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn list_action_items(&self, message_id: &MessageId) -> Result<Vec<ActionItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT message_id, owner_id, kind, title, urgency, due_date, status
             FROM action_items WHERE message_id = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![message_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(message_id, owner_id, kind, title, urgency, due_date, status)| {
                Ok(ActionItem {
                    message_id: MessageId::new(message_id),
                    owner_id,
                    kind,
                    title,
                    urgency: urgency as f32,
                    due_date: parse_optional_timestamp(due_date)?,
                    status: ActionStatus::parse(&status),
                })
            })
            .collect()
    }

    fn append_sync_log(&self, entry: SyncLogEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sync_log
                (account_id, outcome, messages_ingested, duration_ms, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.account_id.as_str(),
                entry.outcome.as_str(),
                entry.messages_ingested as i64,
                entry.duration_ms as i64,
                entry.detail,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn append_notification_log(&self, entry: NotificationLogEntry) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO notification_log
                (delivery_id, email_address, claimed_sequence, disposition, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.delivery_id,
                entry.email_address,
                entry.claimed_sequence.as_ref().map(|s| s.as_str()),
                entry.disposition.as_str(),
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_sync_logs(&self, account_id: &AccountId) -> Result<Vec<SyncLogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT account_id, outcome, messages_ingested, duration_ms, detail, created_at
             FROM sync_log WHERE account_id = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![account_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(account_id, outcome, messages_ingested, duration_ms, detail, created_at)| {
                    Ok(SyncLogEntry {
                        account_id: AccountId::new(account_id),
                        outcome: SyncAttemptOutcome::parse(&outcome),
                        messages_ingested: messages_ingested as usize,
                        duration_ms: duration_ms as u64,
                        detail,
                        created_at: parse_timestamp(&created_at)?,
                    })
                },
            )
            .collect()
    }

    fn list_notification_logs(&self) -> Result<Vec<NotificationLogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT delivery_id, email_address, claimed_sequence, disposition, created_at
             FROM notification_log ORDER BY id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(delivery_id, email_address, claimed_sequence, disposition, created_at)| {
                    Ok(NotificationLogEntry {
                        delivery_id,
                        email_address,
                        claimed_sequence: claimed_sequence.map(SequencePosition::new),
                        disposition: NotificationDisposition::parse(&disposition),
                        created_at: parse_timestamp(&created_at)?,
                    })
                },
            )
            .collect()
    }
}

fn load_account(conn: &Connection, column: &str, value: &str) -> Result<Option<MailboxAccount>> {
    // `column` comes from a fixed set of callers, never user input
    let sql = format!(
        "SELECT id, owner_id, email_address, last_sequence, needs_full_resync,
                lock_expires_at, last_synced_at, sync_enabled
         FROM accounts WHERE {} = ?1",
        column
    );

    let row = conn
        .query_row(&sql, params![value], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, bool>(7)?,
            ))
        })
        .optional()?;

    row.map(
        |(
            id,
            owner_id,
            email_address,
            last_sequence,
            needs_full_resync,
            lock_expires_at,
            last_synced_at,
            sync_enabled,
        )| {
            Ok(MailboxAccount {
                id: AccountId::new(id),
                owner_id,
                email_address,
                last_sequence: last_sequence.map(SequencePosition::new),
                needs_full_resync,
                lock_expires_at: parse_optional_timestamp(lock_expires_at)?,
                last_synced_at: parse_optional_timestamp(last_synced_at)?,
                sync_enabled,
            })
        },
    )
    .transpose()
}

type RawMessageRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn row_to_raw_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMessageRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
    ))
}

fn raw_to_message(raw: RawMessageRow) -> Result<Message> {
    let (
        account_id,
        id,
        owner_id,
        from_name,
        from_email,
        to_json,
        subject,
        snippet,
        body,
        received_at,
        label_ids,
        category,
        client_id,
        analyzed_at,
    ) = raw;

    Ok(Message {
        id: MessageId::new(id),
        account_id: AccountId::new(account_id),
        owner_id,
        from: EmailAddress {
            name: from_name,
            email: from_email,
        },
        to: serde_json::from_str(&to_json)?,
        subject,
        snippet,
        body,
        received_at: parse_timestamp(&received_at)?,
        label_ids: serde_json::from_str(&label_ids)?,
        category,
        client_id,
        analyzed_at: parse_optional_timestamp(analyzed_at)?,
    })
}

type RawAnalysisRow = (
    String,
    String,
    Option<String>,
    Option<f64>,
    Option<String>,
    Option<String>,
    Option<f64>,
    Option<String>,
    Option<bool>,
    Option<String>,
    Option<f64>,
    String,
    i64,
    i64,
    String,
    String,
);

fn row_to_raw_analysis(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAnalysisRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
        row.get(15)?,
    ))
}

fn raw_to_analysis(raw: RawAnalysisRow) -> Result<AnalysisResult> {
    use crate::models::{ActionFinding, CategoryFinding, ClientFinding};

    let (
        message_id,
        owner_id,
        category,
        category_confidence,
        action_kind,
        action_title,
        action_urgency,
        action_due_date,
        action_actionable,
        client_id,
        client_confidence,
        task_errors,
        total_cost_units,
        total_duration_ms,
        analyzer_version,
        analyzed_at,
    ) = raw;

    let category = match (category, category_confidence) {
        (Some(category), Some(confidence)) => Some(CategoryFinding {
            category,
            confidence: confidence as f32,
        }),
        _ => None,
    };

    let action = match (action_kind, action_title) {
        (Some(kind), Some(title)) => Some(ActionFinding {
            kind,
            title,
            urgency: action_urgency.unwrap_or(0.0) as f32,
            due_date: parse_optional_timestamp(action_due_date)?,
            actionable: action_actionable.unwrap_or(false),
        }),
        _ => None,
    };

    let client_match = match (client_id, client_confidence) {
        (Some(client_id), Some(confidence)) => Some(ClientFinding {
            client_id,
            confidence: confidence as f32,
        }),
        _ => None,
    };

    Ok(AnalysisResult {
        message_id: MessageId::new(message_id),
        owner_id,
        category,
        action,
        client_match,
        task_errors: serde_json::from_str(&task_errors)?,
        total_cost_units: total_cost_units as u64,
        total_duration_ms: total_duration_ms as u64,
        analyzer_version,
        analyzed_at: parse_timestamp(&analyzed_at)?,
    })
}

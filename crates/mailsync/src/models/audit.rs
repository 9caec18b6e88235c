//! Append-only audit records for sync attempts and push notifications

use super::{AccountId, SequencePosition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a sync attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAttemptOutcome {
    Completed,
    EscalatedToFullResync,
    Skipped,
    Failed,
}

impl SyncAttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAttemptOutcome::Completed => "completed",
            SyncAttemptOutcome::EscalatedToFullResync => "escalated_to_full_resync",
            SyncAttemptOutcome::Skipped => "skipped",
            SyncAttemptOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => SyncAttemptOutcome::Completed,
            "escalated_to_full_resync" => SyncAttemptOutcome::EscalatedToFullResync,
            "failed" => SyncAttemptOutcome::Failed,
            _ => SyncAttemptOutcome::Skipped,
        }
    }
}

/// One record per sync attempt, including skips
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub account_id: AccountId,
    pub outcome: SyncAttemptOutcome,
    pub messages_ingested: usize,
    pub duration_ms: u64,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What the receiver decided to do with a push delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationDisposition {
    Enqueued,
    Stale,
    UnknownAccount,
    SyncDisabled,
    Malformed,
    QueueFull,
    /// The account lookup itself failed; the delivery was acked regardless
    LookupFailed,
}

impl NotificationDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationDisposition::Enqueued => "enqueued",
            NotificationDisposition::Stale => "stale",
            NotificationDisposition::UnknownAccount => "unknown_account",
            NotificationDisposition::SyncDisabled => "sync_disabled",
            NotificationDisposition::Malformed => "malformed",
            NotificationDisposition::QueueFull => "queue_full",
            NotificationDisposition::LookupFailed => "lookup_failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "enqueued" => NotificationDisposition::Enqueued,
            "stale" => NotificationDisposition::Stale,
            "unknown_account" => NotificationDisposition::UnknownAccount,
            "sync_disabled" => NotificationDisposition::SyncDisabled,
            "queue_full" => NotificationDisposition::QueueFull,
            "lookup_failed" => NotificationDisposition::LookupFailed,
            _ => NotificationDisposition::Malformed,
        }
    }
}

/// One record per push delivery, whatever the receiver decided
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLogEntry {
    /// Transport delivery id when the envelope carried one
    pub delivery_id: Option<String>,
    pub email_address: Option<String>,
    pub claimed_sequence: Option<SequencePosition>,
    pub disposition: NotificationDisposition,
    pub created_at: DateTime<Utc>,
}

//! Storage trait for the sync and analysis pipeline

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::models::{
    AccountId, ActionItem, AnalysisResult, MailboxAccount, Message, MessageId,
    NotificationLogEntry, SequencePosition, SyncLogEntry,
};

/// Persistence operations used across the pipeline.
///
/// Implementations must be safe to share across worker threads. Writes that
/// back sync correctness (`insert_message`, `try_acquire_sync_lock`) must be
/// atomic per call.
pub trait MailStore: Send + Sync {
    // === Accounts ===

    fn upsert_account(&self, account: MailboxAccount) -> Result<()>;

    fn get_account(&self, id: &AccountId) -> Result<Option<MailboxAccount>>;

    /// Lookup by mailbox address, used when resolving push notifications
    fn get_account_by_address(&self, email_address: &str) -> Result<Option<MailboxAccount>>;

    fn set_needs_full_resync(&self, id: &AccountId, needs: bool) -> Result<()>;

    /// Record a finished sync: advance the sequence position and stamp
    /// `last_synced_at`. Called only after new messages are persisted.
    fn complete_sync(
        &self,
        id: &AccountId,
        sequence: &SequencePosition,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Take the account's sync lock if it is free or expired at `now`.
    /// Returns false when another holder's lock is still live.
    fn try_acquire_sync_lock(
        &self,
        id: &AccountId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool>;

    fn release_sync_lock(&self, id: &AccountId) -> Result<()>;

    // === Messages ===

    /// Insert a message; returns false when it already exists (a no-op, not
    /// an error, so re-delivered changes are absorbed)
    fn insert_message(&self, message: Message) -> Result<bool>;

    fn has_message(&self, account_id: &AccountId, id: &MessageId) -> Result<bool>;

    fn get_message(&self, account_id: &AccountId, id: &MessageId) -> Result<Option<Message>>;

    /// Subset of `ids` not yet stored for this account, input order kept
    fn filter_unknown_ids(
        &self,
        account_id: &AccountId,
        ids: &[MessageId],
    ) -> Result<Vec<MessageId>>;

    fn count_messages(&self, account_id: &AccountId) -> Result<usize>;

    fn set_message_category(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        category: &str,
    ) -> Result<()>;

    fn link_message_client(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        client_id: &str,
    ) -> Result<()>;

    fn mark_message_analyzed(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        at: DateTime<Utc>,
    ) -> Result<()>;

    // === Analysis ===

    /// Idempotent: re-analysis of the same message overwrites the prior row
    fn upsert_analysis_result(&self, result: AnalysisResult) -> Result<()>;

    fn get_analysis_result(&self, message_id: &MessageId) -> Result<Option<AnalysisResult>>;

    fn insert_action_item(&self, item: ActionItem) -> Result<()>;

    fn list_action_items(&self, message_id: &MessageId) -> Result<Vec<ActionItem>>;

    // === Audit ===

    fn append_sync_log(&self, entry: SyncLogEntry) -> Result<()>;

    fn append_notification_log(&self, entry: NotificationLogEntry) -> Result<()>;

    fn list_sync_logs(&self, account_id: &AccountId) -> Result<Vec<SyncLogEntry>>;

    fn list_notification_logs(&self) -> Result<Vec<NotificationLogEntry>>;
}

//! Store wrapper that fails selected operations, for failure-path tests

use anyhow::{Result, bail};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use super::{InMemoryMailStore, MailStore};
use crate::models::{
    AccountId, ActionItem, AnalysisResult, MailboxAccount, Message, MessageId,
    NotificationLogEntry, SequencePosition, SyncLogEntry,
};

/// Delegates to an in-memory store, erroring on operations named in `failing`
pub struct FlakyMailStore {
    inner: InMemoryMailStore,
    failing: Mutex<HashSet<&'static str>>,
}

impl FlakyMailStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryMailStore::new(),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every subsequent call to `op` fail
    pub fn fail_on(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Stop failing anything
    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn check(&self, op: &'static str) -> Result<()> {
        if self.failing.lock().unwrap().contains(op) {
            bail!("datastore unavailable during {}", op);
        }
        Ok(())
    }
}

impl MailStore for FlakyMailStore {
    fn upsert_account(&self, account: MailboxAccount) -> Result<()> {
        self.check("upsert_account")?;
        self.inner.upsert_account(account)
    }

    fn get_account(&self, id: &AccountId) -> Result<Option<MailboxAccount>> {
        self.check("get_account")?;
        self.inner.get_account(id)
    }

    fn get_account_by_address(&self, email_address: &str) -> Result<Option<MailboxAccount>> {
        self.check("get_account_by_address")?;
        self.inner.get_account_by_address(email_address)
    }

    fn set_needs_full_resync(&self, id: &AccountId, needs: bool) -> Result<()> {
        self.check("set_needs_full_resync")?;
        self.inner.set_needs_full_resync(id, needs)
    }

    fn complete_sync(
        &self,
        id: &AccountId,
        sequence: &SequencePosition,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check("complete_sync")?;
        self.inner.complete_sync(id, sequence, at)
    }

    fn try_acquire_sync_lock(
        &self,
        id: &AccountId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        self.check("try_acquire_sync_lock")?;
        self.inner.try_acquire_sync_lock(id, now, ttl)
    }

    fn release_sync_lock(&self, id: &AccountId) -> Result<()> {
        self.check("release_sync_lock")?;
        self.inner.release_sync_lock(id)
    }

    fn insert_message(&self, message: Message) -> Result<bool> {
        self.check("insert_message")?;
        self.inner.insert_message(message)
    }

    fn has_message(&self, account_id: &AccountId, id: &MessageId) -> Result<bool> {
        self.check("has_message")?;
        self.inner.has_message(account_id, id)
    }

    fn get_message(&self, account_id: &AccountId, id: &MessageId) -> Result<Option<Message>> {
        self.check("get_message")?;
        self.inner.get_message(account_id, id)
    }

    fn filter_unknown_ids(
        &self,
        account_id: &AccountId,
        ids: &[MessageId],
    ) -> Result<Vec<MessageId>> {
        self.check("filter_unknown_ids")?;
        self.inner.filter_unknown_ids(account_id, ids)
    }

    fn count_messages(&self, account_id: &AccountId) -> Result<usize> {
        self.check("count_messages")?;
        self.inner.count_messages(account_id)
    }

    fn set_message_category(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        category: &str,
    ) -> Result<()> {
        self.check("set_message_category")?;
        self.inner.set_message_category(account_id, id, category)
    }

    fn link_message_client(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        client_id: &str,
    ) -> Result<()> {
        self.check("link_message_client")?;
        self.inner.link_message_client(account_id, id, client_id)
    }

    fn mark_message_analyzed(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.check("mark_message_analyzed")?;
        self.inner.mark_message_analyzed(account_id, id, at)
    }

    fn upsert_analysis_result(&self, result: AnalysisResult) -> Result<()> {
        self.check("upsert_analysis_result")?;
        self.inner.upsert_analysis_result(result)
    }

    fn get_analysis_result(&self, message_id: &MessageId) -> Result<Option<AnalysisResult>> {
        self.check("get_analysis_result")?;
        self.inner.get_analysis_result(message_id)
    }

    fn insert_action_item(&self, item: ActionItem) -> Result<()> {
        self.check("insert_action_item")?;
        self.inner.insert_action_item(item)
    }

    fn list_action_items(&self, message_id: &MessageId) -> Result<Vec<ActionItem>> {
        self.check("list_action_items")?;
        self.inner.list_action_items(message_id)
    }

    fn append_sync_log(&self, entry: SyncLogEntry) -> Result<()> {
        self.check("append_sync_log")?;
        self.inner.append_sync_log(entry)
    }

    fn append_notification_log(&self, entry: NotificationLogEntry) -> Result<()> {
        self.check("append_notification_log")?;
        self.inner.append_notification_log(entry)
    }

    fn list_sync_logs(&self, account_id: &AccountId) -> Result<Vec<SyncLogEntry>> {
        self.check("list_sync_logs")?;
        self.inner.list_sync_logs(account_id)
    }

    fn list_notification_logs(&self) -> Result<Vec<NotificationLogEntry>> {
        self.check("list_notification_logs")?;
        self.inner.list_notification_logs()
    }
}

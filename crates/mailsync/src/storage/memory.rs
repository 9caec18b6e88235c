//! In-memory storage implementation
//!
//! Used for testing. HashMaps protected by RwLocks for thread-safe access.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::MailStore;
use crate::models::{
    AccountId, ActionItem, AnalysisResult, MailboxAccount, Message, MessageId,
    NotificationLogEntry, SequencePosition, SyncLogEntry,
};

/// In-memory implementation of MailStore
pub struct InMemoryMailStore {
    accounts: RwLock<HashMap<String, MailboxAccount>>,
    /// Keyed by (account_id, message_id)
    messages: RwLock<HashMap<(String, String), Message>>,
    analysis: RwLock<HashMap<String, AnalysisResult>>,
    action_items: RwLock<Vec<ActionItem>>,
    sync_logs: RwLock<Vec<SyncLogEntry>>,
    notification_logs: RwLock<Vec<NotificationLogEntry>>,
}

impl InMemoryMailStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
            analysis: RwLock::new(HashMap::new()),
            action_items: RwLock::new(Vec::new()),
            sync_logs: RwLock::new(Vec::new()),
            notification_logs: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryMailStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MailStore for InMemoryMailStore {
    fn upsert_account(&self, account: MailboxAccount) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap();
        accounts.insert(account.id.0.clone(), account);
        Ok(())
    }

    fn get_account(&self, id: &AccountId) -> Result<Option<MailboxAccount>> {
        let accounts = self.accounts.read().unwrap();
        Ok(accounts.get(&id.0).cloned())
    }

    fn get_account_by_address(&self, email_address: &str) -> Result<Option<MailboxAccount>> {
        let accounts = self.accounts.read().unwrap();
        Ok(accounts
            .values()
            .find(|a| a.email_address == email_address)
            .cloned())
    }

    fn set_needs_full_resync(&self, id: &AccountId, needs: bool) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap();
        if let Some(account) = accounts.get_mut(&id.0) {
            account.needs_full_resync = needs;
        }
        Ok(())
    }

    fn complete_sync(
        &self,
        id: &AccountId,
        sequence: &SequencePosition,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap();
        if let Some(account) = accounts.get_mut(&id.0) {
            account.last_sequence = Some(sequence.clone());
            account.last_synced_at = Some(at);
        }
        Ok(())
    }

    fn try_acquire_sync_lock(
        &self,
        id: &AccountId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        // Single write lock makes check-and-set atomic
        let mut accounts = self.accounts.write().unwrap();
        let Some(account) = accounts.get_mut(&id.0) else {
            return Ok(false);
        };

        if let Some(expires_at) = account.lock_expires_at
            && expires_at > now
        {
            return Ok(false);
        }

        account.lock_expires_at = Some(now + ttl);
        Ok(true)
    }

    fn release_sync_lock(&self, id: &AccountId) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap();
        if let Some(account) = accounts.get_mut(&id.0) {
            account.lock_expires_at = None;
        }
        Ok(())
    }

    fn insert_message(&self, message: Message) -> Result<bool> {
        let key = (message.account_id.0.clone(), message.id.0.clone());
        let mut messages = self.messages.write().unwrap();
        match messages.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => Ok(false),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(message);
                Ok(true)
            }
        }
    }

    fn has_message(&self, account_id: &AccountId, id: &MessageId) -> Result<bool> {
        let messages = self.messages.read().unwrap();
        Ok(messages.contains_key(&(account_id.0.clone(), id.0.clone())))
    }

    fn get_message(&self, account_id: &AccountId, id: &MessageId) -> Result<Option<Message>> {
        let messages = self.messages.read().unwrap();
        Ok(messages.get(&(account_id.0.clone(), id.0.clone())).cloned())
    }

    fn filter_unknown_ids(
        &self,
        account_id: &AccountId,
        ids: &[MessageId],
    ) -> Result<Vec<MessageId>> {
        let messages = self.messages.read().unwrap();
        Ok(ids
            .iter()
            .filter(|id| !messages.contains_key(&(account_id.0.clone(), id.0.clone())))
            .cloned()
            .collect())
    }

    fn count_messages(&self, account_id: &AccountId) -> Result<usize> {
        let messages = self.messages.read().unwrap();
        Ok(messages.keys().filter(|(a, _)| a == &account_id.0).count())
    }

    fn set_message_category(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        category: &str,
    ) -> Result<()> {
        let mut messages = self.messages.write().unwrap();
        if let Some(msg) = messages.get_mut(&(account_id.0.clone(), id.0.clone())) {
            msg.category = Some(category.to_string());
        }
        Ok(())
    }

    fn link_message_client(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        client_id: &str,
    ) -> Result<()> {
        let mut messages = self.messages.write().unwrap();
        if let Some(msg) = messages.get_mut(&(account_id.0.clone(), id.0.clone())) {
            msg.client_id = Some(client_id.to_string());
        }
        Ok(())
    }

    fn mark_message_analyzed(
        &self,
        account_id: &AccountId,
        id: &MessageId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut messages = self.messages.write().unwrap();
        if let Some(msg) = messages.get_mut(&(account_id.0.clone(), id.0.clone())) {
            msg.analyzed_at = Some(at);
        }
        Ok(())
    }

    fn upsert_analysis_result(&self, result: AnalysisResult) -> Result<()> {
        let mut analysis = self.analysis.write().unwrap();
        analysis.insert(result.message_id.0.clone(), result);
        Ok(())
    }

    fn get_analysis_result(&self, message_id: &MessageId) -> Result<Option<AnalysisResult>> {
        let analysis = self.analysis.read().unwrap();
        Ok(analysis.get(&message_id.0).cloned())
    }

    fn insert_action_item(&self, item: ActionItem) -> Result<()> {
        let mut items = self.action_items.write().unwrap();
        items.push(item);
        Ok(())
    }

    fn list_action_items(&self, message_id: &MessageId) -> Result<Vec<ActionItem>> {
        let items = self.action_items.read().unwrap();
        Ok(items
            .iter()
            .filter(|i| i.message_id == *message_id)
            .cloned()
            .collect())
    }

    fn append_sync_log(&self, entry: SyncLogEntry) -> Result<()> {
        let mut logs = self.sync_logs.write().unwrap();
        logs.push(entry);
        Ok(())
    }

    fn append_notification_log(&self, entry: NotificationLogEntry) -> Result<()> {
        let mut logs = self.notification_logs.write().unwrap();
        logs.push(entry);
        Ok(())
    }

    fn list_sync_logs(&self, account_id: &AccountId) -> Result<Vec<SyncLogEntry>> {
        let logs = self.sync_logs.read().unwrap();
        Ok(logs
            .iter()
            .filter(|e| e.account_id == *account_id)
            .cloned()
            .collect())
    }

    fn list_notification_logs(&self) -> Result<Vec<NotificationLogEntry>> {
        let logs = self.notification_logs.read().unwrap();
        Ok(logs.clone())
    }
}

//! Mailbox account model

use super::SequencePosition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a connected mailbox account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A mailbox connected for synchronization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxAccount {
    pub id: AccountId,
    /// Owning user, carried onto every record derived from this mailbox
    pub owner_id: String,
    /// Provider-side mailbox address, unique across accounts
    pub email_address: String,
    /// High-water mark of the change stream; None until the first full resync
    pub last_sequence: Option<SequencePosition>,
    /// Set when incremental sync can no longer continue from `last_sequence`
    pub needs_full_resync: bool,
    /// TTL sync lock; an expired value counts as unlocked
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_enabled: bool,
}

impl MailboxAccount {
    pub fn new(
        id: impl Into<AccountId>,
        owner_id: impl Into<String>,
        email_address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            email_address: email_address.into(),
            last_sequence: None,
            needs_full_resync: false,
            lock_expires_at: None,
            last_synced_at: None,
            sync_enabled: true,
        }
    }
}

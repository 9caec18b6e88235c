//! Mailbox provider integration
//!
//! This module provides:
//! - Refresh-token based access-token management
//! - A `MailboxClient` trait plus the HTTP implementation
//! - Response normalization to domain models

mod client;
mod normalize;
mod token;

pub use client::{HistoryExpiredError, HttpMailboxClient};
pub use normalize::normalize_message;
pub use token::{ProviderCredentials, TokenProvider};

use anyhow::Result;

use crate::models::{MessageId, SequencePosition};

/// Changes reported by the provider since a given sequence position
#[derive(Debug, Clone, Default)]
pub struct ChangeDelta {
    /// Ids of messages added, in stream order, may contain duplicates
    pub added: Vec<MessageId>,
    /// Position of the end of the returned window, when the provider sent one
    pub latest_sequence: Option<SequencePosition>,
}

/// Read-side mailbox operations the sync engine depends on.
///
/// `list_changes_since` returns a typed `HistoryExpiredError` (downcastable
/// through `anyhow`) when the given position is too old to continue from.
pub trait MailboxClient: Send + Sync {
    fn list_changes_since(&self, start: &SequencePosition) -> Result<ChangeDelta>;

    fn fetch_message(&self, id: &MessageId) -> Result<api::RawMessage>;

    /// Ids of the most recent messages, newest first, at most `max`
    fn list_recent(&self, max: usize) -> Result<Vec<MessageId>>;

    /// Current end of the mailbox's change stream
    fn current_sequence(&self) -> Result<SequencePosition>;
}

/// Provider API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from the change-history endpoint
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ChangeListResponse {
        pub history: Option<Vec<ChangeRecord>>,
        pub history_id: Option<String>,
        pub next_page_token: Option<String>,
    }

    /// One change record; only message additions are requested
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ChangeRecord {
        pub messages_added: Option<Vec<AddedMessage>>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AddedMessage {
        pub message: MessageRef,
    }

    /// Response from listing messages
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just the id)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
    }

    /// Full message as returned by the provider
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RawMessage {
        pub id: String,
        pub label_ids: Option<Vec<String>>,
        pub snippet: String,
        /// Milliseconds since epoch, as a decimal string
        pub internal_date: String,
        pub payload: Option<MessagePayload>,
    }

    /// Message payload containing headers and body
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
        pub mime_type: Option<String>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Message body (may be base64 encoded)
    #[derive(Debug, Deserialize)]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
    }

    /// Message part (for multipart messages)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Response from the profile endpoint
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ProfileResponse {
        pub email_address: String,
        pub history_id: String,
        pub messages_total: Option<u64>,
    }
}

//! HTTP client for the mailbox provider API
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use std::time::Duration;

use super::api::{
    ChangeListResponse, ChangeRecord, ListMessagesResponse, ProfileResponse, RawMessage,
};
use super::{ChangeDelta, MailboxClient, TokenProvider};
use crate::models::{MessageId, SequencePosition};

/// Error indicating the change sequence has expired or is invalid
#[derive(Debug, thiserror::Error)]
#[error("Change sequence expired or invalid")]
pub struct HistoryExpiredError;

/// Mailbox provider client over the Gmail-shaped REST API
pub struct HttpMailboxClient {
    tokens: TokenProvider,
    base_url: String,
}

impl HttpMailboxClient {
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Per-page limit accepted by the list endpoints
    const MAX_PAGE_SIZE: usize = 500;

    pub fn new(tokens: TokenProvider) -> Self {
        Self {
            tokens,
            base_url: Self::BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (for tests)
    pub fn with_base_url(tokens: TokenProvider, base_url: impl Into<String>) -> Self {
        Self {
            tokens,
            base_url: base_url.into(),
        }
    }

    /// List one page of changes since the given position
    ///
    /// # Errors
    /// Returns `HistoryExpiredError` when the provider answers 404, meaning
    /// the position is too old to resume from.
    fn list_changes_page(
        &self,
        start: &SequencePosition,
        page_token: Option<&str>,
    ) -> Result<ChangeListResponse> {
        let access_token = self.tokens.get_access_token()?;

        let mut url = format!(
            "{}/users/me/history?startHistoryId={}&historyTypes=messageAdded",
            self.base_url,
            urlencoding::encode(start.as_str())
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call();

        match response {
            Ok(mut resp) => {
                let changes: ChangeListResponse = resp
                    .body_mut()
                    .read_json()
                    .context("Failed to parse change list response")?;
                Ok(changes)
            }
            Err(ureq::Error::StatusCode(404)) => Err(HistoryExpiredError.into()),
            Err(e) => Err(anyhow::anyhow!("Failed to fetch change list: {}", e)),
        }
    }

    /// List one page of recent message ids
    fn list_messages_page(
        &self,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        let access_token = self.tokens.get_access_token()?;

        let mut url = format!(
            "{}/users/me/messages?maxResults={}",
            self.base_url,
            max_results.min(Self::MAX_PAGE_SIZE)
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let mut response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send list messages request")?;

        let list: ListMessagesResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse list messages response")?;

        Ok(list)
    }

    fn get_message(&self, id: &MessageId) -> Result<RawMessage> {
        let access_token = self.tokens.get_access_token()?;

        let url = format!(
            "{}/users/me/messages/{}?format=full",
            self.base_url,
            id.as_str()
        );

        let mut response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send get message request")?;

        let message: RawMessage = response
            .body_mut()
            .read_json()
            .context("Failed to parse message response")?;

        Ok(message)
    }

    /// Get a message with exponential backoff retry
    fn get_message_with_retry(&self, id: &MessageId, max_retries: u32) -> Result<RawMessage> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(100);

        for attempt in 0..max_retries {
            match self.get_message(id) {
                Ok(msg) => return Ok(msg),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < max_retries - 1 {
                        // Add jitter to delay
                        let jitter = Duration::from_millis(rand_jitter());
                        std::thread::sleep(delay + jitter);
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_error.unwrap())
    }

    fn get_profile(&self) -> Result<ProfileResponse> {
        let access_token = self.tokens.get_access_token()?;

        let url = format!("{}/users/me/profile", self.base_url);

        let mut response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send profile request")?;

        let profile: ProfileResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse profile response")?;

        Ok(profile)
    }
}

impl MailboxClient for HttpMailboxClient {
    fn list_changes_since(&self, start: &SequencePosition) -> Result<ChangeDelta> {
        let mut added = Vec::new();
        let mut latest_sequence = None;
        let mut page_token = None;

        loop {
            let response = self.list_changes_page(start, page_token.as_deref())?;

            if let Some(records) = response.history {
                collect_added_ids(&records, &mut added);
            }

            if let Some(id) = response.history_id {
                latest_sequence = Some(SequencePosition::new(id));
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(ChangeDelta {
            added,
            latest_sequence,
        })
    }

    fn fetch_message(&self, id: &MessageId) -> Result<RawMessage> {
        self.get_message_with_retry(id, 3)
    }

    fn list_recent(&self, max: usize) -> Result<Vec<MessageId>> {
        let mut ids = Vec::new();
        let mut page_token = None;

        while ids.len() < max {
            let response = self.list_messages_page(max - ids.len(), page_token.as_deref())?;

            if let Some(messages) = response.messages {
                ids.extend(messages.into_iter().map(|m| MessageId::new(m.id)));
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        ids.truncate(max);
        Ok(ids)
    }

    fn current_sequence(&self) -> Result<SequencePosition> {
        let profile = self.get_profile()?;
        Ok(SequencePosition::new(profile.history_id))
    }
}

/// Flatten "message added" records into ids, preserving stream order
fn collect_added_ids(records: &[ChangeRecord], out: &mut Vec<MessageId>) {
    for record in records {
        if let Some(added) = &record.messages_added {
            for entry in added {
                out.push(MessageId::new(&entry.message.id));
            }
        }
    }
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}

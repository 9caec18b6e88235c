//! Push-notification receiver
//!
//! The transport (an HTTP endpoint in the embedding application) hands every
//! delivery here and acknowledges unconditionally. `handle_push` therefore
//! never returns an error: a delivery the pipeline cannot use is logged,
//! audited, and dropped, because the provider would otherwise redeliver it
//! forever.

use base64::prelude::*;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{JobSink, SyncJob};
use crate::models::{NotificationDisposition, NotificationLogEntry, SequencePosition};
use crate::storage::MailStore;

/// Push envelope as delivered by the notification transport
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEnvelope {
    pub message: PushMessage,
    pub subscription: Option<String>,
}

/// Inner transport message; `data` is a base64-encoded JSON payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub data: String,
    pub message_id: Option<String>,
    pub publish_time: Option<String>,
}

/// Decoded change notification from the mailbox provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub email_address: String,
    pub history_id: String,
}

/// Decode the base64 payload of a push envelope
///
/// Transports differ on padding and alphabet, so both standard and URL-safe
/// decoders are tried.
pub fn decode_notification(envelope: &PushEnvelope) -> anyhow::Result<ChangeNotification> {
    use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

    let data = envelope.message.data.as_str();
    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD];

    let mut bytes = None;
    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(data) {
            bytes = Some(decoded);
            break;
        }
    }
    let bytes = bytes.ok_or_else(|| anyhow::anyhow!("Push data is not valid base64"))?;

    let notification: ChangeNotification =
        serde_json::from_slice(&bytes).map_err(|e| anyhow::anyhow!("Invalid push payload: {}", e))?;
    Ok(notification)
}

/// Turns push deliveries into queued sync jobs
pub struct NotificationReceiver {
    store: Arc<dyn MailStore>,
    sink: Arc<dyn JobSink>,
}

impl NotificationReceiver {
    pub fn new(store: Arc<dyn MailStore>, sink: Arc<dyn JobSink>) -> Self {
        Self { store, sink }
    }

    /// Handle one push delivery. Infallible by signature: every path acks.
    pub fn handle_push(&self, envelope: PushEnvelope) {
        let delivery_id = envelope.message.message_id.clone();

        let notification = match decode_notification(&envelope) {
            Ok(notification) => notification,
            Err(e) => {
                log::warn!("Malformed push notification: {:#}", e);
                self.audit(delivery_id, None, None, NotificationDisposition::Malformed);
                return;
            }
        };

        let claimed = SequencePosition::new(notification.history_id);
        let email = notification.email_address;

        let account = match self.store.get_account_by_address(&email) {
            Ok(Some(account)) => account,
            Ok(None) => {
                log::info!("Notification for unknown mailbox {}", email);
                self.audit(
                    delivery_id,
                    Some(email),
                    Some(claimed),
                    NotificationDisposition::UnknownAccount,
                );
                return;
            }
            Err(e) => {
                // Still acked; the next delivery retries the lookup
                log::error!("Account lookup failed for {}: {:#}", email, e);
                self.audit(
                    delivery_id,
                    Some(email),
                    Some(claimed),
                    NotificationDisposition::LookupFailed,
                );
                return;
            }
        };

        if !account.sync_enabled {
            log::debug!("Sync disabled for account {}", account.id.as_str());
            self.audit(
                delivery_id,
                Some(email),
                Some(claimed),
                NotificationDisposition::SyncDisabled,
            );
            return;
        }

        // Strictly-greater check makes redelivered and out-of-order
        // notifications no-ops
        if let Some(stored) = &account.last_sequence
            && claimed <= *stored
        {
            log::debug!(
                "Stale notification for account {} ({} <= {})",
                account.id.as_str(),
                claimed,
                stored
            );
            self.audit(
                delivery_id,
                Some(email),
                Some(claimed),
                NotificationDisposition::Stale,
            );
            return;
        }

        let accepted = self.sink.submit(SyncJob {
            account_id: account.id.clone(),
            claimed_sequence: claimed.clone(),
        });

        let disposition = if accepted {
            NotificationDisposition::Enqueued
        } else {
            NotificationDisposition::QueueFull
        };
        self.audit(delivery_id, Some(email), Some(claimed), disposition);
    }

    fn audit(
        &self,
        delivery_id: Option<String>,
        email_address: Option<String>,
        claimed_sequence: Option<SequencePosition>,
        disposition: NotificationDisposition,
    ) {
        let entry = NotificationLogEntry {
            delivery_id,
            email_address,
            claimed_sequence,
            disposition,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.append_notification_log(entry) {
            log::warn!("Failed to append notification log: {:#}", e);
        }
    }
}

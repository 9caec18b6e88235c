//! Worker-side job execution: sync, escalation, analysis handoff
//!
//! This is the fire-and-forget end of the pipeline. Nothing here returns an
//! error to the caller; failures are logged and audited, and the next
//! notification retries naturally.

use std::sync::Arc;

use super::{SyncEngine, SyncOutcome, SyncReport};
use crate::analysis::AnalysisOrchestrator;
use crate::models::{AccountId, MessageId, SequencePosition};
use crate::storage::MailStore;

/// Runs one queued sync job end to end
pub struct SyncService {
    engine: SyncEngine,
    orchestrator: AnalysisOrchestrator,
    store: Arc<dyn MailStore>,
}

impl SyncService {
    pub fn new(
        engine: SyncEngine,
        orchestrator: AnalysisOrchestrator,
        store: Arc<dyn MailStore>,
    ) -> Self {
        Self {
            engine,
            orchestrator,
            store,
        }
    }

    /// Sync the account, following an escalation with an immediate full
    /// resync, then analyze whatever came in.
    ///
    /// Jobs whose claimed position the store already reached are dropped:
    /// a duplicate queued before the first sync advanced the position would
    /// otherwise cost an empty provider round trip.
    pub fn run_job(&self, account_id: &AccountId, claimed_sequence: &SequencePosition) {
        if let Ok(Some(account)) = self.store.get_account(account_id)
            && let Some(stored) = &account.last_sequence
            && *claimed_sequence <= *stored
        {
            log::debug!(
                "Job for account {} is stale ({} <= {}), skipping",
                account_id.as_str(),
                claimed_sequence,
                stored
            );
            return;
        }

        let report = match self.engine.sync_account(account_id) {
            Ok(report) => report,
            Err(e) => {
                log::error!("Sync failed for account {}: {:#}", account_id.as_str(), e);
                return;
            }
        };

        let report = match report.outcome {
            SyncOutcome::EscalatedToFullResync => {
                match self.engine.full_resync_account(account_id) {
                    Ok(report) => report,
                    Err(e) => {
                        log::error!(
                            "Full resync failed for account {}: {:#}",
                            account_id.as_str(),
                            e
                        );
                        return;
                    }
                }
            }
            _ => report,
        };

        self.analyze_batch(account_id, &report);
    }

    fn analyze_batch(&self, account_id: &AccountId, report: &SyncReport) {
        for id in &report.new_message_ids {
            self.analyze_one(account_id, id);
        }
    }

    fn analyze_one(&self, account_id: &AccountId, id: &MessageId) {
        let message = match self.store.get_message(account_id, id) {
            Ok(Some(message)) => message,
            Ok(None) => {
                log::warn!("Message {} vanished before analysis", id.as_str());
                return;
            }
            Err(e) => {
                log::warn!(
                    "Failed to load message {} for analysis: {:#}",
                    id.as_str(),
                    e
                );
                return;
            }
        };

        match self.orchestrator.process(&message) {
            Ok(report) if !report.succeeded => {
                log::warn!("Analysis produced nothing for message {}", id.as_str());
            }
            Ok(_) => {}
            Err(e) => {
                log::error!("Analysis failed for message {}: {:#}", id.as_str(), e);
            }
        }
    }
}

//! Incremental sync engine with full-resync escalation
//!
//! Incremental sync walks the provider's change stream from the account's
//! last recorded position. When that position is unusable (first sync, or
//! the provider reports it expired) the engine flags the account and reports
//! escalation; `full_resync_account` then rebuilds a baseline from the most
//! recent messages. The sequence position only advances after new messages
//! are persisted, so a crash between the two re-ingests idempotently.

use anyhow::{Context, Result};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use super::SyncLockManager;
use crate::config::PipelineConfig;
use crate::models::{
    AccountId, MailboxAccount, MessageId, SyncAttemptOutcome, SyncLogEntry,
};
use crate::provider::{HistoryExpiredError, MailboxClient, normalize_message};
use crate::storage::MailStore;

/// How a sync run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed { new_messages: usize },
    EscalatedToFullResync,
    Skipped,
}

/// Result of one sync run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Newly persisted ids to hand to analysis, capped at `max_batch_per_run`
    pub new_message_ids: Vec<MessageId>,
    pub duration_ms: u64,
}

/// Runs incremental sync and full resync for one account at a time
pub struct SyncEngine {
    client: Arc<dyn MailboxClient>,
    store: Arc<dyn MailStore>,
    locks: SyncLockManager,
    config: PipelineConfig,
}

impl SyncEngine {
    pub fn new(
        client: Arc<dyn MailboxClient>,
        store: Arc<dyn MailStore>,
        config: PipelineConfig,
    ) -> Self {
        let locks = SyncLockManager::new(Arc::clone(&store), config.lock_ttl_secs);
        Self {
            client,
            store,
            locks,
            config,
        }
    }

    /// Run an incremental sync for the account.
    ///
    /// A held lock yields `Skipped`; an unusable change position yields
    /// `EscalatedToFullResync` with the account flagged for resync. Both are
    /// ordinary outcomes, not errors.
    pub fn sync_account(&self, account_id: &AccountId) -> Result<SyncReport> {
        self.run_locked(account_id, |account| self.run_incremental(account))
    }

    /// Rebuild the account's baseline from its most recent messages.
    ///
    /// The fresh sequence position is captured before enumeration, so
    /// messages arriving mid-resync surface in the next incremental sync
    /// rather than being lost.
    pub fn full_resync_account(&self, account_id: &AccountId) -> Result<SyncReport> {
        self.run_locked(account_id, |account| self.run_full_resync(account))
    }

    /// Lock wrapper shared by both sync flavors. The lock is released on
    /// every exit path, including errors, and each attempt is audit-logged.
    fn run_locked<F>(&self, account_id: &AccountId, body: F) -> Result<SyncReport>
    where
        F: FnOnce(&MailboxAccount) -> Result<(SyncOutcome, Vec<MessageId>)>,
    {
        let started = Instant::now();

        if !self.locks.acquire(account_id)? {
            let report = SyncReport {
                outcome: SyncOutcome::Skipped,
                new_message_ids: Vec::new(),
                duration_ms: started.elapsed().as_millis() as u64,
            };

            // Acquisition also misses when the account row does not exist;
            // that is an error, not a busy lock
            if self.store.get_account(account_id)?.is_none() {
                let e = anyhow::anyhow!("Unknown account: {}", account_id.as_str());
                self.log_attempt(
                    account_id,
                    SyncAttemptOutcome::Failed,
                    0,
                    &report,
                    Some(format!("{:#}", e)),
                );
                return Err(e);
            }

            log::debug!(
                "Sync lock held for account {}, skipping",
                account_id.as_str()
            );
            self.log_attempt(account_id, SyncAttemptOutcome::Skipped, 0, &report, None);
            return Ok(report);
        }

        let result = (|| {
            let account = self
                .store
                .get_account(account_id)?
                .with_context(|| format!("Unknown account: {}", account_id.as_str()))?;
            body(&account)
        })();

        if let Err(e) = self.locks.release(account_id) {
            log::warn!(
                "Failed to release sync lock for account {}: {:#}",
                account_id.as_str(),
                e
            );
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok((outcome, new_message_ids)) => {
                let (audit_outcome, ingested) = match &outcome {
                    SyncOutcome::Completed { new_messages } => {
                        (SyncAttemptOutcome::Completed, *new_messages)
                    }
                    SyncOutcome::EscalatedToFullResync => {
                        (SyncAttemptOutcome::EscalatedToFullResync, 0)
                    }
                    SyncOutcome::Skipped => (SyncAttemptOutcome::Skipped, 0),
                };
                let report = SyncReport {
                    outcome,
                    new_message_ids,
                    duration_ms,
                };
                self.log_attempt(account_id, audit_outcome, ingested, &report, None);
                Ok(report)
            }
            Err(e) => {
                let report = SyncReport {
                    outcome: SyncOutcome::Skipped,
                    new_message_ids: Vec::new(),
                    duration_ms,
                };
                self.log_attempt(
                    account_id,
                    SyncAttemptOutcome::Failed,
                    0,
                    &report,
                    Some(format!("{:#}", e)),
                );
                Err(e)
            }
        }
    }

    fn run_incremental(
        &self,
        account: &MailboxAccount,
    ) -> Result<(SyncOutcome, Vec<MessageId>)> {
        if account.needs_full_resync {
            return Ok((SyncOutcome::EscalatedToFullResync, Vec::new()));
        }

        let Some(start) = account.last_sequence.clone() else {
            log::info!(
                "No sync baseline for account {}, full resync required",
                account.id.as_str()
            );
            self.store.set_needs_full_resync(&account.id, true)?;
            return Ok((SyncOutcome::EscalatedToFullResync, Vec::new()));
        };

        let delta = match self.client.list_changes_since(&start) {
            Ok(delta) => delta,
            Err(e) if e.downcast_ref::<HistoryExpiredError>().is_some() => {
                log::info!(
                    "Change sequence expired for account {}, escalating to full resync",
                    account.id.as_str()
                );
                self.store.set_needs_full_resync(&account.id, true)?;
                return Ok((SyncOutcome::EscalatedToFullResync, Vec::new()));
            }
            Err(e) => return Err(e),
        };

        let candidates = dedup_in_order(delta.added);
        let unknown = self.store.filter_unknown_ids(&account.id, &candidates)?;
        let ingested = self.ingest(account, &unknown)?;
        let new_messages = ingested.len();

        // The position never moves backwards, even if the provider returned
        // a window ending before our stored mark
        let target = match delta.latest_sequence {
            Some(latest) if latest > start => latest,
            _ => start,
        };
        self.store.complete_sync(&account.id, &target, Utc::now())?;

        let mut handoff = ingested;
        handoff.truncate(self.config.max_batch_per_run);
        Ok((SyncOutcome::Completed { new_messages }, handoff))
    }

    fn run_full_resync(
        &self,
        account: &MailboxAccount,
    ) -> Result<(SyncOutcome, Vec<MessageId>)> {
        // Baseline first: anything arriving during enumeration lands after
        // this mark and is caught by the next incremental sync
        let baseline = self.client.current_sequence()?;

        let recent = self.client.list_recent(self.config.recent_window)?;
        let candidates = dedup_in_order(recent);
        let unknown = self.store.filter_unknown_ids(&account.id, &candidates)?;
        let ingested = self.ingest(account, &unknown)?;
        let new_messages = ingested.len();

        self.store.set_needs_full_resync(&account.id, false)?;
        self.store.complete_sync(&account.id, &baseline, Utc::now())?;

        log::info!(
            "Full resync for account {} ingested {} of {} recent messages",
            account.id.as_str(),
            new_messages,
            candidates.len()
        );

        let mut handoff = ingested;
        handoff.truncate(self.config.max_batch_per_run);
        Ok((SyncOutcome::Completed { new_messages }, handoff))
    }

    /// Fetch, normalize, and persist the given ids. Per-message fetch and
    /// normalize failures are logged and skipped; datastore failures abort.
    fn ingest(&self, account: &MailboxAccount, ids: &[MessageId]) -> Result<Vec<MessageId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let fetched: Vec<_> = ids
            .par_iter()
            .map(|id| (id.clone(), self.client.fetch_message(id)))
            .collect();

        let mut ingested = Vec::new();
        for (id, fetch_result) in fetched {
            let raw = match fetch_result {
                Ok(raw) => raw,
                Err(e) => {
                    log::warn!("Failed to fetch message {}: {:#}", id.as_str(), e);
                    continue;
                }
            };

            let message = match normalize_message(raw, account, self.config.max_body_bytes) {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("Failed to normalize message {}: {:#}", id.as_str(), e);
                    continue;
                }
            };

            match self.store.insert_message(message) {
                Ok(true) => ingested.push(id),
                // Lost a race with another sync; the message is stored either way
                Ok(false) => log::debug!("Message {} already stored", id.as_str()),
                Err(e) => return Err(e),
            }
        }

        Ok(ingested)
    }

    fn log_attempt(
        &self,
        account_id: &AccountId,
        outcome: SyncAttemptOutcome,
        messages_ingested: usize,
        report: &SyncReport,
        detail: Option<String>,
    ) {
        let entry = SyncLogEntry {
            account_id: account_id.clone(),
            outcome,
            messages_ingested,
            duration_ms: report.duration_ms,
            detail,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.append_sync_log(entry) {
            log::warn!(
                "Failed to append sync log for account {}: {:#}",
                account_id.as_str(),
                e
            );
        }
    }
}

/// Drop duplicate ids while keeping first-occurrence order
fn dedup_in_order(ids: Vec<MessageId>) -> Vec<MessageId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MailboxAccount, SequencePosition};
    use crate::provider::api::{Header, MessageBody, MessagePayload, RawMessage};
    use crate::provider::ChangeDelta;
    use crate::storage::InMemoryMailStore;
    use base64::prelude::*;
    use std::sync::Mutex;

    fn make_raw(id: &str) -> RawMessage {
        let body = BASE64_URL_SAFE_NO_PAD.encode(format!("body of {}", id));
        RawMessage {
            id: id.to_string(),
            label_ids: Some(vec!["INBOX".to_string()]),
            snippet: format!("snippet {}", id),
            internal_date: "1700000000000".to_string(),
            payload: Some(MessagePayload {
                headers: Some(vec![
                    Header {
                        name: "From".to_string(),
                        value: "sender@example.com".to_string(),
                    },
                    Header {
                        name: "Subject".to_string(),
                        value: format!("subject {}", id),
                    },
                ]),
                body: Some(MessageBody {
                    size: None,
                    data: Some(body),
                }),
                parts: None,
                mime_type: Some("text/plain".to_string()),
            }),
        }
    }

    /// Scripted client: each `list_changes_since` call pops the next entry
    struct FakeClient {
        changes: Mutex<Vec<Result<ChangeDelta>>>,
        recent: Vec<MessageId>,
        sequence: SequencePosition,
        fail_fetch: Vec<String>,
    }

    impl FakeClient {
        fn new() -> Self {
            Self {
                changes: Mutex::new(Vec::new()),
                recent: Vec::new(),
                sequence: SequencePosition::new("1000"),
                fail_fetch: Vec::new(),
            }
        }

        fn with_changes(self, changes: Vec<Result<ChangeDelta>>) -> Self {
            *self.changes.lock().unwrap() = changes;
            self
        }
    }

    impl MailboxClient for FakeClient {
        fn list_changes_since(&self, _start: &SequencePosition) -> Result<ChangeDelta> {
            self.changes.lock().unwrap().remove(0)
        }

        fn fetch_message(&self, id: &MessageId) -> Result<RawMessage> {
            if self.fail_fetch.iter().any(|f| f == id.as_str()) {
                anyhow::bail!("fetch failed for {}", id.as_str());
            }
            Ok(make_raw(id.as_str()))
        }

        fn list_recent(&self, max: usize) -> Result<Vec<MessageId>> {
            Ok(self.recent.iter().take(max).cloned().collect())
        }

        fn current_sequence(&self) -> Result<SequencePosition> {
            Ok(self.sequence.clone())
        }
    }

    fn setup(
        client: FakeClient,
        last_sequence: Option<&str>,
    ) -> (SyncEngine, Arc<InMemoryMailStore>, AccountId) {
        let store = Arc::new(InMemoryMailStore::new());
        let mut account = MailboxAccount::new("acc-1", "user-1", "a@example.com");
        account.last_sequence = last_sequence.map(SequencePosition::new);
        store.upsert_account(account).unwrap();

        let engine = SyncEngine::new(
            Arc::new(client),
            Arc::clone(&store) as Arc<dyn MailStore>,
            PipelineConfig::default(),
        );
        (engine, store, AccountId::new("acc-1"))
    }

    fn delta(ids: &[&str], latest: &str) -> ChangeDelta {
        ChangeDelta {
            added: ids.iter().map(|id| MessageId::new(*id)).collect(),
            latest_sequence: Some(SequencePosition::new(latest)),
        }
    }

    #[test]
    fn test_escalates_without_baseline() {
        let (engine, store, id) = setup(FakeClient::new(), None);

        let report = engine.sync_account(&id).unwrap();
        assert_eq!(report.outcome, SyncOutcome::EscalatedToFullResync);
        assert!(store.get_account(&id).unwrap().unwrap().needs_full_resync);
    }

    #[test]
    fn test_escalates_on_expired_history() {
        let client =
            FakeClient::new().with_changes(vec![Err(HistoryExpiredError.into())]);
        let (engine, store, id) = setup(client, Some("100"));

        let report = engine.sync_account(&id).unwrap();
        assert_eq!(report.outcome, SyncOutcome::EscalatedToFullResync);

        let account = store.get_account(&id).unwrap().unwrap();
        assert!(account.needs_full_resync);
        // The stored position is untouched by escalation
        assert_eq!(account.last_sequence, Some(SequencePosition::new("100")));
    }

    #[test]
    fn test_completes_and_ingests_with_dedup() {
        let client = FakeClient::new()
            .with_changes(vec![Ok(delta(&["m1", "m2", "m1"], "200"))]);
        let (engine, store, id) = setup(client, Some("100"));

        let report = engine.sync_account(&id).unwrap();
        assert_eq!(report.outcome, SyncOutcome::Completed { new_messages: 2 });
        assert_eq!(report.new_message_ids.len(), 2);
        assert_eq!(store.count_messages(&id).unwrap(), 2);

        let account = store.get_account(&id).unwrap().unwrap();
        assert_eq!(account.last_sequence, Some(SequencePosition::new("200")));
        assert!(account.last_synced_at.is_some());
    }

    #[test]
    fn test_empty_delta_still_advances_position() {
        let client = FakeClient::new().with_changes(vec![Ok(delta(&[], "300"))]);
        let (engine, store, id) = setup(client, Some("100"));

        let report = engine.sync_account(&id).unwrap();
        assert_eq!(report.outcome, SyncOutcome::Completed { new_messages: 0 });

        let account = store.get_account(&id).unwrap().unwrap();
        assert_eq!(account.last_sequence, Some(SequencePosition::new("300")));
    }

    #[test]
    fn test_position_never_regresses() {
        // Provider reports an older window end than our stored mark
        let client = FakeClient::new().with_changes(vec![Ok(delta(&[], "50"))]);
        let (engine, store, id) = setup(client, Some("100"));

        engine.sync_account(&id).unwrap();
        let account = store.get_account(&id).unwrap().unwrap();
        assert_eq!(account.last_sequence, Some(SequencePosition::new("100")));
    }

    #[test]
    fn test_known_messages_are_not_refetched() {
        let client = FakeClient::new()
            .with_changes(vec![
                Ok(delta(&["m1"], "200")),
                Ok(delta(&["m1", "m2"], "300")),
            ]);
        let (engine, store, id) = setup(client, Some("100"));

        engine.sync_account(&id).unwrap();
        let report = engine.sync_account(&id).unwrap();
        assert_eq!(report.outcome, SyncOutcome::Completed { new_messages: 1 });
        assert_eq!(store.count_messages(&id).unwrap(), 2);
    }

    #[test]
    fn test_skips_when_lock_held() {
        let client = FakeClient::new().with_changes(vec![Ok(delta(&[], "200"))]);
        let (engine, store, id) = setup(client, Some("100"));

        assert!(
            store
                .try_acquire_sync_lock(&id, Utc::now(), chrono::Duration::seconds(300))
                .unwrap()
        );

        let report = engine.sync_account(&id).unwrap();
        assert_eq!(report.outcome, SyncOutcome::Skipped);

        // Position untouched
        let account = store.get_account(&id).unwrap().unwrap();
        assert_eq!(account.last_sequence, Some(SequencePosition::new("100")));
    }

    #[test]
    fn test_lock_released_after_provider_error() {
        let client = FakeClient::new().with_changes(vec![
            Err(anyhow::anyhow!("provider unavailable")),
            Ok(delta(&[], "200")),
        ]);
        let (engine, store, id) = setup(client, Some("100"));

        assert!(engine.sync_account(&id).is_err());

        // The lock is free again: the next attempt runs instead of skipping
        let report = engine.sync_account(&id).unwrap();
        assert_eq!(report.outcome, SyncOutcome::Completed { new_messages: 0 });

        let logs = store.list_sync_logs(&id).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].outcome, SyncAttemptOutcome::Failed);
        assert_eq!(logs[1].outcome, SyncAttemptOutcome::Completed);
    }

    #[test]
    fn test_lock_released_after_store_failure_at_each_step() {
        use crate::storage::testing::FlakyMailStore;

        for op in ["filter_unknown_ids", "insert_message", "complete_sync"] {
            let client = FakeClient::new().with_changes(vec![
                Ok(delta(&["m1"], "200")),
                Ok(delta(&["m1"], "200")),
            ]);
            let store = Arc::new(FlakyMailStore::new());
            let mut account = MailboxAccount::new("acc-1", "user-1", "a@example.com");
            account.last_sequence = Some(SequencePosition::new("100"));
            store.upsert_account(account).unwrap();
            let engine = SyncEngine::new(
                Arc::new(client),
                Arc::clone(&store) as Arc<dyn MailStore>,
                PipelineConfig::default(),
            );
            let id = AccountId::new("acc-1");

            store.fail_on(op);
            assert!(engine.sync_account(&id).is_err(), "no failure during {}", op);

            // Lock must be free again: the retry completes instead of skipping
            store.heal();
            let report = engine.sync_account(&id).unwrap();
            assert!(
                matches!(report.outcome, SyncOutcome::Completed { .. }),
                "lock still held after {} failure",
                op
            );
        }
    }

    #[test]
    fn test_unknown_account_is_an_error() {
        let (engine, store, _) = setup(FakeClient::new(), Some("100"));
        let ghost = AccountId::new("ghost");

        assert!(engine.sync_account(&ghost).is_err());

        let logs = store.list_sync_logs(&ghost).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].outcome, SyncAttemptOutcome::Failed);
    }

    #[test]
    fn test_fetch_failure_skips_message_but_completes() {
        let mut client =
            FakeClient::new().with_changes(vec![Ok(delta(&["m1", "m2"], "200"))]);
        client.fail_fetch = vec!["m1".to_string()];
        let (engine, store, id) = setup(client, Some("100"));

        let report = engine.sync_account(&id).unwrap();
        assert_eq!(report.outcome, SyncOutcome::Completed { new_messages: 1 });
        assert!(
            store
                .has_message(&id, &MessageId::new("m2"))
                .unwrap()
        );
        assert!(
            !store
                .has_message(&id, &MessageId::new("m1"))
                .unwrap()
        );
    }

    #[test]
    fn test_full_resync_sets_baseline_and_clears_flag() {
        let mut client = FakeClient::new();
        client.recent = vec![MessageId::new("m1"), MessageId::new("m2")];
        client.sequence = SequencePosition::new("5000");
        let (engine, store, id) = setup(client, None);

        store.set_needs_full_resync(&id, true).unwrap();

        let report = engine.full_resync_account(&id).unwrap();
        assert_eq!(report.outcome, SyncOutcome::Completed { new_messages: 2 });

        let account = store.get_account(&id).unwrap().unwrap();
        assert!(!account.needs_full_resync);
        assert_eq!(account.last_sequence, Some(SequencePosition::new("5000")));
        assert_eq!(store.count_messages(&id).unwrap(), 2);
    }

    #[test]
    fn test_handoff_capped_at_batch_limit() {
        let ids: Vec<String> = (0..40).map(|i| format!("m{}", i)).collect();
        let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        let client = FakeClient::new().with_changes(vec![Ok(delta(&id_refs, "200"))]);
        let (engine, store, id) = setup(client, Some("100"));

        let report = engine.sync_account(&id).unwrap();
        // All 40 persisted, only the configured batch handed to analysis
        assert_eq!(report.outcome, SyncOutcome::Completed { new_messages: 40 });
        assert_eq!(report.new_message_ids.len(), 25);
        assert_eq!(store.count_messages(&id).unwrap(), 40);
    }

    #[test]
    fn test_flagged_account_escalates_without_provider_call() {
        // No scripted changes: a provider call would panic
        let (engine, store, id) = setup(FakeClient::new(), Some("100"));
        store.set_needs_full_resync(&id, true).unwrap();

        let report = engine.sync_account(&id).unwrap();
        assert_eq!(report.outcome, SyncOutcome::EscalatedToFullResync);
    }

    #[test]
    fn test_sequence_comparison_beyond_u64() {
        let big_start = "18446744073709551616";
        let big_next = "18446744073709551620";
        let client = FakeClient::new().with_changes(vec![Ok(delta(&["m1"], big_next))]);
        let (engine, store, id) = setup(client, Some(big_start));

        engine.sync_account(&id).unwrap();
        let account = store.get_account(&id).unwrap().unwrap();
        assert_eq!(account.last_sequence, Some(SequencePosition::new(big_next)));
    }
}

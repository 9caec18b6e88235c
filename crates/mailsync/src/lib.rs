//! Mailsync - mailbox synchronization and analysis pipeline
//!
//! This crate provides the core of a push-driven mail pipeline:
//! - Domain models (accounts, messages, analysis results, audit logs)
//! - Provider client with token refresh and response normalization
//! - Storage trait abstractions (in-memory and SQLite)
//! - TTL-locked incremental sync with full-resync escalation
//! - Push-notification intake with a bounded worker pool
//! - Concurrent per-message analysis orchestration
//!
//! The crate has no transport or UI dependencies; the embedding application
//! owns the HTTP endpoint that receives push deliveries and the analysis
//! task implementations.

pub mod analysis;
pub mod config;
pub mod models;
pub mod notify;
pub mod provider;
pub mod storage;
pub mod sync;

pub use analysis::{AnalysisOrchestrator, AnalysisReport, AnalysisTask, TaskSuccess};
pub use config::PipelineConfig;
pub use models::{
    AccountId, ActionFinding, ActionItem, ActionStatus, AnalysisContext, AnalysisResult,
    CategoryFinding, ClientFinding, ClientRecord, EmailAddress, Finding, MailboxAccount, Message,
    MessageId, NotificationDisposition, NotificationLogEntry, SequencePosition,
    SyncAttemptOutcome, SyncLogEntry, TaskError, TaskKind, TaskOutcome,
};
pub use notify::{
    ChangeNotification, JobSink, NotificationReceiver, PushEnvelope, PushMessage, SyncDispatcher,
    SyncJob, decode_notification,
};
pub use provider::{
    ChangeDelta, HistoryExpiredError, HttpMailboxClient, MailboxClient, ProviderCredentials,
    TokenProvider, normalize_message,
};
pub use storage::{InMemoryMailStore, MailStore, SqliteMailStore};
pub use sync::{SyncEngine, SyncLockManager, SyncOutcome, SyncReport, SyncService};

//! Domain models for mailbox sync and analysis

mod account;
mod analysis;
mod audit;
mod message;
mod sequence;

pub use account::{AccountId, MailboxAccount};
pub use analysis::{
    ActionFinding, ActionItem, ActionStatus, AnalysisContext, AnalysisResult, CategoryFinding,
    ClientFinding, ClientRecord, Finding, TaskError, TaskKind, TaskOutcome,
};
pub use audit::{
    NotificationDisposition, NotificationLogEntry, SyncAttemptOutcome, SyncLogEntry,
};
pub use message::{EmailAddress, Message, MessageBuilder, MessageId};
pub use sequence::SequencePosition;

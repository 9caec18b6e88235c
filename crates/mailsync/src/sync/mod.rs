//! Sync execution: TTL locking, incremental sync, full resync

mod engine;
mod lock;
mod service;

pub use engine::{SyncEngine, SyncOutcome, SyncReport};
pub use lock::SyncLockManager;
pub use service::SyncService;

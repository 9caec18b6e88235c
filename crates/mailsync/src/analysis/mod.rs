//! Concurrent per-message analysis

mod orchestrator;

pub use orchestrator::{AnalysisOrchestrator, AnalysisReport};

use anyhow::Result;

use crate::models::{AnalysisContext, Finding, Message, TaskKind};

/// Data returned by a successful analysis task
#[derive(Debug, Clone)]
pub struct TaskSuccess {
    pub finding: Finding,
    /// Whatever the task spent (API tokens, etc), summed onto the result
    pub cost_units: u64,
}

/// One unit of analysis run against each message.
///
/// Implementations live outside this crate (they typically call a language
/// model); the orchestrator only depends on this seam. A task that ran but
/// found nothing still returns `Ok` with an empty finding, `Err` means the
/// task itself failed.
pub trait AnalysisTask: Send + Sync {
    fn kind(&self) -> TaskKind;

    fn run(&self, message: &Message, context: &AnalysisContext) -> Result<TaskSuccess>;
}

//! Analysis result models
//!
//! One `AnalysisResult` aggregates the outcomes of all analysis tasks that
//! ran for a message. Individual task failures are recorded as error strings
//! on the result rather than failing the whole analysis.

use super::MessageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kinds of analysis performed per message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Categorize,
    DetectAction,
    MatchClient,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Categorize => "categorize",
            TaskKind::DetectAction => "detect_action",
            TaskKind::MatchClient => "match_client",
        }
    }
}

/// Category assigned to a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryFinding {
    pub category: String,
    pub confidence: f32,
}

/// Action detected in a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFinding {
    pub kind: String,
    pub title: String,
    pub urgency: f32,
    pub due_date: Option<DateTime<Utc>>,
    /// False when the task ran but found nothing actionable
    pub actionable: bool,
}

/// Known client matched to a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFinding {
    pub client_id: String,
    pub confidence: f32,
}

/// Data produced by a single successful analysis task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Finding {
    Category(CategoryFinding),
    Action(ActionFinding),
    Client(ClientFinding),
}

/// Per-task result carried back across the fan-out boundary.
///
/// A failed task has `finding: None` and an error string; no error type
/// crosses the thread boundary.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub kind: TaskKind,
    pub finding: Option<Finding>,
    pub cost_units: u64,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Error string recorded for a failed task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub task: String,
    pub message: String,
}

/// Aggregated analysis for one message, at most one per message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub message_id: MessageId,
    pub owner_id: String,
    pub category: Option<CategoryFinding>,
    pub action: Option<ActionFinding>,
    pub client_match: Option<ClientFinding>,
    pub task_errors: Vec<TaskError>,
    pub total_cost_units: u64,
    pub total_duration_ms: u64,
    pub analyzer_version: String,
    pub analyzed_at: DateTime<Utc>,
}

/// Lifecycle state of an action item (mutated by the outer application)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Open,
    Completed,
    Dismissed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Open => "open",
            ActionStatus::Completed => "completed",
            ActionStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => ActionStatus::Completed,
            "dismissed" => ActionStatus::Dismissed,
            _ => ActionStatus::Open,
        }
    }
}

/// A concrete follow-up derived from an actionable message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub message_id: MessageId,
    pub owner_id: String,
    pub kind: String,
    pub title: String,
    pub urgency: f32,
    pub due_date: Option<DateTime<Utc>>,
    pub status: ActionStatus,
}

/// A client the owner works with, used for client matching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: String,
    pub name: String,
    pub email_domains: Vec<String>,
}

/// Context handed to every analysis task alongside the message
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    pub owner_id: String,
    pub clients: Vec<ClientRecord>,
}

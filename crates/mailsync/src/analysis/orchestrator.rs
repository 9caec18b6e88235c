//! Analysis orchestration: fan out tasks, aggregate, persist
//!
//! All tasks run concurrently per message. A failed task degrades the
//! result instead of failing it; only when every task fails is the message
//! reported as unanalyzed. Side writes after the main upsert are each
//! best-effort and independent, there is no rollback.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use super::{AnalysisTask, TaskSuccess};
use crate::models::{
    ActionItem, ActionStatus, AnalysisContext, AnalysisResult, ClientRecord, Finding, Message,
    TaskError, TaskKind, TaskOutcome,
};
use crate::storage::MailStore;

/// What `process` did for one message
#[derive(Debug)]
pub struct AnalysisReport {
    /// True when at least one task succeeded and a result was persisted
    pub succeeded: bool,
    pub result: Option<AnalysisResult>,
    pub outcomes: Vec<TaskOutcome>,
}

/// Runs every configured task against a message and stores the aggregate
pub struct AnalysisOrchestrator {
    store: Arc<dyn MailStore>,
    tasks: Vec<Box<dyn AnalysisTask>>,
    clients: Vec<ClientRecord>,
    analyzer_version: String,
}

impl AnalysisOrchestrator {
    pub fn new(
        store: Arc<dyn MailStore>,
        tasks: Vec<Box<dyn AnalysisTask>>,
        clients: Vec<ClientRecord>,
        analyzer_version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            tasks,
            clients,
            analyzer_version: analyzer_version.into(),
        }
    }

    /// Analyze one message.
    ///
    /// Returns `Err` only when persisting the aggregated result fails. Task
    /// failures, including a full wipeout, come back through the report.
    pub fn process(&self, message: &Message) -> Result<AnalysisReport> {
        let context = AnalysisContext {
            owner_id: message.owner_id.clone(),
            clients: self.clients.clone(),
        };

        let outcomes = self.run_tasks(message, &context);
        let succeeded = outcomes.iter().any(|o| o.succeeded());

        if !succeeded {
            log::warn!(
                "All analysis tasks failed for message {}",
                message.id.as_str()
            );
            return Ok(AnalysisReport {
                succeeded: false,
                result: None,
                outcomes,
            });
        }

        let result = aggregate(message, &outcomes, &self.analyzer_version);
        self.store
            .upsert_analysis_result(result.clone())
            .context("Failed to persist analysis result")?;

        self.apply_side_writes(message, &result);

        Ok(AnalysisReport {
            succeeded: true,
            result: Some(result),
            outcomes,
        })
    }

    /// Run all tasks concurrently; every outcome comes back tagged, even a
    /// panic inside a task
    fn run_tasks(&self, message: &Message, context: &AnalysisContext) -> Vec<TaskOutcome> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .tasks
                .iter()
                .map(|task| {
                    let kind = task.kind();
                    let handle = scope.spawn(move || run_one(task.as_ref(), message, context));
                    (kind, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(kind, handle)| {
                    handle.join().unwrap_or_else(|_| TaskOutcome {
                        kind,
                        finding: None,
                        cost_units: 0,
                        duration_ms: 0,
                        error: Some("task panicked".to_string()),
                    })
                })
                .collect()
        })
    }

    /// Derived writes after the result row: action item, message category,
    /// client link, analyzed-at stamp. Each failure is logged on its own.
    fn apply_side_writes(&self, message: &Message, result: &AnalysisResult) {
        if let Some(action) = &result.action
            && action.actionable
        {
            let item = ActionItem {
                message_id: message.id.clone(),
                owner_id: message.owner_id.clone(),
                kind: action.kind.clone(),
                title: action.title.clone(),
                urgency: action.urgency,
                due_date: action.due_date,
                status: ActionStatus::Open,
            };
            if let Err(e) = self.store.insert_action_item(item) {
                log::warn!(
                    "Failed to create action item for message {}: {:#}",
                    message.id.as_str(),
                    e
                );
            }
        }

        if let Some(category) = &result.category {
            if let Err(e) =
                self.store
                    .set_message_category(&message.account_id, &message.id, &category.category)
            {
                log::warn!(
                    "Failed to set category on message {}: {:#}",
                    message.id.as_str(),
                    e
                );
            }
        }

        if let Some(client) = &result.client_match {
            if let Err(e) =
                self.store
                    .link_message_client(&message.account_id, &message.id, &client.client_id)
            {
                log::warn!(
                    "Failed to link client on message {}: {:#}",
                    message.id.as_str(),
                    e
                );
            }
        }

        if let Err(e) =
            self.store
                .mark_message_analyzed(&message.account_id, &message.id, result.analyzed_at)
        {
            log::warn!(
                "Failed to mark message {} analyzed: {:#}",
                message.id.as_str(),
                e
            );
        }
    }
}

fn run_one(task: &dyn AnalysisTask, message: &Message, context: &AnalysisContext) -> TaskOutcome {
    let kind = task.kind();
    let started = Instant::now();

    match task.run(message, context) {
        Ok(TaskSuccess {
            finding,
            cost_units,
        }) => TaskOutcome {
            kind,
            finding: Some(finding),
            cost_units,
            duration_ms: started.elapsed().as_millis() as u64,
            error: None,
        },
        Err(e) => {
            log::warn!(
                "Analysis task {} failed for message {}: {:#}",
                kind.as_str(),
                message.id.as_str(),
                e
            );
            TaskOutcome {
                kind,
                finding: None,
                cost_units: 0,
                duration_ms: started.elapsed().as_millis() as u64,
                error: Some(format!("{:#}", e)),
            }
        }
    }
}

/// Fold task outcomes into one result row
fn aggregate(message: &Message, outcomes: &[TaskOutcome], version: &str) -> AnalysisResult {
    let mut result = AnalysisResult {
        message_id: message.id.clone(),
        owner_id: message.owner_id.clone(),
        category: None,
        action: None,
        client_match: None,
        task_errors: Vec::new(),
        total_cost_units: 0,
        total_duration_ms: 0,
        analyzer_version: version.to_string(),
        analyzed_at: Utc::now(),
    };

    for outcome in outcomes {
        result.total_cost_units += outcome.cost_units;
        result.total_duration_ms += outcome.duration_ms;

        match &outcome.finding {
            Some(Finding::Category(f)) => result.category = Some(f.clone()),
            Some(Finding::Action(f)) => result.action = Some(f.clone()),
            Some(Finding::Client(f)) => result.client_match = Some(f.clone()),
            None => {}
        }

        if let Some(error) = &outcome.error {
            result.task_errors.push(TaskError {
                task: outcome.kind.as_str().to_string(),
                message: error.clone(),
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AccountId, ActionFinding, CategoryFinding, ClientFinding, MessageId,
    };
    use crate::storage::InMemoryMailStore;

    struct CategoryTask;

    impl AnalysisTask for CategoryTask {
        fn kind(&self) -> TaskKind {
            TaskKind::Categorize
        }

        fn run(&self, _message: &Message, _context: &AnalysisContext) -> Result<TaskSuccess> {
            Ok(TaskSuccess {
                finding: Finding::Category(CategoryFinding {
                    category: "client_communication".to_string(),
                    confidence: 0.9,
                }),
                cost_units: 5,
            })
        }
    }

    struct ActionTask {
        actionable: bool,
    }

    impl AnalysisTask for ActionTask {
        fn kind(&self) -> TaskKind {
            TaskKind::DetectAction
        }

        fn run(&self, _message: &Message, _context: &AnalysisContext) -> Result<TaskSuccess> {
            Ok(TaskSuccess {
                finding: Finding::Action(ActionFinding {
                    kind: "reply".to_string(),
                    title: "Reply to the sender".to_string(),
                    urgency: 0.7,
                    due_date: None,
                    actionable: self.actionable,
                }),
                cost_units: 7,
            })
        }
    }

    struct ClientTask;

    impl AnalysisTask for ClientTask {
        fn kind(&self) -> TaskKind {
            TaskKind::MatchClient
        }

        fn run(&self, _message: &Message, context: &AnalysisContext) -> Result<TaskSuccess> {
            let client = context
                .clients
                .first()
                .context("no clients in roster")?;
            Ok(TaskSuccess {
                finding: Finding::Client(ClientFinding {
                    client_id: client.id.clone(),
                    confidence: 0.8,
                }),
                cost_units: 3,
            })
        }
    }

    struct FailingTask(TaskKind);

    impl AnalysisTask for FailingTask {
        fn kind(&self) -> TaskKind {
            self.0
        }

        fn run(&self, _message: &Message, _context: &AnalysisContext) -> Result<TaskSuccess> {
            anyhow::bail!("model unavailable")
        }
    }

    struct PanickingTask(TaskKind);

    impl AnalysisTask for PanickingTask {
        fn kind(&self) -> TaskKind {
            self.0
        }

        fn run(&self, _message: &Message, _context: &AnalysisContext) -> Result<TaskSuccess> {
            panic!("boom")
        }
    }

    fn make_message() -> Message {
        Message::builder(MessageId::new("m1"), AccountId::new("acc-1"))
            .owner_id("user-1")
            .subject("Project update")
            .build()
    }

    fn seeded_store() -> Arc<InMemoryMailStore> {
        let store = Arc::new(InMemoryMailStore::new());
        store
            .upsert_account(crate::models::MailboxAccount::new(
                "acc-1",
                "user-1",
                "a@example.com",
            ))
            .unwrap();
        store.insert_message(make_message()).unwrap();
        store
    }

    fn roster() -> Vec<ClientRecord> {
        vec![ClientRecord {
            id: "client-1".to_string(),
            name: "Acme".to_string(),
            email_domains: vec!["acme.example".to_string()],
        }]
    }

    fn orchestrator(
        store: Arc<InMemoryMailStore>,
        tasks: Vec<Box<dyn AnalysisTask>>,
    ) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(store as Arc<dyn MailStore>, tasks, roster(), "v1")
    }

    #[test]
    fn test_all_tasks_succeed() {
        let store = seeded_store();
        let orch = orchestrator(
            Arc::clone(&store),
            vec![
                Box::new(CategoryTask),
                Box::new(ActionTask { actionable: true }),
                Box::new(ClientTask),
            ],
        );

        let report = orch.process(&make_message()).unwrap();
        assert!(report.succeeded);

        let result = report.result.unwrap();
        assert_eq!(result.total_cost_units, 15);
        assert!(result.task_errors.is_empty());
        assert_eq!(result.category.as_ref().unwrap().category, "client_communication");
        assert_eq!(result.client_match.as_ref().unwrap().client_id, "client-1");

        // Persisted and side writes applied
        assert!(
            store
                .get_analysis_result(&MessageId::new("m1"))
                .unwrap()
                .is_some()
        );
        let msg = store
            .get_message(&AccountId::new("acc-1"), &MessageId::new("m1"))
            .unwrap()
            .unwrap();
        assert_eq!(msg.category.as_deref(), Some("client_communication"));
        assert_eq!(msg.client_id.as_deref(), Some("client-1"));
        assert!(msg.analyzed_at.is_some());

        let items = store.list_action_items(&MessageId::new("m1")).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, ActionStatus::Open);
    }

    #[test]
    fn test_partial_failure_still_persists() {
        let store = seeded_store();
        let orch = orchestrator(
            Arc::clone(&store),
            vec![
                Box::new(CategoryTask),
                Box::new(FailingTask(TaskKind::DetectAction)),
                Box::new(FailingTask(TaskKind::MatchClient)),
            ],
        );

        let report = orch.process(&make_message()).unwrap();
        assert!(report.succeeded);

        let result = report.result.unwrap();
        assert!(result.category.is_some());
        assert!(result.action.is_none());
        assert_eq!(result.task_errors.len(), 2);

        // No action item from a failed detection
        assert!(
            store
                .list_action_items(&MessageId::new("m1"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_full_failure_persists_nothing() {
        let store = seeded_store();
        let orch = orchestrator(
            Arc::clone(&store),
            vec![
                Box::new(FailingTask(TaskKind::Categorize)),
                Box::new(FailingTask(TaskKind::DetectAction)),
                Box::new(FailingTask(TaskKind::MatchClient)),
            ],
        );

        let report = orch.process(&make_message()).unwrap();
        assert!(!report.succeeded);
        assert!(report.result.is_none());

        assert!(
            store
                .get_analysis_result(&MessageId::new("m1"))
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .list_action_items(&MessageId::new("m1"))
                .unwrap()
                .is_empty()
        );
        let msg = store
            .get_message(&AccountId::new("acc-1"), &MessageId::new("m1"))
            .unwrap()
            .unwrap();
        assert!(msg.analyzed_at.is_none());
    }

    #[test]
    fn test_panicking_task_is_isolated() {
        let store = seeded_store();
        let orch = orchestrator(
            Arc::clone(&store),
            vec![
                Box::new(CategoryTask),
                Box::new(PanickingTask(TaskKind::DetectAction)),
            ],
        );

        let report = orch.process(&make_message()).unwrap();
        assert!(report.succeeded);

        let result = report.result.unwrap();
        assert!(result.category.is_some());
        assert_eq!(result.task_errors.len(), 1);
        assert_eq!(result.task_errors[0].task, "detect_action");
    }

    #[test]
    fn test_unactionable_finding_creates_no_item() {
        let store = seeded_store();
        let orch = orchestrator(
            Arc::clone(&store),
            vec![Box::new(ActionTask { actionable: false })],
        );

        let report = orch.process(&make_message()).unwrap();
        assert!(report.succeeded);
        assert!(
            store
                .list_action_items(&MessageId::new("m1"))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_reprocess_overwrites_result() {
        let store = seeded_store();
        let orch = orchestrator(Arc::clone(&store), vec![Box::new(CategoryTask)]);

        orch.process(&make_message()).unwrap();
        orch.process(&make_message()).unwrap();

        let result = store
            .get_analysis_result(&MessageId::new("m1"))
            .unwrap()
            .unwrap();
        assert_eq!(result.total_cost_units, 5);
    }
}

use super::{OperatorLoader, TaskHandler, TaskOperator, TaskType};
use crate::alert::Alerter;
use crate::config::Config;
use crate::error::Result;
use crate::store::UrlStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// What the manager is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerStatus {
    Idle,
    Running(TaskType),
}

impl std::fmt::Display for ManagerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerStatus::Idle => write!(f, "idle"),
            ManagerStatus::Running(task_type) => write!(f, "{}", task_type),
        }
    }
}

/// Why the manager moved past an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    NoWork,
    Error,
    RepeatThreshold,
    PrerequisiteFailed,
}

/// One operator's share of a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorCycle {
    pub task_type: TaskType,
    pub runs: u32,
    pub errors: u32,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub operators: Vec<OperatorCycle>,
}

impl CycleReport {
    pub fn total_runs(&self) -> u32 {
        self.operators.iter().map(|o| o.runs).sum()
    }

    pub fn total_errors(&self) -> u32 {
        self.operators.iter().map(|o| o.errors).sum()
    }
}

/// Runs operators one at a time, each until it runs out of work.
///
/// An operator is re-run while its prerequisite holds. The loop for one
/// operator ends on no work, on an errored run, or once it has run more
/// than `repeat_threshold` times in the cycle; the last case raises an alert.
pub struct TaskManager {
    loader: OperatorLoader,
    handler: TaskHandler,
    repeat_threshold: u32,
    status: watch::Sender<ManagerStatus>,
}

impl TaskManager {
    pub fn new(loader: OperatorLoader, handler: TaskHandler, repeat_threshold: u32) -> Self {
        let (status, _) = watch::channel(ManagerStatus::Idle);
        Self {
            loader,
            handler,
            repeat_threshold,
            status,
        }
    }

    /// Wire a manager from configuration with live collaborators
    pub fn from_config(config: &Config, store: UrlStore, alerter: Arc<dyn Alerter>) -> Result<Self> {
        let loader = OperatorLoader::from_config(config, store.clone())?;
        let handler = TaskHandler::new(store, alerter);
        Ok(Self::new(loader, handler, config.tasks.repeat_threshold))
    }

    pub fn handler(&self) -> &TaskHandler {
        &self.handler
    }

    pub fn status(&self) -> ManagerStatus {
        *self.status.borrow()
    }

    /// Follow status changes from outside the manager
    pub fn watch_status(&self) -> watch::Receiver<ManagerStatus> {
        self.status.subscribe()
    }

    /// Run one full cycle over the currently enabled operators
    pub async fn run_tasks(&mut self) -> Result<CycleReport> {
        let operators = self.loader.load_operators();
        info!("Starting task cycle with {} operators", operators.len());
        let report = self.run_operators(&operators).await?;
        info!(
            "Task cycle finished: {} runs, {} errors",
            report.total_runs(),
            report.total_errors()
        );
        Ok(report)
    }

    /// Run a cycle over an explicit operator list, in order
    pub async fn run_operators<O: TaskOperator>(&mut self, operators: &[O]) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let mut result = Ok(());
        for operator in operators {
            match self.run_operator(operator).await {
                Ok(cycle) => report.operators.push(cycle),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.status.send_replace(ManagerStatus::Idle);
        result.map(|_| report)
    }

    async fn run_operator<O: TaskOperator>(&mut self, operator: &O) -> Result<OperatorCycle> {
        let task_type = operator.task_type();
        let mut cycle = OperatorCycle {
            task_type,
            runs: 0,
            errors: 0,
            stop_reason: StopReason::NoWork,
        };
        self.status.send_replace(ManagerStatus::Running(task_type));

        loop {
            match operator.meets_task_prerequisites().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!("Prerequisite check for {} failed: {}", task_type, e);
                    self.handler.alert(&format!(
                        "Prerequisite check for {} failed: {}",
                        task_type, e
                    ));
                    cycle.stop_reason = StopReason::PrerequisiteFailed;
                    break;
                }
            }

            if cycle.runs > self.repeat_threshold {
                warn!(
                    "{} still has work after {} runs, moving on",
                    task_type, cycle.runs
                );
                self.handler.alert(&format!(
                    "Task {} has been run more than {} times in a row. Task loop terminated.",
                    task_type, self.repeat_threshold
                ));
                cycle.stop_reason = StopReason::RepeatThreshold;
                break;
            }

            let task_id = self.handler.initiate_task(task_type).await?;
            let run_info = operator.run_task(task_id).await;
            self.handler.handle_outcome(&run_info).await?;
            cycle.runs += 1;

            if run_info.is_error() {
                cycle.errors += 1;
                cycle.stop_reason = StopReason::Error;
                break;
            }
        }

        Ok(cycle)
    }
}

use super::{
    FunctionTrigger, RunInfo, TaskHandler, TaskOperator, TaskReport, TaskRun, TaskType,
    TriggerResult,
};
use crate::config::ScheduleConfig;
use crate::error::Result;
use crate::store::UrlStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Gap between the first firing of consecutive registry entries
const START_LAG: Duration = Duration::from_secs(60);

/// Operators fired on a timer rather than by eligibility
pub enum ScheduledOperator {
    /// Fire the URL task trigger
    RunUrlTasks(Arc<FunctionTrigger>),
    /// Record the current pending backlog size
    PopulateBacklogSnapshot(UrlStore),
}

#[async_trait]
impl TaskOperator for ScheduledOperator {
    fn task_type(&self) -> TaskType {
        match self {
            ScheduledOperator::RunUrlTasks(_) => TaskType::RunUrlTasks,
            ScheduledOperator::PopulateBacklogSnapshot(_) => TaskType::PopulateBacklogSnapshot,
        }
    }

    async fn meets_task_prerequisites(&self) -> Result<bool> {
        Ok(true)
    }

    async fn inner_task_logic(&self, _run: &mut TaskRun) -> Result<TaskReport> {
        match self {
            ScheduledOperator::RunUrlTasks(trigger) => match trigger.trigger_or_rerun().await? {
                TriggerResult::Ran(report) => Ok(TaskReport::Completed(format!(
                    "URL task cycle ran {} tasks with {} errors",
                    report.total_runs(),
                    report.total_errors()
                ))),
                TriggerResult::Queued => Ok(TaskReport::Completed(
                    "URL task cycle already running, rerun queued".to_string(),
                )),
            },
            ScheduledOperator::PopulateBacklogSnapshot(store) => {
                let pending = store.insert_backlog_snapshot().await?;
                Ok(TaskReport::Completed(format!(
                    "Backlog snapshot: {} pending URLs",
                    pending
                )))
            }
        }
    }

    fn links_urls(&self) -> bool {
        false
    }
}

/// Run a scheduled operator once under its own task record
pub async fn run_scheduled(handler: &TaskHandler, operator: &ScheduledOperator) -> Result<RunInfo> {
    let task_id = handler.initiate_task(operator.task_type()).await?;
    let run_info = operator.run_task(task_id).await;
    handler.handle_outcome(&run_info).await?;
    Ok(run_info)
}

struct ScheduledEntry {
    operator: Arc<ScheduledOperator>,
    interval: Duration,
}

/// Timer-driven operators, each on its own fixed interval
pub struct ScheduledTaskRegistry {
    handler: TaskHandler,
    entries: Vec<ScheduledEntry>,
    start_lag: Duration,
}

impl ScheduledTaskRegistry {
    pub fn new(handler: TaskHandler) -> Self {
        Self {
            handler,
            entries: Vec::new(),
            start_lag: START_LAG,
        }
    }

    /// The standard entries: URL task cycles and backlog snapshots
    pub fn from_config(
        config: &ScheduleConfig,
        handler: TaskHandler,
        trigger: Arc<FunctionTrigger>,
    ) -> Self {
        let store = handler.store().clone();
        Self::new(handler)
            .register(
                ScheduledOperator::RunUrlTasks(trigger),
                Duration::from_secs(config.run_url_tasks_interval_mins * 60),
            )
            .register(
                ScheduledOperator::PopulateBacklogSnapshot(store),
                Duration::from_secs(config.backlog_snapshot_interval_mins * 60),
            )
    }

    pub fn register(mut self, operator: ScheduledOperator, interval: Duration) -> Self {
        self.entries.push(ScheduledEntry {
            operator: Arc::new(operator),
            interval,
        });
        self
    }

    /// Delay added per entry before its first firing
    pub fn with_start_lag(mut self, lag: Duration) -> Self {
        self.start_lag = lag;
        self
    }

    pub fn task_types(&self) -> Vec<TaskType> {
        self.entries.iter().map(|e| e.operator.task_type()).collect()
    }

    /// Spawn one timer loop per entry; entry `n` first fires after `n` lags
    pub fn start(self) -> ScheduledHandle {
        let mut handles = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.into_iter().enumerate() {
            let handler = self.handler.clone();
            let delay = self.start_lag * index as u32;
            info!(
                "Scheduling {} every {:?} (first run in {:?})",
                entry.operator.task_type(),
                entry.interval,
                delay
            );
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut ticker = tokio::time::interval(entry.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if let Err(e) = run_scheduled(&handler, &entry.operator).await {
                        error!(
                            "Scheduled task {} failed to record: {}",
                            entry.operator.task_type(),
                            e
                        );
                    }
                }
            }));
        }
        ScheduledHandle { handles }
    }
}

/// Running timer loops; dropping the handle leaves them running
pub struct ScheduledHandle {
    handles: Vec<JoinHandle<()>>,
}

impl ScheduledHandle {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

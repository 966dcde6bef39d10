use super::{RunInfo, TaskOutcome, TaskType};
use crate::alert::Alerter;
use crate::error::Result;
use crate::store::{TaskStatus, UrlStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Opens task records and concludes them from a run's result
#[derive(Clone)]
pub struct TaskHandler {
    store: UrlStore,
    alerter: Arc<dyn Alerter>,
}

impl TaskHandler {
    pub fn new(store: UrlStore, alerter: Arc<dyn Alerter>) -> Self {
        Self { store, alerter }
    }

    pub fn store(&self) -> &UrlStore {
        &self.store
    }

    /// Create the task record a run will write under
    pub async fn initiate_task(&self, task_type: TaskType) -> Result<i64> {
        self.store.create_task(task_type).await
    }

    /// Persist a run's links and final status.
    ///
    /// URLs are linked on both outcomes so a failed task still shows what it touched.
    pub async fn handle_outcome(&self, run_info: &RunInfo) -> Result<()> {
        self.store
            .link_urls_to_task(run_info.task_id, &run_info.linked_url_ids)
            .await?;

        match run_info.outcome {
            TaskOutcome::Success => {
                self.store
                    .update_task_status(run_info.task_id, TaskStatus::ReadyToLabel)
                    .await?;
                info!(
                    "Task {} ({}) completed: {}",
                    run_info.task_id, run_info.task_type, run_info.message
                );
            }
            TaskOutcome::Error => {
                self.store
                    .update_task_status(run_info.task_id, TaskStatus::Error)
                    .await?;
                self.store
                    .add_task_error(run_info.task_id, &run_info.message)
                    .await?;
                self.alert(&format!(
                    "Task {} ({}) failed with error: {}",
                    run_info.task_id, run_info.task_type, run_info.message
                ));
            }
        }
        debug!(
            "Task {} linked to {} URLs",
            run_info.task_id,
            run_info.linked_url_ids.len()
        );
        Ok(())
    }

    pub fn alert(&self, message: &str) {
        self.alerter.post(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::recording::RecordingAlerter;
    use crate::store::tests::setup_test_store;
    use crate::store::UrlSource;

    #[tokio::test]
    async fn test_success_marks_ready_to_label() {
        let (store, _tmp) = setup_test_store().await;
        let url_id = store
            .add_url("https://a.com", UrlSource::Manual, None)
            .await
            .unwrap();
        let alerter = Arc::new(RecordingAlerter::default());
        let handler = TaskHandler::new(store.clone(), alerter.clone());

        let task_id = handler.initiate_task(TaskType::Html).await.unwrap();
        handler
            .handle_outcome(&RunInfo {
                task_id,
                task_type: TaskType::Html,
                outcome: TaskOutcome::Success,
                message: "scraped 1 URL".to_string(),
                linked_url_ids: vec![url_id],
            })
            .await
            .unwrap();

        let task = store.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.get_status().unwrap(), TaskStatus::ReadyToLabel);
        assert_eq!(store.get_task_url_ids(task_id).await.unwrap(), vec![url_id]);
        assert!(store.get_task_errors(task_id).await.unwrap().is_empty());
        assert!(alerter.messages().is_empty());
    }

    #[tokio::test]
    async fn test_error_records_and_alerts() {
        let (store, _tmp) = setup_test_store().await;
        let url_id = store
            .add_url("https://a.com", UrlSource::Manual, None)
            .await
            .unwrap();
        let alerter = Arc::new(RecordingAlerter::default());
        let handler = TaskHandler::new(store.clone(), alerter.clone());

        let task_id = handler.initiate_task(TaskType::Probe).await.unwrap();
        handler
            .handle_outcome(&RunInfo {
                task_id,
                task_type: TaskType::Probe,
                outcome: TaskOutcome::Error,
                message: "Probe batch timed out after 600s".to_string(),
                linked_url_ids: vec![url_id],
            })
            .await
            .unwrap();

        let task = store.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.get_status().unwrap(), TaskStatus::Error);
        assert_eq!(
            store.get_task_errors(task_id).await.unwrap(),
            vec!["Probe batch timed out after 600s".to_string()]
        );
        assert_eq!(store.get_task_url_ids(task_id).await.unwrap(), vec![url_id]);

        let messages = alerter.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with(&format!("Task {} (probe) failed with error", task_id)));
    }
}

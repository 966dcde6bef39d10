use super::{has_eligible, select_eligible};
use crate::error::Result;
use crate::external::{DataSourcesApi, SubmissionRequest, SubmissionResult};
use crate::store::{tx, UrlStatus, UrlStore};
use crate::tasks::{TaskOperator, TaskReport, TaskRun, TaskType};
use async_trait::async_trait;
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const ELIGIBLE: &str = r#"
    FROM urls u
    WHERE u.status = 'validated'
      AND NOT EXISTS (
          SELECT 1 FROM url_error_info e
          JOIN tasks t ON t.id = e.task_id
          WHERE e.url_id = u.id AND t.task_type = 'submit_approved'
      )
"#;

const SUBMISSION_ROW: &str = r#"
    SELECT u.id AS url_id, u.url, u.name, u.description,
        COALESCE(u.record_type, s.record_type) AS record_type,
        m.record_formats, m.data_portal_type, m.supplying_entity
    FROM urls u
    LEFT JOIN url_optional_metadata m ON m.url_id = u.id
    LEFT JOIN auto_record_type_suggestions s ON s.url_id = u.id
    WHERE u.id = ?
"#;

#[derive(Debug, FromRow)]
struct SubmissionRow {
    url_id: i64,
    url: String,
    name: Option<String>,
    description: Option<String>,
    record_type: Option<String>,
    record_formats: Option<String>,
    data_portal_type: Option<String>,
    supplying_entity: Option<String>,
}

impl From<SubmissionRow> for SubmissionRequest {
    fn from(row: SubmissionRow) -> Self {
        let record_formats = row
            .record_formats
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        SubmissionRequest {
            url_id: row.url_id,
            url: row.url,
            name: row.name,
            description: row.description,
            record_type: row.record_type,
            record_formats,
            data_portal_type: row.data_portal_type,
            supplying_entity: row.supplying_entity,
        }
    }
}

/// Submits validated URLs to the data-sources catalogue
pub struct SubmitApprovedOperator {
    store: UrlStore,
    api: Arc<dyn DataSourcesApi>,
    batch_size: i64,
}

impl SubmitApprovedOperator {
    pub fn new(store: UrlStore, api: Arc<dyn DataSourcesApi>, batch_size: i64) -> Self {
        Self {
            store,
            api,
            batch_size,
        }
    }

    async fn build_requests(&self, url_ids: &[i64]) -> Result<Vec<SubmissionRequest>> {
        let mut requests = Vec::with_capacity(url_ids.len());
        for url_id in url_ids {
            let row = sqlx::query_as::<_, SubmissionRow>(SUBMISSION_ROW)
                .bind(url_id)
                .fetch_optional(self.store.pool())
                .await?;
            if let Some(row) = row {
                requests.push(row.into());
            }
        }
        Ok(requests)
    }
}

#[async_trait]
impl TaskOperator for SubmitApprovedOperator {
    fn task_type(&self) -> TaskType {
        TaskType::SubmitApproved
    }

    async fn meets_task_prerequisites(&self) -> Result<bool> {
        has_eligible(&self.store, ELIGIBLE, None).await
    }

    async fn inner_task_logic(&self, run: &mut TaskRun) -> Result<TaskReport> {
        let urls = select_eligible(&self.store, ELIGIBLE, None, self.batch_size).await?;
        if urls.is_empty() {
            return Ok(TaskReport::NoEligibleUrls);
        }
        let ids: Vec<i64> = urls.iter().map(|u| u.url_id).collect();
        run.link_urls_to_task(ids.iter().copied());

        let requests = self.build_requests(&ids).await?;
        let mut results: HashMap<i64, SubmissionResult> = self
            .api
            .submit_urls(&requests)
            .await?
            .into_iter()
            .map(|r| (r.url_id, r))
            .collect();

        let mut submitted = 0;
        let mut tx = self.store.begin().await?;
        for request in &requests {
            let outcome = results.remove(&request.url_id);
            match outcome {
                Some(SubmissionResult {
                    data_source_id: Some(data_source_id),
                    error: None,
                    ..
                }) => {
                    tx::update_url_status(&mut tx, request.url_id, UrlStatus::Submitted).await?;
                    tx::insert_data_source(&mut tx, request.url_id, data_source_id).await?;
                    submitted += 1;
                }
                other => {
                    let error = other
                        .and_then(|r| r.error)
                        .unwrap_or_else(|| "No data source id returned".to_string());
                    warn!("Submission of {} failed: {}", request.url, error);
                    tx::add_url_error(&mut tx, run.task_id(), request.url_id, &error).await?;
                }
            }
        }
        tx.commit().await?;

        info!("Submitted {} of {} validated URLs", submitted, requests.len());
        Ok(TaskReport::Completed(format!(
            "Submitted {} of {} URLs",
            submitted,
            requests.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mock::MockDataSources;
    use crate::store::tests::setup_test_store;
    use crate::store::UrlSource;
    use crate::tasks::TaskOutcome;

    async fn validated(store: &UrlStore, url: &str) -> i64 {
        let id = store.add_url(url, UrlSource::Collector, None).await.unwrap();
        store.set_url_status(id, UrlStatus::Validated).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_successful_submission() {
        let (store, _tmp) = setup_test_store().await;
        let id = validated(&store, "https://pd.gov/data").await;

        let op = SubmitApprovedOperator::new(store.clone(), Arc::new(MockDataSources::default()), 100);
        let info = op.run_task(store.create_task(TaskType::SubmitApproved).await.unwrap()).await;
        assert_eq!(info.outcome, TaskOutcome::Success);

        let url = store.get_url(id).await.unwrap().unwrap();
        assert_eq!(url.get_status().unwrap(), UrlStatus::Submitted);
        let data_source_id: i64 =
            sqlx::query_scalar("SELECT data_source_id FROM url_data_sources WHERE url_id = ?")
                .bind(id)
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(data_source_id, 1000 + id);
        assert!(!op.meets_task_prerequisites().await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_submission_is_not_retried() {
        let (store, _tmp) = setup_test_store().await;
        let ok = validated(&store, "https://pd.gov/a").await;
        let bad = validated(&store, "https://pd.gov/b").await;
        let api = MockDataSources {
            submit_errors: HashMap::from([(bad, "record type missing".to_string())]),
            ..Default::default()
        };

        let op = SubmitApprovedOperator::new(store.clone(), Arc::new(api), 100);
        let task_id = store.create_task(TaskType::SubmitApproved).await.unwrap();
        let info = op.run_task(task_id).await;
        assert_eq!(info.outcome, TaskOutcome::Success);
        assert_eq!(info.linked_url_ids, vec![ok, bad]);

        let bad_row = store.get_url(bad).await.unwrap().unwrap();
        assert_eq!(bad_row.get_status().unwrap(), UrlStatus::Validated);
        let errors = store.get_url_errors(bad).await.unwrap();
        assert_eq!(errors[0].error, "record type missing");
        assert_eq!(errors[0].task_id, task_id);
        assert!(!op.meets_task_prerequisites().await.unwrap());
    }
}

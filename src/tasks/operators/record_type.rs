use super::{classifier_inputs, has_eligible, select_eligible};
use crate::error::Result;
use crate::external::RecordTypeClassifier;
use crate::progress::{advance_progress, finish_progress, start_batch_progress};
use crate::store::{tx, UrlStore};
use crate::tasks::{error_chain, TaskOperator, TaskReport, TaskRun, TaskType};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const ELIGIBLE: &str = r#"
    FROM urls u
    WHERE u.status = 'pending'
      AND EXISTS (SELECT 1 FROM url_html_content h WHERE h.url_id = u.id)
      AND NOT EXISTS (SELECT 1 FROM auto_record_type_suggestions s WHERE s.url_id = u.id)
      AND NOT EXISTS (
          SELECT 1 FROM url_error_info e
          JOIN tasks t ON t.id = e.task_id
          WHERE e.url_id = u.id AND t.task_type = 'record_type'
      )
"#;

/// Suggests a record type for scraped pages
pub struct RecordTypeOperator {
    store: UrlStore,
    classifier: Arc<dyn RecordTypeClassifier>,
    batch_size: i64,
}

impl RecordTypeOperator {
    pub fn new(store: UrlStore, classifier: Arc<dyn RecordTypeClassifier>, batch_size: i64) -> Self {
        Self {
            store,
            classifier,
            batch_size,
        }
    }
}

#[async_trait]
impl TaskOperator for RecordTypeOperator {
    fn task_type(&self) -> TaskType {
        TaskType::RecordType
    }

    async fn meets_task_prerequisites(&self) -> Result<bool> {
        has_eligible(&self.store, ELIGIBLE, None).await
    }

    async fn inner_task_logic(&self, run: &mut TaskRun) -> Result<TaskReport> {
        let urls = select_eligible(&self.store, ELIGIBLE, None, self.batch_size).await?;
        let inputs = classifier_inputs(&self.store, &urls).await?;
        if inputs.is_empty() {
            return Ok(TaskReport::NoEligibleUrls);
        }
        run.link_urls_to_task(inputs.iter().map(|i| i.url_id));

        let mut results = Vec::with_capacity(inputs.len());
        let pb = start_batch_progress(inputs.len(), "Classifying record types");
        for input in &inputs {
            results.push((input.url_id, self.classifier.classify(input).await));
            advance_progress(&pb);
        }
        finish_progress(pb);

        let mut suggested = 0;
        let mut tx = self.store.begin().await?;
        for (url_id, result) in results {
            match result {
                Ok(record_type) => {
                    tx::insert_record_type_suggestion(&mut tx, url_id, record_type).await?;
                    suggested += 1;
                }
                Err(e) => {
                    tx::add_url_error(&mut tx, run.task_id(), url_id, &error_chain(&e)).await?;
                }
            }
        }
        tx.commit().await?;

        info!("Suggested record types for {} of {} URLs", suggested, inputs.len());
        Ok(TaskReport::Completed(format!(
            "Suggested record types for {} of {} URLs",
            suggested,
            inputs.len()
        )))
    }
}

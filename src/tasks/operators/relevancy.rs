use super::{classifier_inputs, has_eligible, select_eligible};
use crate::error::Result;
use crate::external::RelevancyClassifier;
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
      AND NOT EXISTS (SELECT 1 FROM auto_relevant_suggestions s WHERE s.url_id = u.id)
      AND NOT EXISTS (
          SELECT 1 FROM url_error_info e
          JOIN tasks t ON t.id = e.task_id
          WHERE e.url_id = u.id AND t.task_type = 'relevancy'
      )
"#;

/// Annotates scraped pages as relevant or not
pub struct RelevancyOperator {
    store: UrlStore,
    classifier: Arc<dyn RelevancyClassifier>,
    batch_size: i64,
}

impl RelevancyOperator {
    pub fn new(store: UrlStore, classifier: Arc<dyn RelevancyClassifier>, batch_size: i64) -> Self {
        Self {
            store,
            classifier,
            batch_size,
        }
    }
}

#[async_trait]
impl TaskOperator for RelevancyOperator {
    fn task_type(&self) -> TaskType {
        TaskType::Relevancy
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

        let mut annotations = Vec::with_capacity(inputs.len());
        let pb = start_batch_progress(inputs.len(), "Annotating relevancy");
        for input in &inputs {
            annotations.push((input.url_id, self.classifier.annotate(input).await));
            advance_progress(&pb);
        }
        finish_progress(pb);

        let mut relevant = 0;
        let mut errored = 0;
        let mut tx = self.store.begin().await?;
        for (url_id, annotation) in annotations {
            match annotation {
                Ok(a) => {
                    if a.is_relevant {
                        relevant += 1;
                    }
                    tx::insert_relevant_suggestion(
                        &mut tx,
                        url_id,
                        a.is_relevant,
                        a.confidence,
                        a.model_name.as_deref(),
                    )
                    .await?;
                }
                Err(e) => {
                    errored += 1;
                    tx::add_url_error(&mut tx, run.task_id(), url_id, &error_chain(&e)).await?;
                }
            }
        }
        tx.commit().await?;

        info!(
            "Annotated {} URLs: {} relevant, {} errors",
            inputs.len(),
            relevant,
            errored
        );
        Ok(TaskReport::Completed(format!(
            "Annotated {} URLs, {} relevant",
            inputs.len() - errored,
            relevant
        )))
    }
}

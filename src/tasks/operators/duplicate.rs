use super::{has_eligible, select_eligible};
use crate::error::{Error, Result};
use crate::external::DataSourcesApi;
use crate::progress::{advance_progress, finish_progress, start_batch_progress};
use crate::store::{tx, UrlStatus, UrlStore};
use crate::tasks::{TaskOperator, TaskReport, TaskRun, TaskType};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

const ELIGIBLE: &str = r#"
    FROM urls u
    WHERE u.status = 'pending'
      AND NOT EXISTS (SELECT 1 FROM url_checked_for_duplicates d WHERE d.url_id = u.id)
"#;

/// Asks the data-sources catalogue whether pending URLs are already known
pub struct DuplicateOperator {
    store: UrlStore,
    api: Arc<dyn DataSourcesApi>,
    batch_size: i64,
}

impl DuplicateOperator {
    pub fn new(store: UrlStore, api: Arc<dyn DataSourcesApi>, batch_size: i64) -> Self {
        Self {
            store,
            api,
            batch_size,
        }
    }
}

#[async_trait]
impl TaskOperator for DuplicateOperator {
    fn task_type(&self) -> TaskType {
        TaskType::Duplicate
    }

    async fn meets_task_prerequisites(&self) -> Result<bool> {
        has_eligible(&self.store, ELIGIBLE, None).await
    }

    async fn inner_task_logic(&self, run: &mut TaskRun) -> Result<TaskReport> {
        let urls = select_eligible(&self.store, ELIGIBLE, None, self.batch_size).await?;
        if urls.is_empty() {
            return Ok(TaskReport::NoEligibleUrls);
        }

        let mut checked = Vec::with_capacity(urls.len());
        let mut duplicates = Vec::new();
        let pb = start_batch_progress(urls.len(), "Checking duplicates");
        for url in &urls {
            match self.api.is_url_duplicate(&url.url).await {
                Ok(is_duplicate) => {
                    checked.push(url.url_id);
                    if is_duplicate {
                        duplicates.push(url.url_id);
                    }
                }
                Err(Error::RateLimited(msg)) => {
                    warn!(
                        "Rate limited after {} duplicate checks, keeping partial results: {}",
                        checked.len(),
                        msg
                    );
                    break;
                }
                Err(e) => {
                    finish_progress(pb);
                    return Err(e);
                }
            }
            advance_progress(&pb);
        }
        finish_progress(pb);
        run.link_urls_to_task(checked.iter().copied());

        let mut tx = self.store.begin().await?;
        for url_id in &duplicates {
            tx::update_url_status(&mut tx, *url_id, UrlStatus::Duplicate).await?;
        }
        tx::mark_checked_for_duplicates(&mut tx, &checked).await?;
        tx.commit().await?;

        info!(
            "Checked {} URLs for duplicates, {} found",
            checked.len(),
            duplicates.len()
        );
        Ok(TaskReport::Completed(format!(
            "Checked {} URLs, {} duplicates",
            checked.len(),
            duplicates.len()
        )))
    }
}

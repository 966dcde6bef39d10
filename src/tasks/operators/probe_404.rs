use super::{has_eligible, select_eligible};
use crate::error::Result;
use crate::probe::RequestInterface;
use crate::store::{now, timestamp, tx, UrlStatus, UrlStore};
use crate::tasks::{TaskOperator, TaskReport, TaskRun, TaskType};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;

const ELIGIBLE: &str = r#"
    FROM urls u
    LEFT JOIN url_probed_for_404 p ON p.url_id = u.id
    WHERE u.status = 'pending'
      AND (p.url_id IS NULL OR p.last_probed_at < ?)
"#;

/// Re-checks pending URLs for 404s, at most once per window
pub struct Probe404Operator {
    store: UrlStore,
    requests: Arc<dyn RequestInterface>,
    batch_size: i64,
    window_days: i64,
}

impl Probe404Operator {
    pub fn new(
        store: UrlStore,
        requests: Arc<dyn RequestInterface>,
        batch_size: i64,
        window_days: i64,
    ) -> Self {
        Self {
            store,
            requests,
            batch_size,
            window_days,
        }
    }

    fn cutoff(&self) -> String {
        timestamp(Utc::now() - Duration::days(self.window_days))
    }
}

#[async_trait]
impl TaskOperator for Probe404Operator {
    fn task_type(&self) -> TaskType {
        TaskType::Probe404
    }

    async fn meets_task_prerequisites(&self) -> Result<bool> {
        has_eligible(&self.store, ELIGIBLE, Some(&self.cutoff())).await
    }

    async fn inner_task_logic(&self, run: &mut TaskRun) -> Result<TaskReport> {
        let urls =
            select_eligible(&self.store, ELIGIBLE, Some(&self.cutoff()), self.batch_size).await?;
        if urls.is_empty() {
            return Ok(TaskReport::NoEligibleUrls);
        }
        run.link_urls_to_task(urls.iter().map(|u| u.url_id));

        let requested: Vec<String> = urls.iter().map(|u| u.url.clone()).collect();
        let responses = self.requests.check_status(&requested).await?;

        let not_found: Vec<i64> = urls
            .iter()
            .filter(|u| {
                responses
                    .iter()
                    .any(|r| r.url == u.url && r.status_code == Some(404))
            })
            .map(|u| u.url_id)
            .collect();
        let probed: Vec<i64> = urls.iter().map(|u| u.url_id).collect();

        let mut tx = self.store.begin().await?;
        for url_id in &not_found {
            tx::update_url_status(&mut tx, *url_id, UrlStatus::NotFound).await?;
        }
        tx::mark_probed_for_404(&mut tx, &probed, &now()).await?;
        tx.commit().await?;

        info!(
            "Probed {} URLs for 404, {} not found",
            probed.len(),
            not_found.len()
        );
        Ok(TaskReport::Completed(format!(
            "Probed {} URLs for 404, {} not found",
            probed.len(),
            not_found.len()
        )))
    }
}

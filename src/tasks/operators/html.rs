use super::{has_eligible, select_eligible};
use crate::error::{Error, Result};
use crate::parse::parse_html_info;
use crate::probe::{HtmlResponse, RequestInterface};
use crate::store::{tx, ScrapeStatus, UrlStatus, UrlStore};
use crate::tasks::{TaskOperator, TaskReport, TaskRun, TaskType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const ELIGIBLE: &str = r#"
    FROM urls u
    WHERE u.status = 'pending'
      AND NOT EXISTS (SELECT 1 FROM url_scrape_info s WHERE s.url_id = u.id)
"#;

/// Fetches pending pages and stores the fields classifiers read
pub struct HtmlOperator {
    store: UrlStore,
    requests: Arc<dyn RequestInterface>,
    batch_size: i64,
}

impl HtmlOperator {
    pub fn new(store: UrlStore, requests: Arc<dyn RequestInterface>, batch_size: i64) -> Self {
        Self {
            store,
            requests,
            batch_size,
        }
    }
}

#[async_trait]
impl TaskOperator for HtmlOperator {
    fn task_type(&self) -> TaskType {
        TaskType::Html
    }

    async fn meets_task_prerequisites(&self) -> Result<bool> {
        has_eligible(&self.store, ELIGIBLE, None).await
    }

    async fn inner_task_logic(&self, run: &mut TaskRun) -> Result<TaskReport> {
        let urls = select_eligible(&self.store, ELIGIBLE, None, self.batch_size).await?;
        if urls.is_empty() {
            return Ok(TaskReport::NoEligibleUrls);
        }
        run.link_urls_to_task(urls.iter().map(|u| u.url_id));

        let requested: Vec<String> = urls.iter().map(|u| u.url.clone()).collect();
        let mut responses: HashMap<String, HtmlResponse> = self
            .requests
            .fetch_html(&requested)
            .await?
            .into_iter()
            .map(|r| (r.url.clone(), r))
            .collect();

        let mut scraped = 0;
        let mut not_found = 0;
        let mut tx = self.store.begin().await?;
        for url in &urls {
            let response = responses
                .remove(&url.url)
                .ok_or_else(|| Error::MissingProbeResult(url.url.clone()))?;

            match (&response.html, &response.error) {
                (Some(html), None) => {
                    let info = parse_html_info(html, response.content_type.as_deref());
                    let fields: Vec<(String, String)> = info
                        .fields()
                        .into_iter()
                        .map(|(field, content)| (field.to_string(), content))
                        .collect();
                    tx::upsert_html_content(&mut tx, url.url_id, &fields).await?;
                    tx::mark_scraped(&mut tx, url.url_id, ScrapeStatus::Success).await?;
                    scraped += 1;
                }
                _ => {
                    let error = response
                        .error
                        .clone()
                        .unwrap_or_else(|| "Empty response body".to_string());
                    debug!("Could not scrape {}: {}", url.url, error);
                    tx::mark_scraped(&mut tx, url.url_id, ScrapeStatus::Error).await?;
                    tx::add_url_error(&mut tx, run.task_id(), url.url_id, &error).await?;
                    if response.status_code == Some(404) {
                        tx::update_url_status(&mut tx, url.url_id, UrlStatus::NotFound).await?;
                        not_found += 1;
                    }
                }
            }
        }
        tx.commit().await?;

        info!(
            "Scraped {} of {} pages ({} not found)",
            scraped,
            urls.len(),
            not_found
        );
        Ok(TaskReport::Completed(format!(
            "Scraped {} of {} pages",
            scraped,
            urls.len()
        )))
    }
}

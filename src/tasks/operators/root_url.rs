use super::{has_eligible, select_eligible};
use crate::error::Result;
use crate::store::{tx, UrlSource, UrlStore};
use crate::tasks::{TaskOperator, TaskReport, TaskRun, TaskType};
use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

const ELIGIBLE: &str = r#"
    FROM urls u
    WHERE NOT EXISTS (SELECT 1 FROM flag_root_urls f WHERE f.url_id = u.id)
      AND NOT EXISTS (SELECT 1 FROM link_urls_root_url l WHERE l.url_id = u.id)
      AND NOT EXISTS (
          SELECT 1 FROM url_error_info e
          JOIN tasks t ON t.id = e.task_id
          WHERE e.url_id = u.id AND t.task_type = 'root_url'
      )
"#;

/// Scheme, host and port of a URL, without a trailing slash
pub fn extract_root_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)?;
    let host = parsed
        .host_str()
        .ok_or(crate::error::Error::UrlParse(url::ParseError::EmptyHost))?;
    Ok(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Flags root URLs and links every other URL to its root
pub struct RootUrlOperator {
    store: UrlStore,
    batch_size: i64,
}

impl RootUrlOperator {
    pub fn new(store: UrlStore, batch_size: i64) -> Self {
        Self { store, batch_size }
    }
}

#[async_trait]
impl TaskOperator for RootUrlOperator {
    fn task_type(&self) -> TaskType {
        TaskType::RootUrl
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

        let mut roots = 0;
        let mut branches = 0;
        let mut tx = self.store.begin().await?;
        for url in &urls {
            let root = match extract_root_url(&url.url) {
                Ok(root) => root,
                Err(e) => {
                    debug!("No root URL for {}: {}", url.url, e);
                    tx::add_url_error(&mut tx, run.task_id(), url.url_id, &e.to_string()).await?;
                    continue;
                }
            };

            if url.url.trim_end_matches('/') == root {
                tx::flag_root_url(&mut tx, url.url_id).await?;
                roots += 1;
            } else {
                let root_id = tx::get_or_insert_url(&mut tx, &root, UrlSource::RootUrl).await?;
                tx::flag_root_url(&mut tx, root_id).await?;
                tx::link_root_url(&mut tx, url.url_id, root_id).await?;
                branches += 1;
            }
        }
        tx.commit().await?;

        info!("Flagged {} root URLs, linked {} branch URLs", roots, branches);
        Ok(TaskReport::Completed(format!(
            "{} root URLs, {} linked to a root",
            roots, branches
        )))
    }
}

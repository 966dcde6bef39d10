use super::{has_eligible, load_html_info, select_eligible};
use crate::error::{Error, Result};
use crate::store::{tx, OptionalMetadata, UrlStore};
use crate::tasks::{TaskOperator, TaskReport, TaskRun, TaskType};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

const ELIGIBLE: &str = r#"
    FROM urls u
    WHERE u.status = 'pending'
      AND EXISTS (SELECT 1 FROM url_scrape_info s WHERE s.url_id = u.id)
      AND NOT EXISTS (SELECT 1 FROM url_optional_metadata m WHERE m.url_id = u.id)
"#;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordFormats {
    List(Vec<String>),
    Text(String),
}

impl RecordFormats {
    fn into_vec(self) -> Vec<String> {
        match self {
            RecordFormats::List(formats) => formats,
            RecordFormats::Text(text) => match Regex::new(r"\s*[,;]\s*").ok() {
                Some(re) => re.split(text.trim()).map(str::to_string).collect(),
                None => vec![text],
            },
        }
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
    }
}

/// Fields a collector may attach to a URL when it is submitted
#[derive(Debug, Default, Deserialize)]
struct CollectorMetadata {
    name: Option<String>,
    description: Option<String>,
    record_formats: Option<RecordFormats>,
    data_portal_type: Option<String>,
    supplying_entity: Option<String>,
}

fn parse_collector_metadata(raw: Option<&str>) -> Result<CollectorMetadata> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
            .map_err(|e| Error::Parse(format!("Invalid collector metadata: {}", e))),
        _ => Ok(CollectorMetadata::default()),
    }
}

/// Fills names, descriptions and catalogue fields from collector metadata,
/// falling back to the scraped title and description
pub struct MiscMetadataOperator {
    store: UrlStore,
    batch_size: i64,
}

impl MiscMetadataOperator {
    pub fn new(store: UrlStore, batch_size: i64) -> Self {
        Self { store, batch_size }
    }
}

#[async_trait]
impl TaskOperator for MiscMetadataOperator {
    fn task_type(&self) -> TaskType {
        TaskType::MiscMetadata
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

        let ids: Vec<i64> = urls.iter().map(|u| u.url_id).collect();
        let html = load_html_info(&self.store, &ids).await?;

        let mut records = Vec::with_capacity(urls.len());
        for url in &urls {
            if let Some(record) = self.store.get_url(url.url_id).await? {
                records.push(record);
            }
        }

        let mut errored = 0;
        let mut tx = self.store.begin().await?;
        for record in records {
            let collector = match parse_collector_metadata(record.collector_metadata.as_deref()) {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Skipping collector metadata for {}: {}", record.url, e);
                    tx::add_url_error(&mut tx, run.task_id(), record.id, &e.to_string()).await?;
                    errored += 1;
                    CollectorMetadata::default()
                }
            };

            let page = html.get(&record.id);
            let name = collector
                .name
                .or_else(|| page.and_then(|p| p.title.clone()));
            let description = collector
                .description
                .or_else(|| page.and_then(|p| p.description.clone()));
            tx::fill_url_details(&mut tx, record.id, name.as_deref(), description.as_deref())
                .await?;

            let optional = OptionalMetadata {
                record_formats: collector
                    .record_formats
                    .map(RecordFormats::into_vec)
                    .unwrap_or_default(),
                data_portal_type: collector.data_portal_type,
                supplying_entity: collector.supplying_entity,
            };
            tx::insert_optional_metadata(&mut tx, record.id, &optional).await?;
        }
        tx.commit().await?;

        info!(
            "Filled metadata for {} URLs ({} with unreadable collector metadata)",
            urls.len(),
            errored
        );
        Ok(TaskReport::Completed(format!(
            "Filled metadata for {} URLs",
            urls.len()
        )))
    }
}

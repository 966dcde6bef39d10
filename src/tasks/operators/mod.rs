//! URL operators
//!
//! Each operator selects a bounded batch of eligible URLs, does one kind of
//! enrichment for them, and writes the results in a single transaction.
//! Eligibility is expressed as a `FROM urls u WHERE ...` fragment so the
//! prerequisite check and the batch query cannot drift apart.

mod agency_identification;
mod duplicate;
mod html;
mod misc_metadata;
mod probe;
mod probe_404;
mod record_type;
mod relevancy;
mod root_url;
mod submit_approved;

pub use agency_identification::AgencyIdentificationOperator;
pub use duplicate::DuplicateOperator;
pub use html::HtmlOperator;
pub use misc_metadata::MiscMetadataOperator;
pub use probe::{merge_probe_results, MergeSummary, ProbeOperator};
pub use probe_404::Probe404Operator;
pub use record_type::RecordTypeOperator;
pub use relevancy::RelevancyOperator;
pub use root_url::RootUrlOperator;
pub use submit_approved::SubmitApprovedOperator;

use super::{TaskOperator, TaskReport, TaskRun, TaskType};
use crate::error::Result;
use crate::external::ClassifierInput;
use crate::parse::HtmlInfo;
use crate::store::{HtmlContentRow, UrlMapping, UrlStore};
use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;

/// The fixed set of URL operators
pub enum Operator {
    Probe(ProbeOperator),
    Html(HtmlOperator),
    Duplicate(DuplicateOperator),
    Probe404(Probe404Operator),
    RecordType(RecordTypeOperator),
    AgencyIdentification(AgencyIdentificationOperator),
    RootUrl(RootUrlOperator),
    MiscMetadata(MiscMetadataOperator),
    SubmitApproved(SubmitApprovedOperator),
    Relevancy(RelevancyOperator),
}

macro_rules! dispatch {
    ($self:ident, $op:ident => $body:expr) => {
        match $self {
            Operator::Probe($op) => $body,
            Operator::Html($op) => $body,
            Operator::Duplicate($op) => $body,
            Operator::Probe404($op) => $body,
            Operator::RecordType($op) => $body,
            Operator::AgencyIdentification($op) => $body,
            Operator::RootUrl($op) => $body,
            Operator::MiscMetadata($op) => $body,
            Operator::SubmitApproved($op) => $body,
            Operator::Relevancy($op) => $body,
        }
    };
}

#[async_trait]
impl TaskOperator for Operator {
    fn task_type(&self) -> TaskType {
        dispatch!(self, op => op.task_type())
    }

    async fn meets_task_prerequisites(&self) -> Result<bool> {
        dispatch!(self, op => op.meets_task_prerequisites().await)
    }

    async fn inner_task_logic(&self, run: &mut TaskRun) -> Result<TaskReport> {
        dispatch!(self, op => op.inner_task_logic(run).await)
    }
}

/// Whether any URL matches an eligibility fragment
pub(crate) async fn has_eligible(
    store: &UrlStore,
    from_where: &str,
    bind: Option<&str>,
) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 {})", from_where);
    let mut query = sqlx::query_scalar::<_, bool>(&sql);
    if let Some(value) = bind {
        query = query.bind(value);
    }
    Ok(query.fetch_one(store.pool()).await?)
}

/// Oldest eligible URLs first, at most `limit`
pub(crate) async fn select_eligible(
    store: &UrlStore,
    from_where: &str,
    bind: Option<&str>,
    limit: i64,
) -> Result<Vec<UrlMapping>> {
    let sql = format!(
        "SELECT u.id AS url_id, u.url {} ORDER BY u.id LIMIT ?",
        from_where
    );
    let mut query = sqlx::query_as::<_, UrlMapping>(&sql);
    if let Some(value) = bind {
        query = query.bind(value);
    }
    Ok(query.bind(limit).fetch_all(store.pool()).await?)
}

/// Stored HTML fields for a set of URLs, keyed by url id
pub(crate) async fn load_html_info(
    store: &UrlStore,
    url_ids: &[i64],
) -> Result<HashMap<i64, HtmlInfo>> {
    let mut rows: Vec<HtmlContentRow> = Vec::new();
    for chunk in url_ids.chunks(crate::store::tx::BIND_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT url_id, content_type, content FROM url_html_content WHERE url_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");
        rows.extend(
            qb.build_query_as::<HtmlContentRow>()
                .fetch_all(store.pool())
                .await?,
        );
    }

    let mut grouped: HashMap<i64, Vec<(String, String)>> = HashMap::new();
    for row in rows {
        grouped
            .entry(row.url_id)
            .or_default()
            .push((row.content_type, row.content));
    }
    Ok(grouped
        .into_iter()
        .map(|(url_id, fields)| {
            let info = HtmlInfo::from_fields(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            (url_id, info)
        })
        .collect())
}

/// Classifier inputs for a batch, skipping URLs whose HTML has vanished
pub(crate) async fn classifier_inputs(
    store: &UrlStore,
    urls: &[UrlMapping],
) -> Result<Vec<ClassifierInput>> {
    let ids: Vec<i64> = urls.iter().map(|u| u.url_id).collect();
    let mut html = load_html_info(store, &ids).await?;
    Ok(urls
        .iter()
        .filter_map(|u| {
            html.remove(&u.url_id).map(|info| ClassifierInput {
                url_id: u.url_id,
                url: u.url.clone(),
                html: info,
            })
        })
        .collect())
}

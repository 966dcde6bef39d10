use super::{has_eligible, select_eligible};
use crate::error::{Error, Result};
use crate::probe::{ProbeOutcome, ProbeResult, RedirectPair, RequestInterface};
use crate::store::{tx, RedirectLink, UrlMapping, UrlSource, UrlStore, WebMetadata};
use crate::tasks::{TaskOperator, TaskReport, TaskRun, TaskType};
use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

const ELIGIBLE: &str = r#"
    FROM urls u
    WHERE NOT EXISTS (SELECT 1 FROM url_web_metadata m WHERE m.url_id = u.id)
"#;

/// Records reachability, status and content type for URLs never probed
pub struct ProbeOperator {
    store: UrlStore,
    requests: Arc<dyn RequestInterface>,
    batch_size: i64,
}

impl ProbeOperator {
    pub fn new(store: UrlStore, requests: Arc<dyn RequestInterface>, batch_size: i64) -> Self {
        Self {
            store,
            requests,
            batch_size,
        }
    }
}

#[async_trait]
impl TaskOperator for ProbeOperator {
    fn task_type(&self) -> TaskType {
        TaskType::Probe
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
        let results = self.requests.probe_urls(&requested).await?;

        let mut tx = self.store.begin().await?;
        let summary = merge_probe_results(&mut tx, &urls, &results).await?;
        tx.commit().await?;

        info!(
            "Probed {} URLs: {} direct, {} redirects, {} new destinations",
            urls.len(),
            summary.direct,
            summary.redirects,
            summary.new_destinations
        );
        Ok(TaskReport::Completed(format!(
            "Probed {} URLs ({} redirects)",
            urls.len(),
            summary.redirects
        )))
    }
}

/// Counts from one merge of probe results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub direct: usize,
    pub redirects: usize,
    pub new_destinations: usize,
}

/// Write a batch of probe results against the URLs that were requested.
///
/// Direct results update the requested URL's metadata. Redirect results
/// update the requested URL from the first hop and the destination from
/// the final response, creating destination rows as needed, and record one
/// redirect link per pair. Every requested URL must have a result.
pub async fn merge_probe_results(
    conn: &mut SqliteConnection,
    requested: &[UrlMapping],
    results: &[ProbeResult],
) -> Result<MergeSummary> {
    let source_ids: HashMap<&str, i64> = requested
        .iter()
        .map(|u| (u.url.as_str(), u.url_id))
        .collect();

    let mut summary = MergeSummary::default();
    let mut metadata: BTreeMap<i64, WebMetadata> = BTreeMap::new();
    let mut pairs: Vec<(i64, &RedirectPair)> = Vec::new();
    let mut answered: HashSet<&str> = HashSet::new();

    for result in results {
        let source_id = *source_ids.get(result.original_url.as_str()).ok_or_else(|| {
            Error::Probe(format!(
                "Probe result for URL that was not requested: {}",
                result.original_url
            ))
        })?;
        answered.insert(result.original_url.as_str());

        match &result.outcome {
            ProbeOutcome::Direct(response) => {
                summary.direct += 1;
                metadata.insert(source_id, response.to_web_metadata(source_id));
            }
            ProbeOutcome::Redirect(pair) => {
                summary.redirects += 1;
                pairs.push((source_id, pair));
            }
        }
    }

    if let Some(missing) = requested
        .iter()
        .find(|u| !answered.contains(u.url.as_str()))
    {
        return Err(Error::MissingProbeResult(missing.url.clone()));
    }

    if pairs.is_empty() {
        let rows: Vec<WebMetadata> = metadata.into_values().collect();
        tx::upsert_web_metadata(conn, &rows).await?;
        return Ok(summary);
    }

    let mut seen = HashSet::new();
    let destinations: Vec<String> = pairs
        .iter()
        .map(|(_, pair)| pair.destination.url.clone())
        .filter(|url| seen.insert(url.clone()))
        .collect();

    let mut destination_ids = tx::lookup_url_ids(conn, &destinations).await?;
    let new_destinations: Vec<String> = destinations
        .into_iter()
        .filter(|url| !destination_ids.contains_key(url))
        .collect();
    summary.new_destinations = new_destinations.len();
    destination_ids.extend(tx::insert_urls(conn, &new_destinations, UrlSource::Redirect).await?);

    let mut links = Vec::with_capacity(pairs.len());
    for (source_id, pair) in pairs {
        let destination_id = *destination_ids
            .get(&pair.destination.url)
            .ok_or_else(|| Error::MissingProbeResult(pair.destination.url.clone()))?;
        metadata.insert(source_id, pair.source.to_web_metadata(source_id));
        metadata.insert(destination_id, pair.destination.to_web_metadata(destination_id));
        links.push(RedirectLink {
            source_url_id: source_id,
            destination_url_id: destination_id,
        });
    }

    let rows: Vec<WebMetadata> = metadata.into_values().collect();
    tx::upsert_web_metadata(conn, &rows).await?;
    tx::insert_redirect_links(conn, &links).await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::mock::MockRequestInterface;
    use crate::probe::ProbeResponse;
    use crate::store::tests::setup_test_store;
    use crate::tasks::TaskOutcome;

    fn operator(store: &UrlStore, mock: MockRequestInterface) -> ProbeOperator {
        ProbeOperator::new(store.clone(), Arc::new(mock), 100)
    }

    #[tokio::test]
    async fn test_single_redirect_creates_destination() {
        let (store, _tmp) = setup_test_store().await;
        let a = store
            .add_url("https://a.com", UrlSource::Collector, None)
            .await
            .unwrap();

        let mut mock = MockRequestInterface::default();
        mock.probes.insert(
            "https://a.com".to_string(),
            ProbeResult::redirect(
                "https://a.com",
                ProbeResponse::ok("https://a.com", 301, None),
                ProbeResponse::ok("https://b.com", 200, Some("text/html")),
            ),
        );
        let op = operator(&store, mock);

        let info = op.run_task(store.create_task(TaskType::Probe).await.unwrap()).await;
        assert_eq!(info.outcome, TaskOutcome::Success);
        assert_eq!(info.linked_url_ids, vec![a]);

        let b = store.get_url_by_str("https://b.com").await.unwrap().unwrap();
        assert_eq!(b.source, "redirect");
        assert_eq!(b.status, "pending");

        let a_meta = store.get_web_metadata(a).await.unwrap().unwrap();
        assert!(a_meta.accessed);
        assert_eq!(a_meta.status_code, Some(301));
        assert!(a_meta.content_type.is_none());
        assert!(a_meta.error_message.is_none());

        let b_meta = store.get_web_metadata(b.id).await.unwrap().unwrap();
        assert_eq!(b_meta.status_code, Some(200));
        assert_eq!(b_meta.content_type.as_deref(), Some("text/html"));

        assert_eq!(
            store.list_redirect_links().await.unwrap(),
            vec![RedirectLink {
                source_url_id: a,
                destination_url_id: b.id,
            }]
        );
    }

    #[tokio::test]
    async fn test_shared_destination_is_created_once() {
        let (store, _tmp) = setup_test_store().await;
        let x = store
            .add_url("https://x.com", UrlSource::Collector, None)
            .await
            .unwrap();
        let y = store
            .add_url("https://y.com", UrlSource::Collector, None)
            .await
            .unwrap();

        let mut mock = MockRequestInterface::default();
        for (source, code) in [("https://x.com", 307), ("https://y.com", 308)] {
            mock.probes.insert(
                source.to_string(),
                ProbeResult::redirect(
                    source,
                    ProbeResponse::ok(source, code, None),
                    ProbeResponse::ok("https://z.com", 200, Some("text/html")),
                ),
            );
        }
        let op = operator(&store, mock);

        let info = op.run_task(store.create_task(TaskType::Probe).await.unwrap()).await;
        assert_eq!(info.outcome, TaskOutcome::Success);

        let z = store.get_url_by_str("https://z.com").await.unwrap().unwrap();
        let links = store.list_redirect_links().await.unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.destination_url_id == z.id));
        assert_eq!(
            links.iter().map(|l| l.source_url_id).collect::<HashSet<_>>(),
            HashSet::from([x, y])
        );
        assert_eq!(store.count_web_metadata().await.unwrap(), 3);
        assert_eq!(store.get_stats().await.unwrap().url_count, 3);
    }

    #[tokio::test]
    async fn test_redirect_to_known_url_reuses_row() {
        let (store, _tmp) = setup_test_store().await;
        let a = store
            .add_url("https://a.com", UrlSource::Collector, None)
            .await
            .unwrap();
        let b = store
            .add_url("https://b.com", UrlSource::Collector, None)
            .await
            .unwrap();

        let mut mock = MockRequestInterface::default();
        mock.probes.insert(
            "https://a.com".to_string(),
            ProbeResult::redirect(
                "https://a.com",
                ProbeResponse::ok("https://a.com", 302, None),
                ProbeResponse::ok("https://b.com", 200, Some("text/html")),
            ),
        );
        let op = operator(&store, mock);
        op.run_task(store.create_task(TaskType::Probe).await.unwrap())
            .await;

        let b_row = store.get_url_by_str("https://b.com").await.unwrap().unwrap();
        assert_eq!(b_row.id, b);
        assert_eq!(b_row.source, "collector");
        assert_eq!(store.get_stats().await.unwrap().url_count, 2);
        assert_eq!(
            store.list_redirect_links().await.unwrap()[0].source_url_id,
            a
        );
    }

    #[tokio::test]
    async fn test_probe_consumes_its_prerequisite() {
        let (store, _tmp) = setup_test_store().await;
        store
            .add_url("https://a.com", UrlSource::Collector, None)
            .await
            .unwrap();
        let mut mock = MockRequestInterface::default();
        mock.probes.insert(
            "https://a.com".to_string(),
            ProbeResult::direct(
                "https://a.com",
                ProbeResponse::failed("https://a.com", Some(500), "Something went wrong"),
            ),
        );
        let op = operator(&store, mock);

        assert!(op.meets_task_prerequisites().await.unwrap());
        let info = op.run_task(store.create_task(TaskType::Probe).await.unwrap()).await;
        assert_eq!(info.outcome, TaskOutcome::Success);
        assert!(!op.meets_task_prerequisites().await.unwrap());

        let meta = store.get_web_metadata(1).await.unwrap().unwrap();
        assert_eq!(meta.status_code, Some(500));
        assert_eq!(meta.error_message.as_deref(), Some("Something went wrong"));
        assert!(meta.content_type.is_none());
    }

    #[tokio::test]
    async fn test_batch_failure_writes_nothing() {
        let (store, _tmp) = setup_test_store().await;
        let a = store
            .add_url("https://a.com", UrlSource::Collector, None)
            .await
            .unwrap();
        let mock = MockRequestInterface {
            fail_with: Some("Probe batch timed out after 600s".to_string()),
            ..Default::default()
        };
        let op = operator(&store, mock);

        let info = op.run_task(store.create_task(TaskType::Probe).await.unwrap()).await;
        assert_eq!(info.outcome, TaskOutcome::Error);
        assert!(info.message.contains("timed out"));
        assert_eq!(info.linked_url_ids, vec![a]);
        assert_eq!(store.count_web_metadata().await.unwrap(), 0);
        assert!(op.meets_task_prerequisites().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_result_rolls_back() {
        let (store, _tmp) = setup_test_store().await;
        let a = store
            .add_url("https://a.com", UrlSource::Collector, None)
            .await
            .unwrap();
        let b = store
            .add_url("https://b.com", UrlSource::Collector, None)
            .await
            .unwrap();
        let requested = vec![
            UrlMapping {
                url_id: a,
                url: "https://a.com".to_string(),
            },
            UrlMapping {
                url_id: b,
                url: "https://b.com".to_string(),
            },
        ];
        let results = vec![ProbeResult::direct(
            "https://a.com",
            ProbeResponse::ok("https://a.com", 200, Some("text/html")),
        )];

        {
            let mut tx = store.begin().await.unwrap();
            let result = merge_probe_results(&mut tx, &requested, &results).await;
            assert!(matches!(result, Err(Error::MissingProbeResult(url)) if url == "https://b.com"));
        }
        assert_eq!(store.count_web_metadata().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_redirect_to_stored_bare_host_reuses_row() {
        use crate::config::ProbeConfig;
        use crate::probe::HttpRequestInterface;
        use wiremock::matchers::path;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let root_url = server.uri();
        Mock::given(path("/moved"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", root_url.as_str()))
            .mount(&server)
            .await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
            .mount(&server)
            .await;

        let (store, _tmp) = setup_test_store().await;
        let root = store
            .add_url(&root_url, UrlSource::Collector, None)
            .await
            .unwrap();
        let moved = store
            .add_url(&format!("{}/moved", root_url), UrlSource::Collector, None)
            .await
            .unwrap();

        let client = HttpRequestInterface::new(&ProbeConfig {
            timeout_secs: 5,
            batch_timeout_secs: 30,
            ..ProbeConfig::default()
        })
        .unwrap();
        let op = ProbeOperator::new(store.clone(), Arc::new(client), 100);
        let info = op.run_task(store.create_task(TaskType::Probe).await.unwrap()).await;
        assert_eq!(info.outcome, TaskOutcome::Success);

        assert_eq!(store.get_stats().await.unwrap().url_count, 2);
        assert_eq!(
            store.list_redirect_links().await.unwrap(),
            vec![RedirectLink {
                source_url_id: moved,
                destination_url_id: root,
            }]
        );
        assert!(store
            .get_url_by_str(&format!("{}/", root_url))
            .await
            .unwrap()
            .is_none());
        assert!(!op.meets_task_prerequisites().await.unwrap());
    }
}

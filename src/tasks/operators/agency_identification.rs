use super::{has_eligible, select_eligible};
use crate::error::{Error, Result};
use crate::external::{AgencyIdentifier, AgencyInput, AgencySuggestion, SuggestionType};
use crate::progress::{advance_progress, finish_progress, start_batch_progress};
use crate::store::{tx, UrlStore};
use crate::tasks::{error_chain, TaskOperator, TaskReport, TaskRun, TaskType};
use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::info;

const ELIGIBLE: &str = r#"
    FROM urls u
    WHERE u.status = 'pending'
      AND NOT EXISTS (SELECT 1 FROM automated_url_agency_suggestions s WHERE s.url_id = u.id)
      AND NOT EXISTS (SELECT 1 FROM link_urls_agencies l WHERE l.url_id = u.id)
      AND NOT EXISTS (
          SELECT 1 FROM url_error_info e
          JOIN tasks t ON t.id = e.task_id
          WHERE e.url_id = u.id AND t.task_type = 'agency_identification'
      )
"#;

fn parse_metadata(raw: Option<&str>) -> Result<Option<serde_json::Value>> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| Error::Parse(format!("Invalid collector metadata: {}", e))),
        _ => Ok(None),
    }
}

/// Write one URL's suggestions; returns whether any agency was matched
async fn store_suggestions(
    conn: &mut SqliteConnection,
    url_id: i64,
    suggestions: &[AgencySuggestion],
) -> Result<bool> {
    let mut matched = false;
    for suggestion in suggestions {
        let Some(agency_id) = suggestion.agency_id.filter(|_| !suggestion.is_unknown()) else {
            continue;
        };
        tx::upsert_agency(
            conn,
            agency_id,
            suggestion.agency_name.as_deref(),
            suggestion.state.as_deref(),
            suggestion.county.as_deref(),
            suggestion.locality.as_deref(),
        )
        .await?;
        if suggestion.suggestion_type == SuggestionType::Confirmed {
            tx::link_url_agency(conn, url_id, agency_id).await?;
        } else {
            tx::insert_agency_suggestion(conn, url_id, Some(agency_id)).await?;
        }
        matched = true;
    }

    if !matched {
        tx::insert_agency_suggestion(conn, url_id, None).await?;
    }
    Ok(matched)
}

/// Suggests which agency published each pending URL
pub struct AgencyIdentificationOperator {
    store: UrlStore,
    identifier: Arc<dyn AgencyIdentifier>,
    batch_size: i64,
}

impl AgencyIdentificationOperator {
    pub fn new(store: UrlStore, identifier: Arc<dyn AgencyIdentifier>, batch_size: i64) -> Self {
        Self {
            store,
            identifier,
            batch_size,
        }
    }
}

#[async_trait]
impl TaskOperator for AgencyIdentificationOperator {
    fn task_type(&self) -> TaskType {
        TaskType::AgencyIdentification
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

        let mut records = Vec::with_capacity(urls.len());
        for url in &urls {
            if let Some(record) = self.store.get_url(url.url_id).await? {
                records.push(record);
            }
        }

        let mut results = Vec::with_capacity(records.len());
        let pb = start_batch_progress(records.len(), "Identifying agencies");
        for record in &records {
            let result = match parse_metadata(record.collector_metadata.as_deref()) {
                Ok(collector_metadata) => {
                    let input = AgencyInput {
                        url_id: record.id,
                        url: record.url.clone(),
                        collector_metadata,
                    };
                    self.identifier.identify(&input).await
                }
                Err(e) => Err(e),
            };
            results.push((record.id, result));
            advance_progress(&pb);
        }
        finish_progress(pb);

        let mut matched = 0;
        let mut tx = self.store.begin().await?;
        for (url_id, result) in results {
            match result {
                Ok(suggestions) => {
                    if store_suggestions(&mut tx, url_id, &suggestions).await? {
                        matched += 1;
                    }
                }
                Err(e) => {
                    tx::add_url_error(&mut tx, run.task_id(), url_id, &error_chain(&e)).await?;
                }
            }
        }
        tx.commit().await?;

        info!("Matched agencies for {} of {} URLs", matched, records.len());
        Ok(TaskReport::Completed(format!(
            "Matched agencies for {} of {} URLs",
            matched,
            records.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::mock::MockAgencyIdentifier;
    use crate::store::tests::setup_test_store;
    use crate::store::UrlSource;
    use crate::tasks::operators::test_support::count_rows;
    use crate::tasks::TaskOutcome;
    use std::collections::HashMap;

    fn suggestion(suggestion_type: SuggestionType, agency_id: i64, name: &str) -> AgencySuggestion {
        AgencySuggestion {
            suggestion_type,
            agency_id: Some(agency_id),
            agency_name: Some(name.to_string()),
            state: Some("Pennsylvania".to_string()),
            county: None,
            locality: None,
        }
    }

    fn identifier() -> MockAgencyIdentifier {
        let mut agencies = HashMap::new();
        agencies.insert(
            "pittsburgh".to_string(),
            vec![suggestion(SuggestionType::Confirmed, 10, "Pittsburgh PD")],
        );
        agencies.insert(
            "allegheny".to_string(),
            vec![
                suggestion(SuggestionType::AutoSuggestion, 20, "Allegheny Sheriff"),
                suggestion(SuggestionType::AutoSuggestion, 21, "Allegheny County PD"),
            ],
        );
        MockAgencyIdentifier { agencies }
    }

    async fn add(store: &UrlStore, url: &str, metadata: Option<&str>) -> i64 {
        store.add_url(url, UrlSource::Collector, metadata).await.unwrap()
    }

    #[tokio::test]
    async fn test_confirmed_auto_and_unknown_suggestions() {
        let (store, _tmp) = setup_test_store().await;
        let confirmed = add(
            &store,
            "https://pittsburghpa.gov/police",
            Some(r#"{"agency": "pittsburgh"}"#),
        )
        .await;
        let candidates = add(
            &store,
            "https://alleghenycounty.us/records",
            Some(r#"{"agency": "allegheny"}"#),
        )
        .await;
        let unmatched = add(&store, "https://example.org/logs", None).await;

        let op = AgencyIdentificationOperator::new(store.clone(), Arc::new(identifier()), 100);
        let task_id = store.create_task(TaskType::AgencyIdentification).await.unwrap();
        let info = op.run_task(task_id).await;

        assert_eq!(info.outcome, TaskOutcome::Success);
        assert_eq!(info.linked_url_ids, vec![confirmed, candidates, unmatched]);

        let linked: Vec<(i64, i64)> =
            sqlx::query_as("SELECT url_id, agency_id FROM link_urls_agencies")
                .fetch_all(store.pool())
                .await
                .unwrap();
        assert_eq!(linked, vec![(confirmed, 10)]);

        let suggested: Vec<(i64, Option<i64>, bool)> = sqlx::query_as(
            "SELECT url_id, agency_id, is_unknown FROM automated_url_agency_suggestions ORDER BY id",
        )
        .fetch_all(store.pool())
        .await
        .unwrap();
        assert_eq!(
            suggested,
            vec![
                (candidates, Some(20), false),
                (candidates, Some(21), false),
                (unmatched, None, true),
            ]
        );
        assert_eq!(count_rows(&store, "agencies").await, 3);
        assert!(!op.meets_task_prerequisites().await.unwrap());
    }

    #[tokio::test]
    async fn test_failures_become_url_errors() {
        let (store, _tmp) = setup_test_store().await;
        let garbled = add(&store, "https://pd.gov/a", Some("{not json")).await;
        let no_agency = add(&store, "https://pd.gov/b", Some(r#"{"name": "Records"}"#)).await;
        let matched = add(&store, "https://pd.gov/c", Some(r#"{"agency": "pittsburgh"}"#)).await;

        let op = AgencyIdentificationOperator::new(store.clone(), Arc::new(identifier()), 100);
        let task_id = store.create_task(TaskType::AgencyIdentification).await.unwrap();
        let info = op.run_task(task_id).await;

        assert_eq!(info.outcome, TaskOutcome::Success);
        for url_id in [garbled, no_agency] {
            let errors = store.get_url_errors(url_id).await.unwrap();
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].task_id, task_id);
        }
        assert!(store.get_url_errors(matched).await.unwrap().is_empty());
        assert_eq!(count_rows(&store, "link_urls_agencies").await, 1);
        assert_eq!(count_rows(&store, "automated_url_agency_suggestions").await, 0);

        // errored URLs are not retried by this operator
        assert!(!op.meets_task_prerequisites().await.unwrap());
    }

    #[tokio::test]
    async fn test_only_pending_urls_are_eligible() {
        let (store, _tmp) = setup_test_store().await;
        let url_id = add(&store, "https://pd.gov/gone", None).await;
        let mut conn = store.begin().await.unwrap();
        tx::update_url_status(&mut conn, url_id, crate::store::UrlStatus::NotRelevant)
            .await
            .unwrap();
        conn.commit().await.unwrap();

        let op = AgencyIdentificationOperator::new(store.clone(), Arc::new(identifier()), 100);
        assert!(!op.meets_task_prerequisites().await.unwrap());
    }
}

use super::{DataSourcesApi, SubmissionRequest, SubmissionResult};
use crate::error::{Error, Result};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize)]
struct UniqueUrlResponse {
    #[serde(default)]
    duplicates: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct DataSourcePayload<'a> {
    name: Option<&'a str>,
    description: Option<&'a str>,
    source_url: &'a str,
    record_type: Option<&'a str>,
    record_formats: &'a [String],
    data_portal_type: Option<&'a str>,
    supplying_entity: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SubmitPayload<'a> {
    data_sources: Vec<DataSourcePayload<'a>>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    data_sources: Vec<SubmittedDataSource>,
}

#[derive(Debug, Deserialize)]
struct SubmittedDataSource {
    url: String,
    #[serde(default)]
    data_source_id: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the data-sources API
pub struct DataSourcesClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl DataSourcesClient {
    pub fn new(base_url: &str, api_key: Option<String>, requests_per_second: u32) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        Ok(Self {
            client,
            base_url,
            api_key,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid data-sources API URL: {}", e)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        self.limiter.until_ready().await;
        let response = self.authorize(request).send().await?;
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Err(Error::RateLimited(
                "data-sources API returned 429".to_string(),
            )),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::ExternalService(format!(
                    "data-sources API returned {}: {}",
                    status,
                    body.trim()
                )))
            }
            _ => Ok(response),
        }
    }
}

#[async_trait]
impl DataSourcesApi for DataSourcesClient {
    async fn is_url_duplicate(&self, url: &str) -> Result<bool> {
        let endpoint = self.endpoint("check/unique-url")?;
        let response = self
            .send(self.client.get(endpoint).query(&[("url", url)]))
            .await?;
        let body: UniqueUrlResponse = response.json().await?;
        debug!("{} has {} duplicates", url, body.duplicates.len());
        Ok(!body.duplicates.is_empty())
    }

    async fn submit_urls(&self, requests: &[SubmissionRequest]) -> Result<Vec<SubmissionResult>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let url_ids: HashMap<&str, i64> = requests
            .iter()
            .map(|r| (r.url.as_str(), r.url_id))
            .collect();
        let payload = SubmitPayload {
            data_sources: requests
                .iter()
                .map(|r| DataSourcePayload {
                    name: r.name.as_deref(),
                    description: r.description.as_deref(),
                    source_url: &r.url,
                    record_type: r.record_type.as_deref(),
                    record_formats: &r.record_formats,
                    data_portal_type: r.data_portal_type.as_deref(),
                    supplying_entity: r.supplying_entity.as_deref(),
                })
                .collect(),
        };

        let endpoint = self.endpoint("source-collector/data-sources")?;
        let response = self.send(self.client.post(endpoint).json(&payload)).await?;
        let body: SubmitResponse = response.json().await?;

        body.data_sources
            .into_iter()
            .map(|ds| {
                let url_id = url_ids.get(ds.url.as_str()).copied().ok_or_else(|| {
                    Error::ExternalService(format!(
                        "data-sources API answered for unknown URL {}",
                        ds.url
                    ))
                })?;
                Ok(SubmissionResult {
                    url_id,
                    data_source_id: ds.data_source_id,
                    error: ds.error,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DataSourcesClient {
        DataSourcesClient::new(&format!("{}/", server.uri()), Some("secret".to_string()), 50)
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_check() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/check/unique-url"))
            .and(query_param("url", "https://dup.com"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"duplicates": [{"original_url": "https://dup.com"}]})),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/check/unique-url"))
            .and(query_param("url", "https://new.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"duplicates": []})))
            .mount(&mock_server)
            .await;

        let api = client(&mock_server);
        assert!(api.is_url_duplicate("https://dup.com").await.unwrap());
        assert!(!api.is_url_duplicate("https://new.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_rate_limit_is_distinct() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let result = client(&mock_server).is_url_duplicate("https://a.com").await;
        assert!(matches!(result, Err(Error::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_submit_maps_results_by_url() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/source-collector/data-sources"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data_sources": [
                    {"url": "https://b.com", "data_source_id": null, "error": "bad record type"},
                    {"url": "https://a.com", "data_source_id": 77, "error": null}
                ]
            })))
            .mount(&mock_server)
            .await;

        let request = |url_id: i64, url: &str| SubmissionRequest {
            url_id,
            url: url.to_string(),
            name: Some("Name".to_string()),
            description: None,
            record_type: Some("Other".to_string()),
            record_formats: Vec::new(),
            data_portal_type: None,
            supplying_entity: None,
        };
        let results = client(&mock_server)
            .submit_urls(&[request(1, "https://a.com"), request(2, "https://b.com")])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.contains(&SubmissionResult {
            url_id: 1,
            data_source_id: Some(77),
            error: None,
        }));
        assert!(results.contains(&SubmissionResult {
            url_id: 2,
            data_source_id: None,
            error: Some("bad record type".to_string()),
        }));
    }
}

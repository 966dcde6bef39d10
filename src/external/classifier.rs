use super::{
    AgencyIdentifier, AgencyInput, AgencySuggestion, ClassifierInput, RecordTypeClassifier,
    RelevancyAnnotation, RelevancyClassifier,
};
use crate::error::{Error, Result};
use crate::store::RecordType;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    url: &'a str,
    title: Option<&'a str>,
    description: Option<&'a str>,
    headers: &'a [Vec<String>; 6],
    div: Option<&'a str>,
}

impl<'a> From<&'a ClassifierInput> for ClassifyRequest<'a> {
    fn from(input: &'a ClassifierInput) -> Self {
        Self {
            url: &input.url,
            title: input.html.title.as_deref(),
            description: input.html.description.as_deref(),
            headers: &input.html.headers,
            div: input.html.div.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordTypeResponse {
    record_type: String,
}

#[derive(Debug, Deserialize)]
struct AgencyResponse {
    #[serde(default)]
    suggestions: Vec<AgencySuggestion>,
}

/// Shared JSON-over-HTTP plumbing for classifier sidecars
struct ClassifierBackend {
    client: Client,
    endpoint: Url,
    retries: usize,
}

impl ClassifierBackend {
    fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("Invalid classifier URL: {}", e)))?;
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            endpoint,
            retries: 2,
        })
    }

    async fn post<B, T>(&self, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let request = self.client.post(self.endpoint.clone()).json(body);

        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request.try_clone().ok_or_else(|| {
                Error::ExternalService("Failed to clone classifier request".to_string())
            })?;
            match req.send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(ok) => return Ok(ok.json::<T>().await?),
                    Err(e) => last_err = Some(Error::ExternalService(e.to_string())),
                },
                Err(e) => last_err = Some(Error::ExternalService(e.to_string())),
            }

            if attempt < self.retries {
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::ExternalService("Classifier request failed".to_string())))
    }
}

/// Record type classifier served over HTTP
pub struct HttpRecordTypeClassifier {
    backend: ClassifierBackend,
}

impl HttpRecordTypeClassifier {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            backend: ClassifierBackend::new(endpoint)?,
        })
    }
}

#[async_trait]
impl RecordTypeClassifier for HttpRecordTypeClassifier {
    async fn classify(&self, input: &ClassifierInput) -> Result<RecordType> {
        let response: RecordTypeResponse =
            self.backend.post(&ClassifyRequest::from(input)).await?;
        response.record_type.parse()
    }
}

/// Relevancy classifier served over HTTP
pub struct HttpRelevancyClassifier {
    backend: ClassifierBackend,
}

impl HttpRelevancyClassifier {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            backend: ClassifierBackend::new(endpoint)?,
        })
    }
}

#[async_trait]
impl RelevancyClassifier for HttpRelevancyClassifier {
    async fn annotate(&self, input: &ClassifierInput) -> Result<RelevancyAnnotation> {
        self.backend.post(&ClassifyRequest::from(input)).await
    }
}

/// Agency identification served over HTTP
pub struct HttpAgencyIdentifier {
    backend: ClassifierBackend,
}

impl HttpAgencyIdentifier {
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            backend: ClassifierBackend::new(endpoint)?,
        })
    }
}

#[async_trait]
impl AgencyIdentifier for HttpAgencyIdentifier {
    async fn identify(&self, input: &AgencyInput) -> Result<Vec<AgencySuggestion>> {
        let response: AgencyResponse = self.backend.post(input).await?;
        if response.suggestions.is_empty() {
            return Ok(vec![AgencySuggestion::unknown()]);
        }
        Ok(response.suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::HtmlInfo;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn input() -> ClassifierInput {
        ClassifierInput {
            url_id: 1,
            url: "https://pd.gov/arrests".to_string(),
            html: HtmlInfo {
                title: Some("Arrest Log".to_string()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_record_type_classifier() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/record-type"))
            .and(body_partial_json(serde_json::json!({"title": "Arrest Log"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"record_type": "Arrest Records"})),
            )
            .mount(&mock_server)
            .await;

        let classifier =
            HttpRecordTypeClassifier::new(&format!("{}/record-type", mock_server.uri())).unwrap();
        assert_eq!(
            classifier.classify(&input()).await.unwrap(),
            RecordType::ArrestRecords
        );
    }

    #[tokio::test]
    async fn test_unknown_record_type_is_an_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"record_type": "Parking Tickets"})),
            )
            .mount(&mock_server)
            .await;

        let classifier = HttpRecordTypeClassifier::new(&mock_server.uri()).unwrap();
        assert!(classifier.classify(&input()).await.is_err());
    }

    #[tokio::test]
    async fn test_agency_identifier() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/agency"))
            .and(body_partial_json(serde_json::json!({"url": "https://pd.gov/foia"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "suggestions": [
                    {"suggestion_type": "confirmed", "agency_id": 12, "agency_name": "Pittsburgh PD"}
                ]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/empty"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"suggestions": []})),
            )
            .mount(&mock_server)
            .await;

        let agency_input = AgencyInput {
            url_id: 1,
            url: "https://pd.gov/foia".to_string(),
            collector_metadata: None,
        };
        let identifier =
            HttpAgencyIdentifier::new(&format!("{}/agency", mock_server.uri())).unwrap();
        let suggestions = identifier.identify(&agency_input).await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(
            suggestions[0].suggestion_type,
            crate::external::SuggestionType::Confirmed
        );
        assert_eq!(suggestions[0].agency_id, Some(12));

        let empty = HttpAgencyIdentifier::new(&format!("{}/empty", mock_server.uri())).unwrap();
        assert!(empty.identify(&agency_input).await.unwrap()[0].is_unknown());
    }

    #[tokio::test]
    async fn test_relevancy_classifier_retries_then_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&mock_server)
            .await;

        let classifier = HttpRelevancyClassifier::new(&mock_server.uri()).unwrap();
        let result = classifier.annotate(&input()).await;
        assert!(matches!(result, Err(Error::ExternalService(_))));
    }
}

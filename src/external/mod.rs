//! External collaborators called by operators
//!
//! Each collaborator sits behind a narrow trait: given N inputs it returns N
//! structured results or an error. HTTP implementations live in submodules.

mod classifier;
mod data_sources;

pub use classifier::*;
pub use data_sources::*;

use crate::error::Result;
use crate::parse::HtmlInfo;
use crate::store::RecordType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A validated URL ready for the data-sources catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub url_id: i64,
    pub url: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub record_type: Option<String>,
    pub record_formats: Vec<String>,
    pub data_portal_type: Option<String>,
    pub supplying_entity: Option<String>,
}

/// Outcome of submitting one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub url_id: i64,
    pub data_source_id: Option<i64>,
    pub error: Option<String>,
}

/// Duplicate checks and submissions against the data-sources catalogue
#[async_trait]
pub trait DataSourcesApi: Send + Sync {
    /// Whether the catalogue already holds this URL; `Error::RateLimited` on 429
    async fn is_url_duplicate(&self, url: &str) -> Result<bool>;

    async fn submit_urls(&self, requests: &[SubmissionRequest]) -> Result<Vec<SubmissionResult>>;
}

/// Page text handed to a classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierInput {
    pub url_id: i64,
    pub url: String,
    pub html: HtmlInfo,
}

#[async_trait]
pub trait RecordTypeClassifier: Send + Sync {
    async fn classify(&self, input: &ClassifierInput) -> Result<RecordType>;
}

/// Relevancy verdict for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevancyAnnotation {
    pub is_relevant: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub model_name: Option<String>,
}

#[async_trait]
pub trait RelevancyClassifier: Send + Sync {
    async fn annotate(&self, input: &ClassifierInput) -> Result<RelevancyAnnotation>;
}

/// How sure an agency identifier is about one suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    /// No agency could be matched
    Unknown,
    /// One of possibly several candidates
    AutoSuggestion,
    /// Matched with certainty
    Confirmed,
}

/// One candidate agency for a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencySuggestion {
    pub suggestion_type: SuggestionType,
    #[serde(default)]
    pub agency_id: Option<i64>,
    #[serde(default)]
    pub agency_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub locality: Option<String>,
}

impl AgencySuggestion {
    pub fn unknown() -> Self {
        Self {
            suggestion_type: SuggestionType::Unknown,
            agency_id: None,
            agency_name: None,
            state: None,
            county: None,
            locality: None,
        }
    }

    /// A suggestion without an agency id says nothing, whatever its type
    pub fn is_unknown(&self) -> bool {
        self.suggestion_type == SuggestionType::Unknown || self.agency_id.is_none()
    }
}

/// What agency identification works from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgencyInput {
    pub url_id: i64,
    pub url: String,
    pub collector_metadata: Option<serde_json::Value>,
}

#[async_trait]
pub trait AgencyIdentifier: Send + Sync {
    async fn identify(&self, input: &AgencyInput) -> Result<Vec<AgencySuggestion>>;
}

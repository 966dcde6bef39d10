//! URL probing
//!
//! This module provides:
//! - Normalized probe responses that never carry both an error and a content type
//! - Redirect splitting into source/destination pairs
//! - The [`RequestInterface`] seam operators use for all outbound page requests
//! - A reqwest-backed implementation with manual redirect following

mod client;
mod convert;

pub use client::*;
pub use convert::*;

use crate::error::Result;
use crate::store::WebMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Normalized outcome of probing one URL.
///
/// Construct through [`ProbeResponse::new`] or [`ProbeResponse::failed`];
/// both drop the content type whenever an error is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub url: String,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub error: Option<String>,
}

impl ProbeResponse {
    pub fn new(
        url: impl Into<String>,
        status_code: Option<u16>,
        content_type: Option<String>,
        error: Option<String>,
    ) -> Self {
        let content_type = if error.is_some() { None } else { content_type };
        Self {
            url: url.into(),
            status_code,
            content_type,
            error,
        }
    }

    /// A successful response
    pub fn ok(url: impl Into<String>, status_code: u16, content_type: Option<&str>) -> Self {
        Self::new(url, Some(status_code), content_type.map(str::to_string), None)
    }

    /// A failed response, with the status code when the server answered at all
    pub fn failed(url: impl Into<String>, status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self::new(url, status_code, None, Some(error.into()))
    }

    /// Whether the server produced a response
    pub fn accessed(&self) -> bool {
        self.status_code.is_some()
    }

    pub fn to_web_metadata(&self, url_id: i64) -> WebMetadata {
        WebMetadata {
            url_id,
            accessed: self.accessed(),
            status_code: self.status_code.map(i64::from),
            content_type: self.content_type.clone(),
            error_message: self.error.clone(),
        }
    }
}

/// Source and destination of a resolved redirect chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectPair {
    pub source: ProbeResponse,
    pub destination: ProbeResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    Direct(ProbeResponse),
    Redirect(RedirectPair),
}

impl ProbeOutcome {
    /// Every response the outcome carries, source first
    pub fn responses(&self) -> Vec<&ProbeResponse> {
        match self {
            ProbeOutcome::Direct(response) => vec![response],
            ProbeOutcome::Redirect(pair) => vec![&pair.source, &pair.destination],
        }
    }
}

/// Probe outcome keyed on the URL string that was requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub original_url: String,
    pub outcome: ProbeOutcome,
}

impl ProbeResult {
    pub fn direct(original_url: &str, response: ProbeResponse) -> Self {
        Self {
            original_url: original_url.to_string(),
            outcome: ProbeOutcome::Direct(response),
        }
    }

    pub fn redirect(original_url: &str, source: ProbeResponse, destination: ProbeResponse) -> Self {
        Self {
            original_url: original_url.to_string(),
            outcome: ProbeOutcome::Redirect(RedirectPair {
                source,
                destination,
            }),
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Redirect(_))
    }
}

/// Page fetched for HTML extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlResponse {
    pub url: String,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub html: Option<String>,
    pub error: Option<String>,
}

impl HtmlResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.html.is_some()
    }
}

/// Bare status check used for 404 probing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub url: String,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

/// Outbound page requests made by operators.
///
/// Each call takes N URLs and returns N results in any order; per-URL
/// failures are data, only a batch-level failure is an `Err`.
#[async_trait]
pub trait RequestInterface: Send + Sync {
    /// HEAD with a GET fallback, redirects resolved
    async fn probe_urls(&self, urls: &[String]) -> Result<Vec<ProbeResult>>;

    /// GET each page and keep its body
    async fn fetch_html(&self, urls: &[String]) -> Result<Vec<HtmlResponse>>;

    /// GET each page and keep only the status
    async fn check_status(&self, urls: &[String]) -> Result<Vec<StatusResponse>>;
}

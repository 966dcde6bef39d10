//! Normalization of transport outcomes into probe results

use super::{ProbeOutcome, ProbeResponse, ProbeResult, RedirectPair};
use std::error::Error as StdError;

/// Longest body excerpt carried as an error message
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Failure categories a probe request can end in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    InvalidUrl,
    Dns,
    Tls,
    Connector,
    TooManyRedirects,
    Timeout,
    Socket,
    Other(String),
}

impl TransportError {
    pub fn message(&self) -> String {
        match self {
            TransportError::InvalidUrl => "Invalid URL".to_string(),
            TransportError::Dns => "DNS resolution failed".to_string(),
            TransportError::Tls => "TLS handshake failed".to_string(),
            TransportError::Connector => "Connection failed".to_string(),
            TransportError::TooManyRedirects => "Too many redirects".to_string(),
            TransportError::Timeout => "Request timed out".to_string(),
            TransportError::Socket => "Socket error".to_string(),
            TransportError::Other(detail) => format!("Request failed: {}", detail),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Sort a reqwest failure into a transport category by walking its source chain
pub fn classify_reqwest_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    if err.is_builder() {
        return TransportError::InvalidUrl;
    }
    if err.is_redirect() {
        return TransportError::TooManyRedirects;
    }

    let mut chain = Vec::new();
    let mut has_io = false;
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            has_io = true;
            if io.kind() == std::io::ErrorKind::TimedOut {
                return TransportError::Timeout;
            }
        }
        chain.push(cause.to_string().to_lowercase());
        source = cause.source();
    }
    let chain = chain.join(": ");

    if chain.contains("dns error")
        || chain.contains("failed to lookup address")
        || chain.contains("name or service not known")
    {
        return TransportError::Dns;
    }
    if chain.contains("certificate")
        || chain.contains("tls")
        || chain.contains("ssl")
        || chain.contains("handshake")
    {
        return TransportError::Tls;
    }
    if err.is_connect() {
        return TransportError::Connector;
    }
    if has_io {
        return TransportError::Socket;
    }
    TransportError::Other(err.to_string())
}

/// One redirect response observed while following a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub url: String,
    pub status: u16,
}

/// Final response of a request after redirects were followed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// Final resolved URL
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Error text for a non-success final status
    pub error: Option<String>,
    /// Redirect responses in the order they were received
    pub history: Vec<Hop>,
}

impl TransportResponse {
    /// A clean 200 that needed no redirect
    pub fn is_clean_ok(&self) -> bool {
        self.status == 200 && self.history.is_empty()
    }
}

/// Error text for a status code, `None` when the status is not a failure
pub fn status_error(status: u16, body: Option<&str>) -> Option<String> {
    if status < 400 {
        return None;
    }

    let excerpt = body
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(|b| b.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>());
    if excerpt.is_some() {
        return excerpt;
    }

    Some(
        reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status)),
    )
}

/// Strip parameters from a content-type header value
pub fn normalize_content_type(raw: &str) -> Option<String> {
    let mime = raw.split(';').next().unwrap_or("").trim().to_lowercase();
    if mime.is_empty() {
        None
    } else {
        Some(mime)
    }
}

/// Turn the outcome of probing `requested_url` into a probe result.
///
/// A redirect chain is split into a source keyed on the requested string
/// and a destination keyed on the final URL.
pub fn to_probe_result(
    requested_url: &str,
    outcome: std::result::Result<TransportResponse, TransportError>,
) -> ProbeResult {
    let response = match outcome {
        Ok(response) => response,
        Err(err) => {
            return ProbeResult::direct(
                requested_url,
                ProbeResponse::failed(requested_url, None, err.message()),
            )
        }
    };

    let destination = ProbeResponse::new(
        response.url.clone(),
        Some(response.status),
        response.content_type.clone(),
        response.error.clone(),
    );

    match response.history.first() {
        None => ProbeResult::direct(
            requested_url,
            ProbeResponse::new(
                requested_url,
                Some(response.status),
                response.content_type,
                response.error,
            ),
        ),
        Some(first) => {
            let source = ProbeResponse::new(
                requested_url,
                Some(first.status),
                None,
                status_error(first.status, None),
            );
            ProbeResult {
                original_url: requested_url.to_string(),
                outcome: ProbeOutcome::Redirect(RedirectPair {
                    source,
                    destination,
                }),
            }
        }
    }
}

use super::{
    classify_reqwest_error, normalize_content_type, status_error, to_probe_result, Hop,
    HtmlResponse, ProbeResult, RequestInterface, StatusResponse, TransportError,
    TransportResponse,
};
use crate::config::ProbeConfig;
use crate::error::{Error, Result};
use crate::progress::{advance_progress, finish_progress, start_batch_progress};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, Method, Response, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Final response of a followed request, body still unread
struct Followed {
    response: Response,
    /// Where the chain ended, spelled as the server sent it
    final_url: String,
    history: Vec<Hop>,
}

/// The redirect target as written in `Location` when it is absolute,
/// otherwise the target resolved against the current URL.
///
/// `Url` serializes a bare host with a trailing slash, so re-serializing an
/// absolute location would not match the same URL stored without one.
fn resolved_location(location: &str, joined: &Url) -> String {
    let location = location.trim();
    match Url::parse(location) {
        Ok(_) => location.to_string(),
        Err(_) => joined.to_string(),
    }
}

/// reqwest-backed request interface
pub struct HttpRequestInterface {
    client: Client,
    max_redirects: usize,
    max_concurrency: usize,
    batch_timeout: Duration,
}

impl HttpRequestInterface {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        // Redirects are followed by hand so every hop stays visible
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Probe(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_redirects: config.max_redirects,
            max_concurrency: config.max_concurrency.max(1),
            batch_timeout: Duration::from_secs(config.batch_timeout_secs),
        })
    }

    async fn follow(&self, method: Method, url: &str) -> std::result::Result<Followed, TransportError> {
        let mut current = Url::parse(url).map_err(|_| TransportError::InvalidUrl)?;
        if !matches!(current.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl);
        }

        let mut current_raw = url.to_string();
        let mut method = method;
        let mut history = Vec::new();
        loop {
            let response = self
                .client
                .request(method.clone(), current.clone())
                .send()
                .await
                .map_err(|e| {
                    debug!("Request to {} failed: {:?}", current, e);
                    classify_reqwest_error(&e)
                })?;

            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match location {
                Some(location) if status.is_redirection() => {
                    if history.len() >= self.max_redirects {
                        return Err(TransportError::TooManyRedirects);
                    }
                    let next = current
                        .join(&location)
                        .map_err(|_| TransportError::InvalidUrl)?;
                    history.push(Hop {
                        url: std::mem::replace(
                            &mut current_raw,
                            resolved_location(&location, &next),
                        ),
                        status: status.as_u16(),
                    });
                    if status == StatusCode::SEE_OTHER && method != Method::HEAD {
                        method = Method::GET;
                    }
                    current = next;
                }
                _ => {
                    return Ok(Followed {
                        response,
                        final_url: current_raw,
                        history,
                    })
                }
            }
        }
    }

    async fn request_once(
        &self,
        method: Method,
        url: &str,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let Followed {
            response,
            final_url,
            history,
        } = self.follow(method.clone(), url).await?;

        let status = response.status().as_u16();
        let content_type = header_content_type(&response);
        let error = if status >= 400 {
            let body = if method == Method::HEAD {
                None
            } else {
                response.text().await.ok()
            };
            status_error(status, body.as_deref())
        } else {
            None
        };

        Ok(TransportResponse {
            url: final_url,
            status,
            content_type,
            error,
            history,
        })
    }

    /// HEAD first; anything but a clean 200 is retried once as GET
    pub async fn probe_one(&self, url: String) -> ProbeResult {
        let head = self.request_once(Method::HEAD, &url).await;
        if let Ok(response) = &head {
            if response.is_clean_ok() {
                return to_probe_result(&url, head);
            }
        }

        debug!("HEAD {} was not a clean 200, retrying with GET", url);
        let get = self.request_once(Method::GET, &url).await;
        to_probe_result(&url, get)
    }

    pub async fn fetch_page(&self, url: String) -> HtmlResponse {
        let followed = match self.follow(Method::GET, &url).await {
            Ok(followed) => followed,
            Err(err) => {
                return HtmlResponse {
                    url,
                    status_code: None,
                    content_type: None,
                    html: None,
                    error: Some(err.message()),
                }
            }
        };

        let status = followed.response.status().as_u16();
        let content_type = header_content_type(&followed.response);
        match followed.response.text().await {
            Ok(body) if status < 400 => HtmlResponse {
                url,
                status_code: Some(status),
                content_type,
                html: Some(body),
                error: None,
            },
            Ok(body) => HtmlResponse {
                url,
                status_code: Some(status),
                content_type: None,
                html: None,
                error: status_error(status, Some(&body)),
            },
            Err(e) => HtmlResponse {
                url,
                status_code: Some(status),
                content_type: None,
                html: None,
                error: Some(classify_reqwest_error(&e).message()),
            },
        }
    }

    pub async fn check_one(&self, url: String) -> StatusResponse {
        match self.follow(Method::GET, &url).await {
            Ok(followed) => StatusResponse {
                url,
                status_code: Some(followed.response.status().as_u16()),
                error: None,
            },
            Err(err) => StatusResponse {
                url,
                status_code: None,
                error: Some(err.message()),
            },
        }
    }

    /// Run one request per URL with bounded concurrency under the batch deadline
    async fn run_batch<T, F, Fut>(&self, urls: &[String], label: &str, request: F) -> Result<Vec<T>>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = T>,
    {
        let progress = start_batch_progress(urls.len(), label);
        let work = stream::iter(urls.iter().cloned())
            .map(|url| {
                let fut = request(url);
                let progress = &progress;
                async move {
                    let result = fut.await;
                    advance_progress(progress);
                    result
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect::<Vec<T>>();

        let outcome = tokio::time::timeout(self.batch_timeout, work).await;
        finish_progress(progress);

        match outcome {
            Ok(results) => {
                info!("{}: {} URLs done", label, results.len());
                Ok(results)
            }
            Err(_) => Err(Error::ProbeBatchTimeout(self.batch_timeout.as_secs())),
        }
    }
}

fn header_content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(normalize_content_type)
}

#[async_trait]
impl RequestInterface for HttpRequestInterface {
    async fn probe_urls(&self, urls: &[String]) -> Result<Vec<ProbeResult>> {
        self.run_batch(urls, "Probing URLs", |url| self.probe_one(url))
            .await
    }

    async fn fetch_html(&self, urls: &[String]) -> Result<Vec<HtmlResponse>> {
        self.run_batch(urls, "Fetching pages", |url| self.fetch_page(url))
            .await
    }

    async fn check_status(&self, urls: &[String]) -> Result<Vec<StatusResponse>> {
        self.run_batch(urls, "Checking for 404s", |url| self.check_one(url))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeOutcome;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client() -> HttpRequestInterface {
        HttpRequestInterface::new(&ProbeConfig {
            timeout_secs: 5,
            batch_timeout_secs: 30,
            ..ProbeConfig::default()
        })
        .unwrap()
    }

    fn direct(result: ProbeResult) -> crate::probe::ProbeResponse {
        match result.outcome {
            ProbeOutcome::Direct(r) => r,
            ProbeOutcome::Redirect(_) => panic!("expected direct response"),
        }
    }

    #[tokio::test]
    async fn test_head_ok_is_accepted() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/ok"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("content-type", "text/html; charset=utf-8"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let url = format!("{}/ok", mock_server.uri());
        let r = direct(test_client().probe_one(url.clone()).await);
        assert_eq!(r.url, url);
        assert_eq!(r.status_code, Some(200));
        assert_eq!(r.content_type.as_deref(), Some("text/html"));
        assert!(r.error.is_none());
    }

    #[tokio::test]
    async fn test_head_rejected_falls_back_to_get() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let r = direct(
            test_client()
                .probe_one(format!("{}/page", mock_server.uri()))
                .await,
        );
        assert_eq!(r.status_code, Some(200));
        assert_eq!(r.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_server_error_on_both_attempts() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Something went wrong"))
            .mount(&mock_server)
            .await;

        let r = direct(
            test_client()
                .probe_one(format!("{}/broken", mock_server.uri()))
                .await,
        );
        assert_eq!(r.status_code, Some(500));
        assert!(r.content_type.is_none());
        assert_eq!(r.error.as_deref(), Some("Something went wrong"));
        assert!(r.accessed());
    }

    #[tokio::test]
    async fn test_redirect_is_split() {
        let mock_server = MockServer::start().await;
        let destination = format!("{}/b", mock_server.uri());
        Mock::given(path("/a"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", destination.as_str()))
            .mount(&mock_server)
            .await;
        Mock::given(path("/b"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
            .mount(&mock_server)
            .await;

        let source = format!("{}/a", mock_server.uri());
        let result = test_client().probe_one(source.clone()).await;
        assert_eq!(result.original_url, source);
        match result.outcome {
            ProbeOutcome::Redirect(pair) => {
                assert_eq!(pair.source.url, source);
                assert_eq!(pair.source.status_code, Some(301));
                assert!(pair.source.content_type.is_none());
                assert_eq!(pair.destination.url, destination);
                assert_eq!(pair.destination.status_code, Some(200));
                assert_eq!(pair.destination.content_type.as_deref(), Some("text/html"));
            }
            ProbeOutcome::Direct(_) => panic!("expected redirect pair"),
        }
    }

    #[tokio::test]
    async fn test_redirect_to_bare_host_keeps_location_spelling() {
        let mock_server = MockServer::start().await;
        let root = mock_server.uri();
        Mock::given(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", root.as_str()))
            .mount(&mock_server)
            .await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
            .mount(&mock_server)
            .await;

        let result = test_client().probe_one(format!("{}/old", root)).await;
        match result.outcome {
            ProbeOutcome::Redirect(pair) => {
                assert!(!root.ends_with('/'));
                assert_eq!(pair.destination.url, root);
                assert_eq!(pair.destination.status_code, Some(200));
            }
            ProbeOutcome::Direct(_) => panic!("expected redirect pair"),
        }
    }

    #[test]
    fn test_relative_location_is_resolved() {
        let base = Url::parse("https://pd.gov/a/b").unwrap();
        let joined = base.join("/c").unwrap();
        assert_eq!(resolved_location("/c", &joined), "https://pd.gov/c");
        let absolute = Url::parse("https://z.gov").unwrap();
        assert_eq!(resolved_location(" https://z.gov ", &absolute), "https://z.gov");
    }

    #[tokio::test]
    async fn test_redirect_loop_is_too_many_redirects() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&mock_server)
            .await;

        let r = direct(
            test_client()
                .probe_one(format!("{}/loop", mock_server.uri()))
                .await,
        );
        assert_eq!(r.status_code, None);
        assert_eq!(r.error.as_deref(), Some("Too many redirects"));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let r = direct(test_client().probe_one("not a url".to_string()).await);
        assert_eq!(r.error.as_deref(), Some("Invalid URL"));
        assert!(!r.accessed());

        let r = direct(test_client().probe_one("ftp://example.com".to_string()).await);
        assert_eq!(r.error.as_deref(), Some("Invalid URL"));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let r = direct(
            test_client()
                .probe_one(format!("http://127.0.0.1:{}/", port))
                .await,
        );
        assert_eq!(r.status_code, None);
        assert_eq!(r.error.as_deref(), Some("Connection failed"));
    }

    #[tokio::test]
    async fn test_batch_probes_every_url() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let urls: Vec<String> = (0..5)
            .map(|i| format!("{}/p{}", mock_server.uri(), i))
            .collect();
        let results = test_client().probe_urls(&urls).await.unwrap();
        assert_eq!(results.len(), 5);
        for url in &urls {
            assert!(results.iter().any(|r| &r.original_url == url));
        }
    }

    #[tokio::test]
    async fn test_batch_timeout_fails_the_batch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock_server)
            .await;

        let mut client = test_client();
        client.batch_timeout = Duration::from_millis(200);
        let result = client
            .probe_urls(&[format!("{}/slow", mock_server.uri())])
            .await;
        assert!(matches!(result, Err(Error::ProbeBatchTimeout(_))));
    }

    #[tokio::test]
    async fn test_fetch_page_and_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<title>Doc</title>", "text/html"),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = test_client();
        let page = client.fetch_page(format!("{}/doc", mock_server.uri())).await;
        assert!(page.is_success());
        assert_eq!(page.html.as_deref(), Some("<title>Doc</title>"));

        let missing = client
            .fetch_page(format!("{}/missing", mock_server.uri()))
            .await;
        assert!(!missing.is_success());
        assert_eq!(missing.status_code, Some(404));

        let status = client
            .check_one(format!("{}/missing", mock_server.uri()))
            .await;
        assert_eq!(status.status_code, Some(404));
    }
}

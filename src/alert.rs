//! Fire-and-forget alert sinks
//!
//! Alerts go out when an operator run ends in error and when the task
//! manager gives up on an operator that keeps finding work.

use crate::config::AlertConfig;
use crate::error::{Error, Result};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Somewhere to post operator alerts; posting never blocks or fails the caller
pub trait Alerter: Send + Sync {
    fn post(&self, message: &str);
}

/// Alerts that only reach the log
#[derive(Debug, Default, Clone)]
pub struct LogAlerter;

impl Alerter for LogAlerter {
    fn post(&self, message: &str) {
        warn!("ALERT: {}", message);
    }
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Discord-compatible webhook
#[derive(Clone)]
pub struct DiscordAlerter {
    client: Client,
    webhook_url: Url,
}

impl DiscordAlerter {
    pub fn new(webhook_url: &str) -> Result<Self> {
        let webhook_url = Url::parse(webhook_url)
            .map_err(|e| Error::Config(format!("Invalid alert webhook URL: {}", e)))?;
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            webhook_url,
        })
    }

    /// Send one message and wait for the webhook to accept it
    pub async fn send(&self, message: &str) -> Result<()> {
        self.client
            .post(self.webhook_url.clone())
            .json(&WebhookMessage { content: message })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl Alerter for DiscordAlerter {
    fn post(&self, message: &str) {
        // Logged locally too, in case the webhook is down
        warn!("ALERT: {}", message);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available, alert not sent to webhook");
            return;
        };
        let alerter = self.clone();
        let message = message.to_string();
        handle.spawn(async move {
            if let Err(e) = alerter.send(&message).await {
                warn!("Failed to post alert to webhook: {}", e);
            }
        });
    }
}

/// Build the configured alert sink
pub fn create_alerter(config: &AlertConfig) -> Result<Arc<dyn Alerter>> {
    match config.discord_webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => Ok(Arc::new(DiscordAlerter::new(url)?)),
        _ => Ok(Arc::new(LogAlerter)),
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use super::Alerter;
    use std::sync::Mutex;

    /// Keeps every alert for assertions
    #[derive(Default)]
    pub struct RecordingAlerter {
        messages: Mutex<Vec<String>>,
    }

    impl RecordingAlerter {
        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl Alerter for RecordingAlerter {
        fn post(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_discord_alerter_posts_content() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(serde_json::json!({"content": "Task 3 (probe) failed with error."})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let alerter = DiscordAlerter::new(&format!("{}/hook", mock_server.uri())).unwrap();
        alerter
            .send("Task 3 (probe) failed with error.")
            .await
            .unwrap();
    }

    #[test]
    fn test_create_alerter_falls_back_to_log() {
        let alerter = create_alerter(&AlertConfig {
            discord_webhook_url: None,
        })
        .unwrap();
        alerter.post("logged only");

        let invalid = create_alerter(&AlertConfig {
            discord_webhook_url: Some("not a url".to_string()),
        });
        assert!(invalid.is_err());
    }
}

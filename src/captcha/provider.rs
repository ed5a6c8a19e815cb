//! Token service client
//!
//! The solving itself happens at an external provider; this client
//! submits the challenge parameters and polls until a token comes back
//! or the wait budget runs out.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::core::config::CaptchaConfig;
use crate::core::{ColetorError, Result};

/// Capability that turns (site key, page URL) into a solution token.
///
/// Calls may block for tens of seconds; the provider enforces its own
/// upper bound and fails past it.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Solve one challenge
    async fn solve(&self, site_key: &str, page_url: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ServiceReply {
    status: u8,
    request: String,
}

/// HTTP token service with the submit-then-poll protocol
pub struct HttpTokenProvider {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    solve_timeout: Duration,
    poll_interval: Duration,
}

impl HttpTokenProvider {
    /// Build the provider client from configuration
    pub fn new(config: &CaptchaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            solve_timeout: Duration::from_secs(config.solve_timeout_secs),
            poll_interval: Duration::from_secs(config.poll_secs),
        })
    }

    async fn submit(&self, site_key: &str, page_url: &str) -> Result<String> {
        let reply: ServiceReply = self
            .http
            .get(format!("{}/in.php", self.api_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("method", "userrecaptcha"),
                ("googlekey", site_key),
                ("pageurl", page_url),
                ("json", "1"),
            ])
            .send()
            .await
            .map_err(|e| ColetorError::external("token service", e.to_string()))?
            .json()
            .await
            .map_err(|e| ColetorError::external("token service", e.to_string()))?;

        if reply.status != 1 {
            return Err(ColetorError::external("token service", reply.request));
        }
        Ok(reply.request)
    }

    async fn poll(&self, task_id: &str) -> Result<Option<String>> {
        let reply: ServiceReply = self
            .http
            .get(format!("{}/res.php", self.api_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", task_id),
                ("json", "1"),
            ])
            .send()
            .await
            .map_err(|e| ColetorError::external("token service", e.to_string()))?
            .json()
            .await
            .map_err(|e| ColetorError::external("token service", e.to_string()))?;

        if reply.status == 1 {
            return Ok(Some(reply.request));
        }
        if reply.request == "CAPCHA_NOT_READY" {
            return Ok(None);
        }
        Err(ColetorError::external("token service", reply.request))
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn solve(&self, site_key: &str, page_url: &str) -> Result<String> {
        let task_id = self.submit(site_key, page_url).await?;
        debug!(task_id = %task_id, "challenge submitted to token service");

        let deadline = Instant::now() + self.solve_timeout;
        loop {
            sleep(self.poll_interval).await;
            if let Some(token) = self.poll(&task_id).await? {
                debug!(task_id = %task_id, "token received");
                return Ok(token);
            }
            if Instant::now() >= deadline {
                return Err(ColetorError::challenge_timeout(format!(
                    "token service produced nothing within {}s",
                    self.solve_timeout.as_secs()
                )));
            }
        }
    }
}

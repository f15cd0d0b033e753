//! HTTP transport: randomized client identity, per-request timeouts, response
//! classification and retry.
//!
//! The [`Fetch`] trait is the seam the rest of the pipeline talks to, so the
//! scheduler and cache can be driven by in-memory fakes in tests.

use crate::config::{IdentityRotation, TransportConfig};
use crate::error::{Error, NetworkError, Result};
use crate::retry::RetryPolicy;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};

/// Browser identities rotated through to reduce upstream blocking
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

/// What the caller expects the response body to be
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExpectedKind {
    /// An HTML document or fragment
    Html,
    /// Raw image bytes
    Image,
    /// A JSON document
    Json,
}

impl ExpectedKind {
    /// Short name used in errors and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpectedKind::Html => "html",
            ExpectedKind::Image => "image",
            ExpectedKind::Json => "json",
        }
    }

    fn accept_header(&self) -> &'static str {
        match self {
            ExpectedKind::Html => "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
            ExpectedKind::Image => "image/avif,image/webp,image/png,image/jpeg,image/*;q=0.8,*/*;q=0.5",
            ExpectedKind::Json => "application/json,*/*;q=0.5",
        }
    }

    /// Whether a Content-Type header contradicts this kind
    fn rejects(&self, content_type: &str) -> bool {
        let ct = content_type.to_ascii_lowercase();
        match self {
            // Error and challenge pages come back as HTML with a 200
            ExpectedKind::Image | ExpectedKind::Json => ct.starts_with("text/html"),
            ExpectedKind::Html => false,
        }
    }
}

/// Abstraction over network retrieval, enabling testability
#[async_trait::async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch `url` and return its body bytes
    async fn fetch(&self, url: &str, expected: ExpectedKind) -> Result<Vec<u8>>;
}

/// Production [`Fetch`] backed by `reqwest`
pub struct HttpTransport {
    client: reqwest::Client,
    policy: RetryPolicy,
    rotation: IdentityRotation,
    agents: Vec<String>,
    session_agent: String,
}

impl HttpTransport {
    /// Build a transport from configuration
    pub fn new(config: &TransportConfig, policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build HTTP client: {}", e),
                key: None,
            })?;

        let agents: Vec<String> = if config.user_agents.is_empty() {
            USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            config.user_agents.clone()
        };
        let session_agent = pick_agent(&agents);

        Ok(Self {
            client,
            policy,
            rotation: config.identity,
            agents,
            session_agent,
        })
    }

    /// The retry policy in effect
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn identity(&self) -> String {
        match self.rotation {
            IdentityRotation::PerRequest => pick_agent(&self.agents),
            IdentityRotation::PerSession => self.session_agent.clone(),
        }
    }

    /// One attempt, no retry
    async fn attempt(
        &self,
        url: &str,
        expected: ExpectedKind,
    ) -> std::result::Result<Vec<u8>, NetworkError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.identity())
            .header(ACCEPT, expected.accept_header())
            .send()
            .await
            .map_err(|e| NetworkError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                attempts: 1,
                retryable: self.policy.retries_status(status.as_u16()),
            });
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            && expected.rejects(content_type)
        {
            return Err(NetworkError::UnexpectedContent {
                url: url.to_string(),
                expected: expected.as_str(),
                content_type: content_type.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::from_reqwest(url, &e))?;
        Ok(body.to_vec())
    }
}

#[async_trait::async_trait]
impl Fetch for HttpTransport {
    async fn fetch(&self, url: &str, expected: ExpectedKind) -> Result<Vec<u8>> {
        tracing::debug!(url, kind = expected.as_str(), "Fetching");

        let mut attempts = 0u32;
        let result = self
            .policy
            .run(|| {
                attempts += 1;
                self.attempt(url, expected)
            })
            .await;

        result.map_err(|e| Error::Network(e.with_attempts(attempts)))
    }
}

fn pick_agent(agents: &[String]) -> String {
    agents
        .choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_else(|| USER_AGENTS[0].to_string())
}

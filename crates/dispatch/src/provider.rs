//! Transactional email provider client.
//!
//! HTTPS, API-key + secret basic auth, one message per recipient. 2xx is
//! success, 5xx and transport failures are retryable, 4xx is not.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use inviteflow_core::DomainError;

/// One outbound message, always a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Provider-side failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network-level failure (DNS, connect, timeout). Retryable.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Non-2xx HTTP response. Retryable iff 5xx.
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl ProviderError {
    /// Default retry condition: HTTP >= 500 or transport failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
        }
    }
}

/// Email provider contract. Implementations send exactly one message per
/// call; retry policy is the caller's concern.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), ProviderError>;
}

/// Provider credentials and addressing, loaded from the environment.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub from_address: String,
    /// Origin used to render invitation deep links.
    pub origin: String,
}

impl ProviderConfig {
    /// Load from `EMAIL_API_URL`, `EMAIL_API_KEY`, `EMAIL_API_SECRET`,
    /// `EMAIL_FROM` and `APP_ORIGIN`. Missing credentials are a
    /// configuration error: nothing may be sent without them.
    pub fn from_env() -> Result<Self, DomainError> {
        let required = |name: &str| {
            std::env::var(name)
                .map_err(|_| DomainError::configuration(format!("{name} is not set")))
        };
        Ok(Self {
            api_url: required("EMAIL_API_URL")?,
            api_key: required("EMAIL_API_KEY")?,
            api_secret: required("EMAIL_API_SECRET")?,
            from_address: required("EMAIL_FROM")?,
            origin: required("APP_ORIGIN")?,
        })
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// reqwest-backed provider client.
#[derive(Debug, Clone)]
pub struct HttpEmailProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpEmailProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn origin(&self) -> &str {
        &self.config.origin
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<(), ProviderError> {
        let body = SendRequest {
            from: &self.config.from_address,
            to: &message.to,
            subject: &message.subject,
            html: &message.html,
        };
        let response = self
            .client
            .post(&self.config.api_url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(to = %message.to, "provider accepted message");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

use super::{ApiVariant, Upstream};
use crate::config::UpstreamConfig;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use hyper::ext::ReasonPhrase;
use reqwest::header::CONTENT_TYPE;
use reqwest::Proxy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Production [`Upstream`]: POSTs the payload verbatim to the generation API.
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    inflight: Arc<Semaphore>,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    "invalid outbound proxy URL",
                    ErrorContext::new()
                        .with_field_path("upstream.proxy_url")
                        .with_details(e.to_string())
                        .with_source("http_upstream"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            inflight: Arc::new(Semaphore::new(config.max_inflight.max(1))),
        })
    }

    pub fn endpoint(&self, variant: ApiVariant) -> String {
        format!("{}{}", self.base_url, variant.path())
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn call(&self, payload: &str, variant: ApiVariant) -> Result<String> {
        let _permit = self.inflight.acquire().await.map_err(|_| {
            Error::runtime_with_context(
                "upstream concurrency limiter closed",
                ErrorContext::new().with_source("http_upstream"),
            )
        })?;

        let url = self.endpoint(variant);
        debug!(%url, variant = %variant, "sending upstream request");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(&self.api_key)
            .body(payload.to_owned())
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::from(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream {
                status: status.as_u16(),
                status_text: status_text(&response),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(TransportError::from(e)))?;

        variant.extract(status.as_u16(), &body)
    }
}

/// Reason phrase as sent by the upstream, else the canonical one for the status.
fn status_text(response: &reqwest::Response) -> String {
    response
        .extensions()
        .get::<ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .unwrap_or_else(|| {
            response
                .status()
                .canonical_reason()
                .unwrap_or_default()
                .to_string()
        })
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http(e) => e.status().map(|s| s.as_u16()),
            TransportError::Other(_) => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(Arc::new(e))
    }
}

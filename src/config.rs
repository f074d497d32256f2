//! Process configuration.
//!
//! Loaded from an optional YAML file, then overridden from the environment:
//!
//! - `OPENAI_API_KEY` upstream bearer credential
//! - `GENAI_PROXY_BASE_URL` upstream base URL
//! - `GENAI_PROXY_TIMEOUT_SECS` execution timeout for one upstream call (default 300)
//! - `GENAI_PROXY_MAX_INFLIGHT` concurrent upstream calls (default 1)
//! - `GENAI_PROXY_HTTP_PROXY` outbound proxy URL
//! - `GENAI_PROXY_BIND` listen address (default `0.0.0.0:8080`)
//! - `GENAI_PROXY_CACHE_MAX_ENTRIES` bound on cached fingerprints (default unbounded)
//! - `GENAI_PROXY_PUBLISH_MODE` `relaxed` or `strict`

use crate::dedup::PublishMode;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub timeout_secs: u64,
    pub max_inflight: usize,
    pub proxy_url: Option<String>,
    pub pool_max_idle_per_host: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            timeout_secs: 300,
            max_inflight: 1,
            proxy_url: None,
            pool_max_idle_per_host: 32,
        }
    }
}

impl UpstreamConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// Keeps the credential out of logs and panic messages.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("timeout_secs", &self.timeout_secs)
            .field("max_inflight", &self.max_inflight)
            .field("proxy_url", &self.proxy_url)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Reflect any origin, as browser clients call the proxy directly.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            cors: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `None` keeps every fingerprint for the life of the process.
    pub max_entries: Option<usize>,
    pub publish_mode: PublishMode,
}

impl ProxyConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            Error::configuration_with_context(
                "invalid YAML configuration",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            Error::Configuration { message, context } => Error::Configuration {
                message,
                context: context.with_field_path(path.display().to_string()),
            },
            other => other,
        })
    }

    /// File (if any), then environment, then an explicit bind address, then validation.
    pub fn load(path: Option<&Path>, bind: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_path(p)?,
            None => Self::default(),
        }
        .with_env_overrides();
        if let Some(bind) = bind {
            config.server.bind = bind.to_string();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source. Unparsable values are ignored.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.upstream.api_key = key;
        }
        if let Some(url) = lookup("GENAI_PROXY_BASE_URL") {
            self.upstream.base_url = url;
        }
        if let Some(secs) = lookup("GENAI_PROXY_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok())
        {
            self.upstream.timeout_secs = secs;
        }
        if let Some(n) = lookup("GENAI_PROXY_MAX_INFLIGHT").and_then(|s| s.parse::<usize>().ok()) {
            self.upstream.max_inflight = n;
        }
        if let Some(proxy) = lookup("GENAI_PROXY_HTTP_PROXY") {
            self.upstream.proxy_url = Some(proxy);
        }
        if let Some(bind) = lookup("GENAI_PROXY_BIND") {
            self.server.bind = bind;
        }
        if let Some(n) =
            lookup("GENAI_PROXY_CACHE_MAX_ENTRIES").and_then(|s| s.parse::<usize>().ok())
        {
            self.cache.max_entries = Some(n);
        }
        if let Some(mode) = lookup("GENAI_PROXY_PUBLISH_MODE") {
            match mode.parse::<PublishMode>() {
                Ok(m) => self.cache.publish_mode = m,
                Err(_) => tracing::warn!(value = %mode, "ignoring unknown publish mode"),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, msg: &str| {
            Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(field)
                    .with_source("config_validator"),
            )
        };

        if self.upstream.api_key.trim().is_empty() {
            return Err(invalid("upstream.api_key", "upstream API key is empty"));
        }
        if let Err(e) = url::Url::parse(&self.upstream.base_url) {
            return Err(Error::configuration_with_context(
                "upstream base URL is not a valid URL",
                ErrorContext::new()
                    .with_field_path("upstream.base_url")
                    .with_details(e.to_string())
                    .with_source("config_validator"),
            ));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(invalid("upstream.timeout_secs", "timeout must be positive"));
        }
        if self.upstream.max_inflight == 0 {
            return Err(invalid(
                "upstream.max_inflight",
                "max_inflight must be at least 1",
            ));
        }
        if self.cache.max_entries == Some(0) {
            return Err(invalid(
                "cache.max_entries",
                "max_entries must be at least 1 when set",
            ));
        }
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(invalid("server.bind", "bind address is not host:port"));
        }
        Ok(())
    }
}

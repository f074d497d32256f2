//! # genai-dedup-proxy
//!
//! 生成式 AI API 前置代理：合并并发的重复请求，避免重复的上游调用。
//!
//! A proxy in front of a generative-AI HTTP API that coalesces duplicate
//! in-flight requests.
//!
//! ## Overview
//!
//! Clients submit an opaque serialized request body plus an idempotency key.
//! The proxy forwards the body to the upstream API and returns the single
//! field the client cares about (a completion's message content or a
//! generated image URL). When the same body arrives again with the same key
//! while the first call is still running, or after it finished, the caller
//! joins that call instead of paying for another one. A new key for the same
//! body starts a fresh generation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use genai_dedup_proxy::{ProxyConfig, serve};
//!
//! #[tokio::main]
//! async fn main() -> genai_dedup_proxy::Result<()> {
//!     let config = ProxyConfig::load(None, None)?;
//!     serve(config).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`dedup`] | Fingerprint → (token, shared handle) cache |
//! | [`coordinator`] | Join / start / replace policy per request |
//! | [`upstream`] | Outbound call and response normalization |
//! | [`server`] | `axum` routes for `/chat` and `/image` |
//! | [`config`] | YAML + environment configuration |

pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod server;
pub mod upstream;

pub use config::ProxyConfig;
pub use coordinator::{Coordinator, CoordinatorStats};
pub use dedup::{Decision, DedupCache, GenerationHandle, PublishMode};
pub use server::{router, serve, AppState};
pub use upstream::{ApiVariant, HttpUpstream, Upstream};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

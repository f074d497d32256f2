//! 请求去重缓存：按请求指纹合并并发的上游调用。
//!
//! # In-flight Deduplication
//!
//! Maps a request fingerprint (the verbatim serialized payload) to the
//! idempotency token last seen for it and a shared handle to the upstream
//! computation started for that token.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`DedupCache`] | Process-wide fingerprint → [`InFlightEntry`] store |
//! | [`GenerationHandle`] | Broadcast-once handle to a spawned upstream call |
//! | [`PublishMode`] | Whether lookup-decide-publish runs in one critical section |
//! | [`Decision`] | What the coordinator did with an incoming request |
//!
//! ## Example
//!
//! ```rust
//! use genai_dedup_proxy::dedup::{DedupCache, GenerationHandle};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = DedupCache::new();
//! let handle = GenerationHandle::spawn(async { Ok("hello".to_string()) });
//! cache.publish(r#"{"model":"gpt-4o"}"#, "k1", handle);
//!
//! let (token, joined) = cache.lookup(r#"{"model":"gpt-4o"}"#).unwrap();
//! assert_eq!(token, "k1");
//! assert_eq!(joined.await.unwrap(), "hello");
//! # }
//! ```

mod cache;
mod handle;

pub use cache::{Decision, DedupCache, InFlightEntry, PublishMode};
pub use handle::GenerationHandle;

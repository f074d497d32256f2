//! Request coordinator: the per-request entry point.
//!
//! For each `(fingerprint, token)` pair it either starts a new upstream call
//! and publishes its handle, or awaits the handle already published for the
//! same token. Failures are cached exactly like successes, so a same-token
//! retry replays the failure and a new token retries from scratch.

use crate::dedup::{Decision, DedupCache, GenerationHandle, PublishMode};
use crate::upstream::{ApiVariant, Upstream};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub started: u64,
    pub joined: u64,
    pub replaced: u64,
    /// Requests rejected for lacking an idempotency key.
    pub rejected: u64,
}

#[derive(Default)]
struct AtomicStats {
    started: AtomicU64,
    joined: AtomicU64,
    replaced: AtomicU64,
    rejected: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            started: self.started.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

pub struct Coordinator {
    cache: Arc<DedupCache>,
    upstream: Arc<dyn Upstream>,
    mode: PublishMode,
    stats: AtomicStats,
}

impl Coordinator {
    pub fn new(cache: Arc<DedupCache>, upstream: Arc<dyn Upstream>, mode: PublishMode) -> Self {
        Self {
            cache,
            upstream,
            mode,
            stats: AtomicStats::default(),
        }
    }

    pub fn cache(&self) -> &Arc<DedupCache> {
        &self.cache
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats.to_stats()
    }

    /// Resolve one inbound request to the upstream's extracted text.
    ///
    /// A missing or empty `token` fails with [`Error::MissingCredential`]
    /// before the cache or the upstream is touched.
    pub async fn handle(
        &self,
        fingerprint: &str,
        token: Option<&str>,
        variant: ApiVariant,
    ) -> Result<String> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(%variant, "rejecting request without idempotency key");
                return Err(Error::MissingCredential);
            }
        };

        let (handle, decision) = match self.mode {
            PublishMode::Strict => self.cache.join_or_publish(fingerprint, token, || {
                self.start(fingerprint, variant)
            }),
            PublishMode::Relaxed => self.decide_relaxed(fingerprint, token, variant),
        };
        self.record(decision);

        let digest = fingerprint_digest(fingerprint);
        info!(
            fingerprint = %digest,
            generation = %handle.id(),
            ?decision,
            %variant,
            "dedup decision"
        );

        let outcome = handle.await;
        match &outcome {
            Ok(text) => debug!(fingerprint = %digest, len = text.len(), "generation resolved"),
            Err(e) if e.is_upstream() => {
                warn!(fingerprint = %digest, kind = e.kind(), status = ?e.upstream_status(), error = %e, "upstream generation failed")
            }
            Err(e) => error!(fingerprint = %digest, kind = e.kind(), error = %e, "generation failed"),
        }
        outcome
    }

    // Lookup and publish lock the cache separately; see `PublishMode::Relaxed`.
    fn decide_relaxed(
        &self,
        fingerprint: &str,
        token: &str,
        variant: ApiVariant,
    ) -> (GenerationHandle, Decision) {
        let decision = match self.cache.lookup(fingerprint) {
            Some((stored, handle)) if stored == token => return (handle, Decision::Joined),
            Some(_) => Decision::Replaced,
            None => Decision::Started,
        };
        let handle = self.start(fingerprint, variant);
        self.cache.publish(fingerprint, token, handle.clone());
        (handle, decision)
    }

    fn start(&self, fingerprint: &str, variant: ApiVariant) -> GenerationHandle {
        let upstream = Arc::clone(&self.upstream);
        let payload = fingerprint.to_owned();
        GenerationHandle::spawn(async move { upstream.call(&payload, variant).await })
    }

    fn record(&self, decision: Decision) {
        let counter = match decision {
            Decision::Started => &self.stats.started,
            Decision::Joined => &self.stats.joined,
            Decision::Replaced => &self.stats.replaced,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Short SHA-256 digest of a fingerprint, safe to log in place of the payload.
pub fn fingerprint_digest(fingerprint: &str) -> String {
    let digest = Sha256::digest(fingerprint.as_bytes());
    digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}

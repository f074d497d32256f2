//! Fingerprint → (token, handle) store.

use super::handle::GenerationHandle;
use crate::config::CacheConfig;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// How the coordinator sequences lookup, decision and publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Lookup and publish take the lock separately. Two truly simultaneous
    /// first arrivals may both start an upstream call; the later publish wins.
    #[default]
    Relaxed,
    /// Lookup-decide-publish is one critical section: at most one upstream
    /// call per (fingerprint, token) generation.
    Strict,
}

impl FromStr for PublishMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relaxed" => Ok(PublishMode::Relaxed),
            "strict" => Ok(PublishMode::Strict),
            other => Err(format!("unknown publish mode: {}", other)),
        }
    }
}

/// What happened to an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First sighting of the fingerprint: a new upstream call was started.
    Started,
    /// Same token as the stored entry: awaited the existing handle.
    Joined,
    /// Different token: a new upstream call replaced the stored entry.
    Replaced,
}

/// Last-seen token and the handle published with it.
///
/// Token and handle live in one value, so they are always written and
/// dropped together.
#[derive(Debug, Clone)]
pub struct InFlightEntry {
    pub token: String,
    pub handle: GenerationHandle,
}

enum Store {
    Unbounded(HashMap<String, InFlightEntry>),
    Bounded(LruCache<String, InFlightEntry>),
}

impl Store {
    fn get(&mut self, fingerprint: &str) -> Option<&InFlightEntry> {
        match self {
            Store::Unbounded(map) => map.get(fingerprint),
            Store::Bounded(lru) => lru.get(fingerprint),
        }
    }

    /// Insert or overwrite. Returns true when a different fingerprint was evicted.
    fn insert(&mut self, fingerprint: &str, entry: InFlightEntry) -> bool {
        match self {
            Store::Unbounded(map) => {
                map.insert(fingerprint.to_string(), entry);
                false
            }
            Store::Bounded(lru) => match lru.push(fingerprint.to_string(), entry) {
                Some((old_key, _)) => old_key != fingerprint,
                None => false,
            },
        }
    }

    fn len(&self) -> usize {
        match self {
            Store::Unbounded(map) => map.len(),
            Store::Bounded(lru) => lru.len(),
        }
    }
}

/// Process-wide deduplication cache.
///
/// Unbounded by default: entries live for the life of the process. With a
/// bound, the least-recently-used fingerprint is evicted; anyone already
/// awaiting the evicted handle still receives its outcome.
pub struct DedupCache {
    store: Mutex<Store>,
    evictions: AtomicU64,
}

impl DedupCache {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store::Unbounded(HashMap::new())),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn bounded(max_entries: NonZeroUsize) -> Self {
        Self {
            store: Mutex::new(Store::Bounded(LruCache::new(max_entries))),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        match config.max_entries.and_then(NonZeroUsize::new) {
            Some(n) => Self::bounded(n),
            None => Self::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current entry for `fingerprint`, if any.
    pub fn lookup(&self, fingerprint: &str) -> Option<(String, GenerationHandle)> {
        self.lock()
            .get(fingerprint)
            .map(|e| (e.token.clone(), e.handle.clone()))
    }

    /// Overwrite the token and handle for `fingerprint`.
    ///
    /// The previous handle, if any, is no longer reachable from the cache but
    /// is not cancelled.
    pub fn publish(&self, fingerprint: &str, token: &str, handle: GenerationHandle) {
        let entry = InFlightEntry {
            token: token.to_string(),
            handle,
        };
        if self.lock().insert(fingerprint, entry) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Lookup, decide and (if needed) publish under one lock.
    ///
    /// `start` runs only when a new computation is required, and its handle is
    /// published before the lock is released.
    pub fn join_or_publish<F>(
        &self,
        fingerprint: &str,
        token: &str,
        start: F,
    ) -> (GenerationHandle, Decision)
    where
        F: FnOnce() -> GenerationHandle,
    {
        let mut store = self.lock();
        let decision = match store.get(fingerprint) {
            Some(entry) if entry.token == token => {
                return (entry.handle.clone(), Decision::Joined);
            }
            Some(_) => Decision::Replaced,
            None => Decision::Started,
        };

        let handle = start();
        let entry = InFlightEntry {
            token: token.to_string(),
            handle: handle.clone(),
        };
        if store.insert(fingerprint, entry) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        (handle, decision)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fingerprints dropped to stay within `max_entries`.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

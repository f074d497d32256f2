//! Shared fixtures: a scriptable upstream stub.
#![allow(dead_code)]

use async_trait::async_trait;
use genai_dedup_proxy::{ApiVariant, Error, Result, Upstream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

type Responder = Box<dyn Fn(&str, ApiVariant) -> Result<String> + Send + Sync>;

/// Counts invocations, optionally waits on a gate or a delay, then answers
/// with a scripted outcome.
pub struct StubUpstream {
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, ApiVariant)>>,
    gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
    respond: Responder,
}

impl StubUpstream {
    pub fn text(value: &str) -> Self {
        let value = value.to_string();
        Self::with(move |_, _| Ok(value.clone()))
    }

    pub fn failing(status: u16, status_text: &str) -> Self {
        let status_text = status_text.to_string();
        Self::with(move |_, _| {
            Err(Error::Upstream {
                status,
                status_text: status_text.clone(),
            })
        })
    }

    pub fn with<F>(respond: F) -> Self
    where
        F: Fn(&str, ApiVariant) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            gate: None,
            delay: None,
            respond: Box::new(respond),
        }
    }

    /// Hold every call until the gate receives a permit.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<(String, ApiVariant)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for StubUpstream {
    async fn call(&self, payload: &str, variant: ApiVariant) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((payload.to_string(), variant));

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.expect("gate closed");
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(payload, variant)
    }
}

/// Yield until `cond` holds, failing the test after a generous bound.
pub async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

//! Broadcast-once generation handle.

use crate::{Error, ErrorContext, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use uuid::Uuid;

/// Shared, single-assignment handle to one upstream computation.
///
/// Every clone resolves to the same outcome. The computation itself runs on
/// its own task, so it completes even if every awaiter is dropped.
#[derive(Clone)]
pub struct GenerationHandle {
    id: Uuid,
    inner: Shared<BoxFuture<'static, Result<String>>>,
}

impl GenerationHandle {
    /// Spawn `computation` on the current tokio runtime and share its outcome.
    pub fn spawn<F>(computation: F) -> Self
    where
        F: Future<Output = Result<String>> + Send + 'static,
    {
        let task = tokio::spawn(computation);
        let inner = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::runtime_with_context(
                    "upstream task did not complete",
                    ErrorContext::new()
                        .with_details(e.to_string())
                        .with_source("generation_handle"),
                )),
            }
        }
        .boxed()
        .shared();

        Self {
            id: Uuid::new_v4(),
            inner,
        }
    }

    /// A handle that is already resolved.
    pub fn ready(outcome: Result<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: futures::future::ready(outcome).boxed().shared(),
        }
    }

    /// Correlation id for logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The outcome, if some awaiter has already driven the handle to completion.
    pub fn peek(&self) -> Option<&Result<String>> {
        self.inner.peek()
    }

    /// True when both handles share the same underlying computation.
    pub fn same_generation(&self, other: &GenerationHandle) -> bool {
        self.id == other.id
    }
}

impl Future for GenerationHandle {
    type Output = Result<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for GenerationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.peek() {
            None => "pending",
            Some(Ok(_)) => "succeeded",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("GenerationHandle")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio_test::{assert_pending, task};

    #[tokio::test]
    async fn clones_observe_one_outcome() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = GenerationHandle::spawn(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok("v".to_string())
        });

        let (a, b, c) = tokio::join!(handle.clone(), handle.clone(), handle.clone());
        assert_eq!(a.unwrap(), "v");
        assert_eq!(b.unwrap(), "v");
        assert_eq!(c.unwrap(), "v");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(matches!(handle.peek(), Some(Ok(v)) if v == "v"));
    }

    #[tokio::test]
    async fn failure_is_replayed_to_late_awaiters() {
        let handle = GenerationHandle::spawn(async {
            Err(Error::Upstream {
                status: 503,
                status_text: "Service Unavailable".into(),
            })
        });
        assert!(handle.clone().await.is_err());
        match handle.await {
            Err(Error::Upstream { status, .. }) => assert_eq!(status, 503),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn computation_finishes_without_awaiters() {
        let (tx, rx) = oneshot::channel();
        let handle = GenerationHandle::spawn(async move {
            let _ = tx.send(());
            Ok("done".to_string())
        });
        drop(handle);
        rx.await.expect("spawned computation ran to completion");
    }

    #[tokio::test]
    async fn pending_until_computation_resolves() {
        let (tx, rx) = oneshot::channel::<()>();
        let handle = GenerationHandle::spawn(async move {
            let _ = rx.await;
            Ok("late".to_string())
        });

        let mut waiter = task::spawn(handle.clone());
        assert_pending!(waiter.poll());
        assert!(handle.peek().is_none());

        tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), "late");
    }

    #[tokio::test]
    async fn ready_handles_are_distinct_generations() {
        let a = GenerationHandle::ready(Ok("x".into()));
        let b = GenerationHandle::ready(Ok("x".into()));
        assert!(a.same_generation(&a.clone()));
        assert!(!a.same_generation(&b));
        assert!(format!("{:?}", a).contains("pending"));
    }
}

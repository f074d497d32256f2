//! Upstream client: exactly one outbound call to the generation API per
//! invocation, normalized to the single text field the caller cares about.
//!
//! [`Upstream`] is the seam between the coordinator and the network. The
//! production implementation is [`HttpUpstream`]; tests substitute stubs.

mod http;
mod variant;

pub use http::{HttpUpstream, TransportError};
pub use variant::ApiVariant;

use crate::Result;
use async_trait::async_trait;

/// One outbound generation call.
///
/// Implementations perform no retries: the first failure observed is the
/// outcome of the call.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn call(&self, payload: &str, variant: ApiVariant) -> Result<String>;
}

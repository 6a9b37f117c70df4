//! Bounded collaborator calls.
//!
//! Every outbound call to the identity verifier, the stores, and the upstream
//! mirror goes through [`bounded`] so a hung collaborator surfaces as a
//! retriable [`RegistryError::Timeout`] instead of stalling the request.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Collaborator, RegistryError, RegistryResult};

/// Await `fut`, failing with `Timeout` once `after` elapses.
pub(crate) async fn bounded<T, F>(
    collaborator: Collaborator,
    after: Duration,
    fut: F,
) -> RegistryResult<T>
where
    F: Future<Output = RegistryResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(%collaborator, timeout_ms = after.as_millis() as u64, "collaborator call timed out");
            Err(RegistryError::Timeout {
                collaborator,
                after,
            })
        }
    }
}

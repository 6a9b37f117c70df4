//! Uploader set management.
//!
//! Mutations are read-modify-write cycles over the package's uploader set.
//! They run under the same per-package lock as publishes and commit with a
//! revision compare-and-swap, so concurrent changes are never lost; a stale
//! swap re-reads the set and re-checks every rule before trying again.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::IdentityResolver;
use crate::deadline::bounded;
use crate::error::{Collaborator, RegistryError, RegistryResult};
use crate::locks::KeyedLocks;
use crate::store::{MetadataStore, SwapOutcome};
use crate::types::{normalize_email, Revisioned, UploaderSet};

/// How many stale swaps a mutation tolerates before giving up.
const SWAP_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy)]
enum Change {
    Add,
    Remove,
}

/// Adds and removes co-publishers of a package.
#[derive(Clone)]
pub struct UploaderManager {
    identity: IdentityResolver,
    metadata: Arc<dyn MetadataStore>,
    locks: KeyedLocks,
    timeout: Duration,
}

impl UploaderManager {
    pub fn new(
        identity: IdentityResolver,
        metadata: Arc<dyn MetadataStore>,
        locks: KeyedLocks,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            metadata,
            locks,
            timeout,
        }
    }

    /// Current uploaders of `package`.
    pub async fn list(&self, package: &str) -> RegistryResult<Vec<String>> {
        match self.load(package).await? {
            Some(set) => Ok(set.value.to_vec()),
            None => Err(RegistryError::NotFound {
                package: package.to_string(),
                version: None,
            }),
        }
    }

    /// Add `new_email` to the uploaders of `package`.
    pub async fn add(
        &self,
        package: &str,
        new_email: &str,
        credential: Option<&str>,
    ) -> RegistryResult<()> {
        self.mutate(package, new_email, credential, Change::Add)
            .await
    }

    /// Remove `target_email` from the uploaders of `package`.
    pub async fn remove(
        &self,
        package: &str,
        target_email: &str,
        credential: Option<&str>,
    ) -> RegistryResult<()> {
        self.mutate(package, target_email, credential, Change::Remove)
            .await
    }

    async fn load(&self, package: &str) -> RegistryResult<Option<Revisioned<UploaderSet>>> {
        bounded(
            Collaborator::MetadataStore,
            self.timeout,
            self.metadata.uploaders(package),
        )
        .await
    }

    async fn mutate(
        &self,
        package: &str,
        email: &str,
        credential: Option<&str>,
        change: Change,
    ) -> RegistryResult<()> {
        let identity = self.identity.require(credential).await?;
        let target = normalize_email(email);

        if target.is_empty() {
            return Err(RegistryError::invariant("uploader email must not be empty"));
        }
        if target == normalize_email(&identity) {
            return Err(RegistryError::invariant(match change {
                Change::Add => "an uploader cannot add themselves",
                Change::Remove => "an uploader cannot remove themselves",
            }));
        }

        let _guard = self.locks.lock(package).await;

        for _ in 0..SWAP_ATTEMPTS {
            let current = self.load(package).await?;

            let Some(current) = current.filter(|set| set.value.contains(&identity)) else {
                return Err(RegistryError::Unauthorized {
                    identity,
                    package: package.to_string(),
                });
            };

            let next = match change {
                Change::Add if current.value.contains(&target) => {
                    debug!(package, uploader = %target, "already an uploader");
                    return Ok(());
                }
                Change::Add => current.value.with(&target),
                Change::Remove if current.value.len() <= 1 => {
                    return Err(RegistryError::invariant(
                        "cannot remove the last uploader of a package",
                    ));
                }
                Change::Remove if !current.value.contains(&target) => {
                    return Err(RegistryError::NotFound {
                        package: package.to_string(),
                        version: None,
                    });
                }
                Change::Remove => current.value.without(&target),
            };

            let outcome = bounded(
                Collaborator::MetadataStore,
                self.timeout,
                self.metadata.swap_uploaders(package, current.revision, next),
            )
            .await?;

            match outcome {
                SwapOutcome::Swapped { revision } => {
                    info!(
                        package,
                        uploader = %target,
                        by = %identity,
                        ?change,
                        revision,
                        "uploaders updated"
                    );
                    return Ok(());
                }
                SwapOutcome::Stale => {
                    warn!(package, "uploader set changed concurrently, retrying");
                }
                SwapOutcome::UnknownPackage => {
                    return Err(RegistryError::Unauthorized {
                        identity,
                        package: package.to_string(),
                    });
                }
            }
        }

        Err(RegistryError::infra(
            Collaborator::MetadataStore,
            format!("uploaders of {} kept changing concurrently", package),
        ))
    }
}

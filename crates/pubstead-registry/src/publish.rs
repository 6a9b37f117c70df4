//! Publish orchestration.
//!
//! A publish runs as one logical operation:
//!
//! 1. Resolve the caller's identity
//! 2. Decode the archive and parse its manifest
//! 3. Reject an existing `(package, version)`
//! 4. Authorize against the package's uploaders (or bootstrap a new package)
//! 5. Write the archive blob
//! 6. Insert the metadata record (commit point)
//!
//! Steps 3-6 run under a per-package lock, and the final insert is itself an
//! atomic insert-if-absent, so concurrent publishes of one version cannot both
//! succeed. A blob written before a failed insert is left for garbage
//! collection; metadata alone decides whether a version exists.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::archive::{extract_archive, ExtractLimits};
use crate::auth::IdentityResolver;
use crate::deadline::bounded;
use crate::error::{Collaborator, RegistryError, RegistryResult};
use crate::locks::KeyedLocks;
use crate::manifest::parse_manifest;
use crate::store::{BlobStore, InsertOutcome, MetadataStore};
use crate::types::PackageVersion;

/// How many times a commit re-authorizes after losing a first-publish race.
const COMMIT_ATTEMPTS: usize = 3;

/// How the publisher is allowed to write the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    /// Existing uploader.
    Member,
    /// First publish of a new package; the publisher becomes its uploader.
    Bootstrap,
}

/// Executes publishes against the injected stores.
#[derive(Clone)]
pub struct Publisher {
    identity: IdentityResolver,
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    locks: KeyedLocks,
    limits: ExtractLimits,
    timeout: Duration,
}

impl Publisher {
    pub fn new(
        identity: IdentityResolver,
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        locks: KeyedLocks,
        limits: ExtractLimits,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            metadata,
            blobs,
            locks,
            limits,
            timeout,
        }
    }

    /// Publish an uploaded `.tar.gz` on behalf of `credential`.
    pub async fn publish(
        &self,
        archive: Bytes,
        credential: Option<&str>,
    ) -> RegistryResult<PackageVersion> {
        let identity = self.identity.require(credential).await?;

        let record = {
            let bundle = extract_archive(&archive, self.limits)?;
            let manifest = parse_manifest(bundle.manifest())?;
            PackageVersion {
                package: manifest.name,
                version: manifest.version,
                manifest_text: manifest.raw_text,
                archive_sha256: Some(bundle.digest().to_string()),
                published_at: Some(Utc::now()),
            }
        };
        let package = record.package.as_str();
        let version = record.version.as_str();

        debug!(package, version, identity = %identity, "publishing");

        let _guard = self.locks.lock(package).await;

        if bounded(
            Collaborator::MetadataStore,
            self.timeout,
            self.metadata.find_version(package, version),
        )
        .await?
        .is_some()
        {
            return Err(RegistryError::Conflict {
                package: package.to_string(),
                version: version.to_string(),
            });
        }

        let grant = self.authorize(&identity, package).await?;

        bounded(
            Collaborator::BlobStore,
            self.timeout,
            self.blobs.put_archive(package, version, archive),
        )
        .await?;

        if let Err(e) = self.commit(&record, &identity, grant).await {
            warn!(package, version, error = %e, "publish failed after archive write; blob orphaned");
            return Err(e);
        }

        info!(
            package,
            version,
            identity = %identity,
            bootstrap = grant == Grant::Bootstrap,
            "published"
        );
        Ok(record)
    }

    async fn authorize(&self, identity: &str, package: &str) -> RegistryResult<Grant> {
        let uploaders = bounded(
            Collaborator::MetadataStore,
            self.timeout,
            self.metadata.uploaders(package),
        )
        .await?;

        match uploaders {
            None => Ok(Grant::Bootstrap),
            Some(set) if set.value.contains(identity) => Ok(Grant::Member),
            Some(_) => Err(RegistryError::Unauthorized {
                identity: identity.to_string(),
                package: package.to_string(),
            }),
        }
    }

    async fn commit(
        &self,
        record: &PackageVersion,
        identity: &str,
        grant: Grant,
    ) -> RegistryResult<()> {
        let mut grant = grant;

        for _ in 0..COMMIT_ATTEMPTS {
            let bootstrap_uploader = (grant == Grant::Bootstrap).then_some(identity);
            let outcome = bounded(
                Collaborator::MetadataStore,
                self.timeout,
                self.metadata.insert_version(record, bootstrap_uploader),
            )
            .await?;

            match outcome {
                InsertOutcome::Inserted => return Ok(()),
                InsertOutcome::VersionExists => {
                    return Err(RegistryError::Conflict {
                        package: record.package.clone(),
                        version: record.version.clone(),
                    })
                }
                InsertOutcome::PackageExists | InsertOutcome::UnknownPackage => {
                    warn!(
                        package = %record.package,
                        ?outcome,
                        "package ownership changed during publish, re-authorizing"
                    );
                    grant = self.authorize(identity, &record.package).await?;
                }
            }
        }

        Err(RegistryError::infra(
            Collaborator::MetadataStore,
            format!(
                "ownership of {} kept changing during publish",
                record.package
            ),
        ))
    }
}

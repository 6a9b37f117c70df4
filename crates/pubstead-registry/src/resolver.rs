//! Version and download resolution.
//!
//! Local metadata always wins. The upstream mirror is consulted only when
//! nothing is recorded locally, and local and upstream results are never
//! merged.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::deadline::bounded;
use crate::error::{Collaborator, RegistryError, RegistryResult};
use crate::store::{BlobStore, MetadataStore};
use crate::types::PackageVersion;
use crate::upstream::UpstreamProxy;

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveSource {
    /// Local metadata / blob store.
    Local,
    /// Upstream mirror.
    Upstream,
}

impl std::fmt::Display for ResolveSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

/// Finite list of versions from exactly one source.
///
/// Re-run [`VersionResolver::list_versions`] to observe newer state.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionListing {
    pub package: String,
    pub source: ResolveSource,
    pub versions: Vec<PackageVersion>,
}

impl VersionListing {
    pub fn iter(&self) -> std::slice::Iter<'_, PackageVersion> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl IntoIterator for VersionListing {
    type Item = PackageVersion;
    type IntoIter = std::vec::IntoIter<PackageVersion>;

    fn into_iter(self) -> Self::IntoIter {
        self.versions.into_iter()
    }
}

/// A single version together with where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVersion {
    pub record: PackageVersion,
    pub source: ResolveSource,
}

/// Redirect target for an archive download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLocation {
    pub uri: String,
    pub source: ResolveSource,
}

/// Resolves versions and download locations, local first.
#[derive(Clone)]
pub struct VersionResolver {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    upstream: Arc<dyn UpstreamProxy>,
    timeout: Duration,
}

impl VersionResolver {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        upstream: Arc<dyn UpstreamProxy>,
        timeout: Duration,
    ) -> Self {
        Self {
            metadata,
            blobs,
            upstream,
            timeout,
        }
    }

    /// All versions of `package`: local ones if any exist, otherwise upstream's.
    pub async fn list_versions(&self, package: &str) -> RegistryResult<VersionListing> {
        let local = bounded(
            Collaborator::MetadataStore,
            self.timeout,
            self.metadata.list_versions(package),
        )
        .await?;

        if !local.is_empty() {
            debug!(package, count = local.len(), "listing local versions");
            return Ok(VersionListing {
                package: package.to_string(),
                source: ResolveSource::Local,
                versions: local,
            });
        }

        let proxied = bounded(
            Collaborator::Upstream,
            self.timeout,
            self.upstream.list_versions(package),
        )
        .await?;

        debug!(package, count = proxied.len(), "listing upstream versions");
        Ok(VersionListing {
            package: package.to_string(),
            source: ResolveSource::Upstream,
            versions: proxied,
        })
    }

    /// One version: local record if present, otherwise upstream's (may be absent).
    pub async fn lookup_version(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<ResolvedVersion>> {
        if let Some(local) = bounded(
            Collaborator::MetadataStore,
            self.timeout,
            self.metadata.find_version(package, version),
        )
        .await?
        {
            return Ok(Some(ResolvedVersion {
                record: local,
                source: ResolveSource::Local,
            }));
        }

        debug!(package, version, "no local record, asking upstream");
        let proxied = bounded(
            Collaborator::Upstream,
            self.timeout,
            self.upstream.lookup_version(package, version),
        )
        .await?;

        Ok(proxied.map(|record| ResolvedVersion {
            record,
            source: ResolveSource::Upstream,
        }))
    }

    /// Redirect target for downloading `package@version`.
    ///
    /// Bytes are never streamed through the registry; callers redirect.
    pub async fn resolve_download_location(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<DownloadLocation> {
        let local = bounded(
            Collaborator::MetadataStore,
            self.timeout,
            self.metadata.find_version(package, version),
        )
        .await?;

        if local.is_some() {
            let uri = bounded(
                Collaborator::BlobStore,
                self.timeout,
                self.blobs.location(package, version),
            )
            .await?;
            return Ok(DownloadLocation {
                uri,
                source: ResolveSource::Local,
            });
        }

        let proxied = bounded(
            Collaborator::Upstream,
            self.timeout,
            self.upstream.download_location(package, version),
        )
        .await?;

        match proxied {
            Some(uri) => Ok(DownloadLocation {
                uri,
                source: ResolveSource::Upstream,
            }),
            None => Err(RegistryError::NotFound {
                package: package.to_string(),
                version: Some(version.to_string()),
            }),
        }
    }
}

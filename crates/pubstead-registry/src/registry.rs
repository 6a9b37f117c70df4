//! Registry facade.
//!
//! Wires the collaborators into the publisher, the resolver, and the uploader
//! manager, and exposes the registry's operations in one place.

use std::sync::Arc;

use bytes::Bytes;

use crate::archive::ExtractLimits;
use crate::auth::{IdentityResolver, IdentityVerifier, TokenInfoVerifier};
use crate::error::{RegistryError, RegistryResult};
use crate::locks::KeyedLocks;
use crate::publish::Publisher;
use crate::resolver::{DownloadLocation, ResolvedVersion, VersionListing, VersionResolver};
use crate::store::{BlobStore, MetadataStore};
use crate::types::{PackageVersion, RegistryConfig};
use crate::upstream::{HttpUpstream, UpstreamProxy};
use crate::uploaders::UploaderManager;

/// External systems the registry depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub verifier: Arc<dyn IdentityVerifier>,
    pub metadata: Arc<dyn MetadataStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub upstream: Arc<dyn UpstreamProxy>,
}

impl Collaborators {
    /// HTTP verifier and upstream from `config`, with the given stores.
    pub fn http(
        config: &RegistryConfig,
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> RegistryResult<Self> {
        Ok(Self {
            verifier: Arc::new(TokenInfoVerifier::new(config)?),
            metadata,
            blobs,
            upstream: Arc::new(HttpUpstream::new(config)?),
        })
    }
}

/// Publish/resolve core of the package registry.
#[derive(Clone)]
pub struct Registry {
    publisher: Publisher,
    resolver: VersionResolver,
    uploaders: UploaderManager,
}

impl Registry {
    pub fn new(config: &RegistryConfig, collaborators: Collaborators) -> RegistryResult<Self> {
        config.validate()?;

        let timeout = config.timeout();
        let identity = IdentityResolver::new(collaborators.verifier, timeout);
        let locks = KeyedLocks::new();

        Ok(Self {
            publisher: Publisher::new(
                identity.clone(),
                collaborators.metadata.clone(),
                collaborators.blobs.clone(),
                locks.clone(),
                ExtractLimits::from_config(config),
                timeout,
            ),
            resolver: VersionResolver::new(
                collaborators.metadata.clone(),
                collaborators.blobs,
                collaborators.upstream,
                timeout,
            ),
            uploaders: UploaderManager::new(identity, collaborators.metadata, locks, timeout),
        })
    }

    /// Publish an uploaded archive.
    pub async fn publish(
        &self,
        archive: impl Into<Bytes>,
        credential: Option<&str>,
    ) -> RegistryResult<PackageVersion> {
        self.publisher.publish(archive.into(), credential).await
    }

    /// All versions of a package, local first, upstream otherwise.
    pub async fn list_versions(&self, package: &str) -> RegistryResult<VersionListing> {
        self.resolver.list_versions(package).await
    }

    /// One version, or `None` when neither local nor upstream has it.
    pub async fn lookup_version(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<PackageVersion>> {
        Ok(self
            .resolver
            .lookup_version(package, version)
            .await?
            .map(|resolved| resolved.record))
    }

    /// Like [`lookup_version`](Self::lookup_version), with the source and
    /// `NotFound` for absence.
    pub async fn get_version(&self, package: &str, version: &str) -> RegistryResult<ResolvedVersion> {
        self.resolver
            .lookup_version(package, version)
            .await?
            .ok_or_else(|| RegistryError::NotFound {
                package: package.to_string(),
                version: Some(version.to_string()),
            })
    }

    /// Redirect target for an archive download.
    pub async fn resolve_download_location(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<DownloadLocation> {
        self.resolver
            .resolve_download_location(package, version)
            .await
    }

    /// Current uploaders of a package.
    pub async fn uploaders(&self, package: &str) -> RegistryResult<Vec<String>> {
        self.uploaders.list(package).await
    }

    pub async fn add_uploader(
        &self,
        package: &str,
        new_email: &str,
        credential: Option<&str>,
    ) -> RegistryResult<()> {
        self.uploaders.add(package, new_email, credential).await
    }

    pub async fn remove_uploader(
        &self,
        package: &str,
        target_email: &str,
        credential: Option<&str>,
    ) -> RegistryResult<()> {
        self.uploaders
            .remove(package, target_email, credential)
            .await
    }
}

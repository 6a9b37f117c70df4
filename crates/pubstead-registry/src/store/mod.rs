//! Contracts for the metadata store and the blob store.
//!
//! The core never touches storage engines directly; it talks to these traits,
//! which are injected as `Arc<dyn ...>`. Implementations report I/O problems as
//! `RegistryError::Infrastructure` and report domain outcomes as values.
//!
//! # Key Schema
//!
//! ```text
//! metadata: (package, version)              -> PackageVersion
//!           package                         -> UploaderSet (+ revision)
//! blobs:    packages/{package}/versions/{version}.tar.gz
//! ```

pub mod memory;
pub mod object_store_backend;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::RegistryResult;
use crate::types::{PackageVersion, Revisioned, UploaderSet};

pub use memory::MemoryMetadataStore;
pub use object_store_backend::ObjectStoreBlobStore;

/// Result of an atomic version insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was written (and, for a bootstrap insert, the uploader set).
    Inserted,
    /// `(package, version)` already exists; nothing was written.
    VersionExists,
    /// A bootstrap insert found the package already created; nothing was written.
    PackageExists,
    /// A non-bootstrap insert found no package to attach to; nothing was written.
    UnknownPackage,
}

/// Result of an uploader set compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// Stored with the new revision.
    Swapped { revision: u64 },
    /// Someone else changed the set since it was read.
    Stale,
    /// The package has no uploader set.
    UnknownPackage,
}

/// Package metadata: version records and uploader sets.
///
/// # Atomicity
///
/// `insert_version` and `swap_uploaders` are the only writes and must each be
/// atomic, so that check-then-write sequences in the core cannot lose updates
/// or publish a version twice even across processes.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Look up one version.
    async fn find_version(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<PackageVersion>>;

    /// All versions of a package, in publish order. Empty if unknown.
    async fn list_versions(&self, package: &str) -> RegistryResult<Vec<PackageVersion>>;

    /// Current uploader set, or `None` if the package has never been published.
    async fn uploaders(&self, package: &str) -> RegistryResult<Option<Revisioned<UploaderSet>>>;

    /// Insert a version if `(package, version)` is absent.
    ///
    /// With `bootstrap_uploader`, the package must not exist yet; its uploader
    /// set is created as `{bootstrap_uploader}` in the same write.
    async fn insert_version(
        &self,
        record: &PackageVersion,
        bootstrap_uploader: Option<&str>,
    ) -> RegistryResult<InsertOutcome>;

    /// Replace the uploader set if it is still at `expected_revision`.
    async fn swap_uploaders(
        &self,
        package: &str,
        expected_revision: u64,
        uploaders: UploaderSet,
    ) -> RegistryResult<SwapOutcome>;
}

/// Archive storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store archive bytes for `(package, version)`. Overwrites an orphan
    /// left by an earlier failed publish.
    async fn put_archive(&self, package: &str, version: &str, bytes: Bytes)
        -> RegistryResult<()>;

    /// URI a client can be redirected to for downloading the archive.
    async fn location(&self, package: &str, version: &str) -> RegistryResult<String>;
}

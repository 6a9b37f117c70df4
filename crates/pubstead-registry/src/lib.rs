//! Publish/resolve core of a private package registry.
//!
//! This crate accepts uploaded package archives, authenticates and authorizes
//! the publisher, and persists each `(package, version)` exactly once. Reads
//! fall back to an upstream mirror when nothing is recorded locally:
//!
//! - Identity resolution via an injected token verifier
//! - `.tar.gz` extraction and manifest (`pubspec.yaml`) parsing
//! - Atomic publish across metadata and blob stores
//! - Version listing, lookup and download redirects (local → upstream)
//! - Uploader set management with invariant checks
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use pubstead_registry::{
//!     Collaborators, MemoryMetadataStore, ObjectStoreBlobStore, Registry, RegistryConfig,
//! };
//!
//! # async fn example(archive: Vec<u8>) -> pubstead_registry::RegistryResult<()> {
//! let config = RegistryConfig::from_env();
//! let collaborators = Collaborators::http(
//!     &config,
//!     Arc::new(MemoryMetadataStore::new()),
//!     Arc::new(ObjectStoreBlobStore::memory(&config.blob_base_url)),
//! )?;
//! let registry = Registry::new(&config, collaborators)?;
//!
//! let published = registry.publish(archive, Some("Bearer <token>")).await?;
//! let location = registry
//!     .resolve_download_location(&published.package, &published.version)
//!     .await?;
//! println!("download {} from {}", published.id(), location.uri);
//! # Ok(())
//! # }
//! ```
//!
//! # Errors
//!
//! Every operation returns [`RegistryError`]. Domain errors (bad credential,
//! bad upload, conflicts, rule violations) are final; only
//! `Infrastructure`/`Timeout` are [`retryable`](RegistryError::is_retryable).
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `PUBSTEAD_UPSTREAM_URL` | Upstream mirror (default: `https://pub.dartlang.org`) |
//! | `PUBSTEAD_TOKENINFO_URL` | Token verification endpoint |
//! | `PUBSTEAD_BLOB_BASE_URL` | Public base URL for local archives |
//! | `PUBSTEAD_TIMEOUT` | Collaborator timeout in seconds (default: 30) |
//! | `PUBSTEAD_MAX_RETRIES` | Upstream retries for transient failures (default: 3) |
//! | `PUBSTEAD_MAX_ARCHIVE_BYTES` | Decompressed upload limit (default: 100 MiB) |

pub mod archive;
pub mod auth;
mod deadline;
mod digest;
pub mod error;
pub mod locks;
pub mod manifest;
pub mod publish;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod types;
pub mod upstream;
pub mod uploaders;

// Re-export main types
pub use archive::{extract_archive, ArchiveBundle, ExtractLimits, MANIFEST_ENTRY};
pub use auth::{IdentityResolver, IdentityVerifier, TokenInfoVerifier};
pub use error::{Collaborator, RegistryError, RegistryResult};
pub use locks::KeyedLocks;
pub use manifest::{parse_manifest, Manifest};
pub use publish::Publisher;
pub use registry::{Collaborators, Registry};
pub use resolver::{
    DownloadLocation, ResolveSource, ResolvedVersion, VersionListing, VersionResolver,
};
pub use store::{
    BlobStore, InsertOutcome, MemoryMetadataStore, MetadataStore, ObjectStoreBlobStore,
    SwapOutcome,
};
pub use types::{PackageVersion, RegistryConfig, Revisioned, UploaderSet};
pub use upstream::{HttpUpstream, UpstreamProxy, REGISTRY_USER_AGENT};
pub use uploaders::UploaderManager;

//! Error types for the registry core.

use std::fmt;
use std::time::Duration;

/// External system a request depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    IdentityVerifier,
    MetadataStore,
    BlobStore,
    Upstream,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IdentityVerifier => "identity verifier",
            Self::MetadataStore => "metadata store",
            Self::BlobStore => "blob store",
            Self::Upstream => "upstream mirror",
        };
        f.write_str(name)
    }
}

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Credential missing or rejected by the identity verifier.
    #[error("unauthenticated: missing or invalid credential")]
    Unauthenticated,

    /// Verified identity is not an uploader of the package.
    #[error("unauthorized: {identity} is not an uploader of {package}")]
    Unauthorized { identity: String, package: String },

    /// Upload is not a readable gzip-compressed tar archive.
    #[error("malformed archive: {reason}")]
    MalformedArchive { reason: String },

    /// Archive has no manifest entry.
    #[error("archive has no {entry} entry")]
    ManifestMissing { entry: String },

    /// Manifest is not a structured document or lacks name/version.
    #[error("invalid manifest: {reason}")]
    ManifestInvalid { reason: String },

    /// Version already published.
    #[error("version already exists: {package}@{version}")]
    Conflict { package: String, version: String },

    /// Uploader set rule violated (self-add, self-remove, last uploader).
    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    /// Absent locally and upstream.
    #[error("not found: {package}{}", .version.as_deref().map(|v| format!("@{}", v)).unwrap_or_default())]
    NotFound {
        package: String,
        version: Option<String>,
    },

    /// Collaborator unreachable or failed.
    #[error("{collaborator} error: {message}")]
    Infrastructure {
        collaborator: Collaborator,
        message: String,
    },

    /// Collaborator did not answer within the configured bound.
    #[error("{collaborator} timed out after {after:?}")]
    Timeout {
        collaborator: Collaborator,
        after: Duration,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl RegistryError {
    pub(crate) fn infra(collaborator: Collaborator, message: impl Into<String>) -> Self {
        Self::Infrastructure {
            collaborator,
            message: message.into(),
        }
    }

    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            reason: reason.into(),
        }
    }

    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthenticated => 401,
            Self::Unauthorized { .. } => 403,

            // Upload shape
            Self::MalformedArchive { .. } => 400,
            Self::ManifestMissing { .. } => 400,
            Self::ManifestInvalid { .. } => 400,

            Self::Conflict { .. } => 409,
            Self::InvariantViolation { .. } => 422,
            Self::NotFound { .. } => 404,

            // Infrastructure
            Self::Infrastructure { .. } => 502,
            Self::Timeout { .. } => 504,
            Self::Config { .. } => 500,
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Unauthorized { .. } => "unauthorized",
            Self::MalformedArchive { .. } => "malformed_archive",
            Self::ManifestMissing { .. } => "manifest_missing",
            Self::ManifestInvalid { .. } => "manifest_invalid",
            Self::Conflict { .. } => "conflict",
            Self::InvariantViolation { .. } => "invariant_violation",
            Self::NotFound { .. } => "not_found",
            Self::Infrastructure { .. } => "infrastructure",
            Self::Timeout { .. } => "timeout",
            Self::Config { .. } => "config",
        }
    }

    /// Whether the caller may retry the whole request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Infrastructure { .. } | Self::Timeout { .. })
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

//! Records, uploader sets, and registry configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// A published (or proxied) package version.
///
/// Identified by `(package, version)`; never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    /// Package name (e.g., "foo").
    pub package: String,

    /// Version string as declared in the manifest (e.g., "1.0.0").
    pub version: String,

    /// Raw manifest text.
    pub manifest_text: String,

    /// Digest of the uploaded archive (sha256:...).
    #[serde(default)]
    pub archive_sha256: Option<String>,

    /// When the version was published locally.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl PackageVersion {
    pub fn new(
        package: impl Into<String>,
        version: impl Into<String>,
        manifest_text: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            manifest_text: manifest_text.into(),
            archive_sha256: None,
            published_at: None,
        }
    }

    /// `package@version`.
    pub fn id(&self) -> String {
        format!("{}@{}", self.package, self.version)
    }
}

/// Canonical form of an uploader email: trimmed, ASCII-lowercased.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Identities allowed to publish a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploaderSet(BTreeSet<String>);

impl UploaderSet {
    /// Set containing a single uploader.
    pub fn single(email: &str) -> Self {
        let mut set = BTreeSet::new();
        set.insert(normalize_email(email));
        Self(set)
    }

    pub fn contains(&self, email: &str) -> bool {
        self.0.contains(&normalize_email(email))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of the set with `email` added.
    pub fn with(&self, email: &str) -> Self {
        let mut set = self.0.clone();
        set.insert(normalize_email(email));
        Self(set)
    }

    /// Copy of the set with `email` removed.
    pub fn without(&self, email: &str) -> Self {
        let mut set = self.0.clone();
        set.remove(&normalize_email(email));
        Self(set)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for UploaderSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|e| normalize_email(e.as_ref()))
                .collect(),
        )
    }
}

/// A stored value with the revision it was read at (for compare-and-swap).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revisioned<T> {
    pub value: T,
    pub revision: u64,
}

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the upstream mirror.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Token verification endpoint.
    #[serde(default = "default_tokeninfo_url")]
    pub tokeninfo_url: String,

    /// Public base URL under which local archives are served.
    #[serde(default = "default_blob_base_url")]
    pub blob_base_url: String,

    /// Bound on every collaborator call, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient upstream failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Maximum decompressed archive size.
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,

    /// Maximum number of archive entries.
    #[serde(default = "default_max_archive_entries")]
    pub max_archive_entries: usize,
}

fn default_upstream_url() -> String {
    "https://pub.dartlang.org".to_string()
}

fn default_tokeninfo_url() -> String {
    "https://oauth2.googleapis.com/tokeninfo".to_string()
}

fn default_blob_base_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_archive_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_max_archive_entries() -> usize {
    10_000
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            upstream_url: default_upstream_url(),
            tokeninfo_url: default_tokeninfo_url(),
            blob_base_url: default_blob_base_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            max_archive_bytes: default_max_archive_bytes(),
            max_archive_entries: default_max_archive_entries(),
        }
    }
}

impl RegistryConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PUBSTEAD_UPSTREAM_URL` | Upstream mirror base URL |
    /// | `PUBSTEAD_TOKENINFO_URL` | Token verification endpoint |
    /// | `PUBSTEAD_BLOB_BASE_URL` | Public base URL for local archives |
    /// | `PUBSTEAD_TIMEOUT` | Collaborator timeout in seconds |
    /// | `PUBSTEAD_MAX_RETRIES` | Upstream retries |
    /// | `PUBSTEAD_MAX_ARCHIVE_BYTES` | Decompressed archive limit |
    pub fn from_env() -> Self {
        Self {
            upstream_url: std::env::var("PUBSTEAD_UPSTREAM_URL")
                .unwrap_or_else(|_| default_upstream_url()),
            tokeninfo_url: std::env::var("PUBSTEAD_TOKENINFO_URL")
                .unwrap_or_else(|_| default_tokeninfo_url()),
            blob_base_url: std::env::var("PUBSTEAD_BLOB_BASE_URL")
                .unwrap_or_else(|_| default_blob_base_url()),
            timeout_secs: std::env::var("PUBSTEAD_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            max_retries: std::env::var("PUBSTEAD_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_retries),
            max_archive_bytes: std::env::var("PUBSTEAD_MAX_ARCHIVE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_archive_bytes),
            max_archive_entries: default_max_archive_entries(),
        }
    }

    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = url.into();
        self
    }

    pub fn with_tokeninfo_url(mut self, url: impl Into<String>) -> Self {
        self.tokeninfo_url = url.into();
        self
    }

    pub fn with_blob_base_url(mut self, url: impl Into<String>) -> Self {
        self.blob_base_url = url.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Collaborator call bound.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check URLs parse and the timeout is usable.
    pub fn validate(&self) -> RegistryResult<()> {
        for (field, value) in [
            ("upstream_url", &self.upstream_url),
            ("tokeninfo_url", &self.tokeninfo_url),
            ("blob_base_url", &self.blob_base_url),
        ] {
            url::Url::parse(value).map_err(|e| RegistryError::Config {
                message: format!("{} '{}' is not a valid URL: {}", field, value, e),
            })?;
        }

        if self.timeout_secs == 0 {
            return Err(RegistryError::Config {
                message: "timeout_secs must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

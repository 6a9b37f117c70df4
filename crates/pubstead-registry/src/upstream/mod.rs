//! Upstream mirror consulted when no local record exists.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{Collaborator, RegistryError, RegistryResult};
use crate::types::{PackageVersion, RegistryConfig};

mod http;

use http::{Fetched, HttpBackend};

pub const REGISTRY_USER_AGENT: &str = concat!("pubstead-registry/", env!("CARGO_PKG_VERSION"));

/// Read-only view of an upstream registry.
#[async_trait]
pub trait UpstreamProxy: Send + Sync {
    /// All versions the upstream knows for `package`. Empty if unknown.
    async fn list_versions(&self, package: &str) -> RegistryResult<Vec<PackageVersion>>;

    /// One version, or `None` if the upstream does not have it.
    async fn lookup_version(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<PackageVersion>>;

    /// Where the upstream serves the archive, or `None` if it does not have it.
    async fn download_location(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<String>>;
}

/// `GET /api/packages/{package}` body.
#[derive(Debug, Deserialize)]
struct PackageResponse {
    #[serde(default)]
    versions: Vec<VersionResponse>,
}

/// One entry of `versions`, also the body of
/// `GET /api/packages/{package}/versions/{version}`.
#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
    #[serde(default)]
    pubspec: serde_json::Value,
    #[serde(default)]
    archive_url: Option<String>,
    #[serde(default)]
    archive_sha256: Option<String>,
    #[serde(default)]
    published: Option<DateTime<Utc>>,
}

impl VersionResponse {
    fn into_record(self, package: &str) -> RegistryResult<PackageVersion> {
        let manifest_text = serde_yaml::to_string(&self.pubspec).map_err(|e| {
            RegistryError::infra(
                Collaborator::Upstream,
                format!("failed to render pubspec of {}@{}: {}", package, self.version, e),
            )
        })?;

        Ok(PackageVersion {
            package: package.to_string(),
            version: self.version,
            manifest_text,
            archive_sha256: self.archive_sha256.map(|hex| format!("sha256:{}", hex)),
            published_at: self.published,
        })
    }
}

/// Upstream mirror speaking the pub repository JSON API.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    http: HttpBackend,
    base: Url,
}

impl HttpUpstream {
    pub fn new(config: &RegistryConfig) -> RegistryResult<Self> {
        let base = Url::parse(config.upstream_url.trim_end_matches('/')).map_err(|e| {
            RegistryError::Config {
                message: format!("invalid upstream URL {}: {}", config.upstream_url, e),
            }
        })?;
        if base.cannot_be_a_base() {
            return Err(RegistryError::Config {
                message: format!("upstream URL {} cannot carry a path", config.upstream_url),
            });
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(REGISTRY_USER_AGENT));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| RegistryError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http: HttpBackend {
                client,
                max_retries: config.max_retries,
                budget: config.timeout(),
            },
            base,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// URL under the upstream base, one percent-encoded path segment per name.
    ///
    /// `None` when a name cannot be a single segment (empty, `.`, `..`, or
    /// containing control characters); no upstream package is named that way.
    fn endpoint(&self, segments: &[&str]) -> Option<Url> {
        let representable = |s: &&str| {
            !s.is_empty() && *s != "." && *s != ".." && !s.chars().any(char::is_control)
        };
        if !segments.iter().all(representable) {
            return None;
        }

        let mut url = self.base.clone();
        url.path_segments_mut().ok()?.pop_if_empty().extend(segments);
        Some(url)
    }

    fn package_url(&self, package: &str) -> Option<Url> {
        self.endpoint(&["api", "packages", package])
    }

    fn version_url(&self, package: &str, version: &str) -> Option<Url> {
        self.endpoint(&["api", "packages", package, "versions", version])
    }

    /// Conventional archive URL when the upstream does not name one.
    fn archive_url(&self, package: &str, version: &str) -> Option<Url> {
        let file = format!("{}.tar.gz", version);
        self.version_url(package, version)?;
        self.endpoint(&["packages", package, "versions", &file])
    }

    async fn fetch_version(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<VersionResponse>> {
        let Some(url) = self.version_url(package, version) else {
            debug!(package, version, "name cannot exist upstream");
            return Ok(None);
        };
        debug!(url = %url, "fetching upstream version");

        match self.http.get(&url).await? {
            Fetched::Missing => Ok(None),
            Fetched::Found(response) => {
                let body: VersionResponse = response.json().await.map_err(|e| {
                    RegistryError::infra(
                        Collaborator::Upstream,
                        format!("failed to parse version response: {}", e),
                    )
                })?;
                Ok(Some(body))
            }
        }
    }
}

#[async_trait]
impl UpstreamProxy for HttpUpstream {
    async fn list_versions(&self, package: &str) -> RegistryResult<Vec<PackageVersion>> {
        let Some(url) = self.package_url(package) else {
            debug!(package, "name cannot exist upstream");
            return Ok(Vec::new());
        };
        debug!(url = %url, "listing upstream versions");

        let body: PackageResponse = match self.http.get(&url).await? {
            Fetched::Missing => return Ok(Vec::new()),
            Fetched::Found(response) => response.json().await.map_err(|e| {
                RegistryError::infra(
                    Collaborator::Upstream,
                    format!("failed to parse package response: {}", e),
                )
            })?,
        };

        body.versions
            .into_iter()
            .map(|v| v.into_record(package))
            .collect()
    }

    async fn lookup_version(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<PackageVersion>> {
        self.fetch_version(package, version)
            .await?
            .map(|v| v.into_record(package))
            .transpose()
    }

    async fn download_location(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<String>> {
        Ok(self
            .fetch_version(package, version)
            .await?
            .and_then(|v| {
                v.archive_url
                    .or_else(|| self.archive_url(package, version).map(String::from))
            }))
    }
}

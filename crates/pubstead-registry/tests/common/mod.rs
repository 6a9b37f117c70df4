//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use pubstead_registry::{
    BlobStore, Collaborator, Collaborators, IdentityVerifier, InsertOutcome, MemoryMetadataStore,
    MetadataStore, ObjectStoreBlobStore, PackageVersion, Registry, RegistryConfig, RegistryError,
    RegistryResult, Revisioned, SwapOutcome, UploaderSet, UpstreamProxy,
};

pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@example.com";
pub const CAROL: &str = "carol@example.com";

/// Credential whose token verifies as `email`.
pub fn bearer(email: &str) -> String {
    format!("Bearer token-{}", email)
}

/// Build a gzipped tarball from `(path, contents)` pairs.
pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *contents)
            .expect("append tar entry");
    }
    let tar_bytes = builder.into_inner().expect("finish tar");

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).expect("gzip tar");
    encoder.finish().expect("finish gzip")
}

pub fn pubspec(name: &str, version: &str) -> String {
    format!("name: {}\nversion: {}\ndescription: test package\n", name, version)
}

/// Archive with a valid manifest and one library file.
pub fn package_archive(name: &str, version: &str) -> Vec<u8> {
    let manifest = pubspec(name, version);
    tar_gz(&[
        ("pubspec.yaml", manifest.as_bytes()),
        ("lib/main.dart", b"void main() {}\n"),
    ])
}

/// Verifies `token-{email}` tokens and counts calls.
#[derive(Debug, Default)]
pub struct FakeVerifier {
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
}

impl FakeVerifier {
    /// Verifier that answers only after `delay`.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> RegistryResult<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(token
            .strip_prefix("token-")
            .filter(|email| email.contains('@'))
            .map(str::to_string))
    }
}

/// Upstream mirror with canned versions.
#[derive(Debug, Default)]
pub struct FakeUpstream {
    pub packages: HashMap<String, Vec<PackageVersion>>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeUpstream {
    pub fn with_package(mut self, name: &str, versions: &[&str]) -> Self {
        let records = versions
            .iter()
            .map(|v| PackageVersion::new(name, *v, pubspec(name, v)))
            .collect();
        self.packages.insert(name.to_string(), records);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl UpstreamProxy for FakeUpstream {
    async fn list_versions(&self, package: &str) -> RegistryResult<Vec<PackageVersion>> {
        self.enter().await;
        Ok(self.packages.get(package).cloned().unwrap_or_default())
    }

    async fn lookup_version(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<PackageVersion>> {
        self.enter().await;
        Ok(self
            .packages
            .get(package)
            .and_then(|versions| versions.iter().find(|r| r.version == version))
            .cloned())
    }

    async fn download_location(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<String>> {
        Ok(self
            .lookup_version(package, version)
            .await?
            .map(|_| format!("https://upstream.example.com/{}/{}.tar.gz", package, version)))
    }
}

/// Blob store that records writes in memory.
#[derive(Debug, Default)]
pub struct RecordingBlobStore {
    pub puts: Mutex<Vec<(String, String)>>,
}

impl RecordingBlobStore {
    pub fn put_count(&self) -> usize {
        self.puts.lock().expect("lock").len()
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn put_archive(&self, package: &str, version: &str, _bytes: Bytes) -> RegistryResult<()> {
        self.puts
            .lock()
            .expect("lock")
            .push((package.to_string(), version.to_string()));
        Ok(())
    }

    async fn location(&self, package: &str, version: &str) -> RegistryResult<String> {
        Ok(format!("https://blobs.example.com/{}/{}.tar.gz", package, version))
    }
}

/// Blob store whose writes hang for `delay` before succeeding.
#[derive(Debug)]
pub struct SlowBlobStore {
    pub delay: Duration,
    pub started: AtomicUsize,
}

impl SlowBlobStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BlobStore for SlowBlobStore {
    async fn put_archive(&self, _package: &str, _version: &str, _bytes: Bytes) -> RegistryResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn location(&self, package: &str, version: &str) -> RegistryResult<String> {
        Ok(format!("https://blobs.example.com/{}/{}.tar.gz", package, version))
    }
}

/// Metadata store whose writes hang while `stalled` is set.
///
/// Reads always pass straight through to `inner`. A stalled write applies
/// nothing until the delay is over.
#[derive(Debug)]
pub struct StallingMetadataStore {
    pub inner: MemoryMetadataStore,
    pub stalled: AtomicBool,
    pub delay: Duration,
}

impl StallingMetadataStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryMetadataStore::new(),
            stalled: AtomicBool::new(false),
            delay,
        }
    }

    pub fn stall(&self, on: bool) {
        self.stalled.store(on, Ordering::SeqCst);
    }

    async fn hold(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl MetadataStore for StallingMetadataStore {
    async fn find_version(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<PackageVersion>> {
        self.inner.find_version(package, version).await
    }

    async fn list_versions(&self, package: &str) -> RegistryResult<Vec<PackageVersion>> {
        self.inner.list_versions(package).await
    }

    async fn uploaders(&self, package: &str) -> RegistryResult<Option<Revisioned<UploaderSet>>> {
        self.inner.uploaders(package).await
    }

    async fn insert_version(
        &self,
        record: &PackageVersion,
        bootstrap_uploader: Option<&str>,
    ) -> RegistryResult<InsertOutcome> {
        self.hold().await;
        self.inner.insert_version(record, bootstrap_uploader).await
    }

    async fn swap_uploaders(
        &self,
        package: &str,
        expected_revision: u64,
        uploaders: UploaderSet,
    ) -> RegistryResult<SwapOutcome> {
        self.hold().await;
        self.inner
            .swap_uploaders(package, expected_revision, uploaders)
            .await
    }
}

/// Metadata store whose inserts fail, wrapping a working one for reads.
#[derive(Debug, Default)]
pub struct FailingInsertStore {
    pub inner: MemoryMetadataStore,
}

#[async_trait]
impl MetadataStore for FailingInsertStore {
    async fn find_version(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<PackageVersion>> {
        self.inner.find_version(package, version).await
    }

    async fn list_versions(&self, package: &str) -> RegistryResult<Vec<PackageVersion>> {
        self.inner.list_versions(package).await
    }

    async fn uploaders(&self, package: &str) -> RegistryResult<Option<Revisioned<UploaderSet>>> {
        self.inner.uploaders(package).await
    }

    async fn insert_version(
        &self,
        _record: &PackageVersion,
        _bootstrap_uploader: Option<&str>,
    ) -> RegistryResult<InsertOutcome> {
        Err(RegistryError::Infrastructure {
            collaborator: Collaborator::MetadataStore,
            message: "connection reset".to_string(),
        })
    }

    async fn swap_uploaders(
        &self,
        package: &str,
        expected_revision: u64,
        uploaders: UploaderSet,
    ) -> RegistryResult<SwapOutcome> {
        self.inner
            .swap_uploaders(package, expected_revision, uploaders)
            .await
    }
}

/// Registry over in-memory stores and fakes.
pub struct Harness {
    pub registry: Registry,
    pub metadata: MemoryMetadataStore,
    pub blobs: Arc<ObjectStoreBlobStore>,
    pub verifier: Arc<FakeVerifier>,
    pub upstream: Arc<FakeUpstream>,
}

impl Harness {
    pub fn new(upstream: FakeUpstream) -> Self {
        Self::with_config(RegistryConfig::default(), upstream)
    }

    pub fn with_config(config: RegistryConfig, upstream: FakeUpstream) -> Self {
        let metadata = MemoryMetadataStore::new();
        let blobs = Arc::new(ObjectStoreBlobStore::memory("https://cdn.example.com"));
        let verifier = Arc::new(FakeVerifier::default());
        let upstream = Arc::new(upstream);

        let registry = Registry::new(
            &config,
            Collaborators {
                verifier: verifier.clone(),
                metadata: Arc::new(metadata.clone()),
                blobs: blobs.clone(),
                upstream: upstream.clone(),
            },
        )
        .expect("registry");

        Self {
            registry,
            metadata,
            blobs,
            verifier,
            upstream,
        }
    }

    /// Publish `name@version` as `email`, panicking on failure.
    pub async fn publish_as(&self, email: &str, name: &str, version: &str) -> PackageVersion {
        self.registry
            .publish(package_archive(name, version), Some(&bearer(email)))
            .await
            .expect("publish")
    }
}

//! In-memory metadata store.
//!
//! Every write happens under one write lock, which gives `insert_version` and
//! `swap_uploaders` the atomicity the [`MetadataStore`] contract requires.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{InsertOutcome, MetadataStore, SwapOutcome};
use crate::error::RegistryResult;
use crate::types::{PackageVersion, Revisioned, UploaderSet};

#[derive(Debug, Default)]
struct PackageEntry {
    /// Publish order.
    versions: Vec<PackageVersion>,
    uploaders: UploaderSet,
    revision: u64,
}

/// Metadata store held in process memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryMetadataStore {
    packages: Arc<RwLock<HashMap<String, PackageEntry>>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a package with an uploader set and no versions.
    pub async fn seed_uploaders(&self, package: &str, uploaders: UploaderSet) {
        let mut packages = self.packages.write().await;
        let entry = packages.entry(package.to_string()).or_default();
        entry.uploaders = uploaders;
        entry.revision += 1;
    }

    /// Number of stored versions across all packages.
    pub async fn version_count(&self) -> usize {
        self.packages
            .read()
            .await
            .values()
            .map(|entry| entry.versions.len())
            .sum()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn find_version(
        &self,
        package: &str,
        version: &str,
    ) -> RegistryResult<Option<PackageVersion>> {
        let packages = self.packages.read().await;
        Ok(packages
            .get(package)
            .and_then(|entry| entry.versions.iter().find(|v| v.version == version))
            .cloned())
    }

    async fn list_versions(&self, package: &str) -> RegistryResult<Vec<PackageVersion>> {
        let packages = self.packages.read().await;
        Ok(packages
            .get(package)
            .map(|entry| entry.versions.clone())
            .unwrap_or_default())
    }

    async fn uploaders(&self, package: &str) -> RegistryResult<Option<Revisioned<UploaderSet>>> {
        let packages = self.packages.read().await;
        Ok(packages.get(package).map(|entry| Revisioned {
            value: entry.uploaders.clone(),
            revision: entry.revision,
        }))
    }

    async fn insert_version(
        &self,
        record: &PackageVersion,
        bootstrap_uploader: Option<&str>,
    ) -> RegistryResult<InsertOutcome> {
        let mut packages = self.packages.write().await;

        let mut stored = record.clone();
        if stored.published_at.is_none() {
            stored.published_at = Some(Utc::now());
        }

        if let Some(entry) = packages.get_mut(&record.package) {
            if entry.versions.iter().any(|v| v.version == record.version) {
                return Ok(InsertOutcome::VersionExists);
            }
            if bootstrap_uploader.is_some() {
                return Ok(InsertOutcome::PackageExists);
            }
            entry.versions.push(stored);
            return Ok(InsertOutcome::Inserted);
        }

        let Some(uploader) = bootstrap_uploader else {
            return Ok(InsertOutcome::UnknownPackage);
        };

        packages.insert(
            record.package.clone(),
            PackageEntry {
                versions: vec![stored],
                uploaders: UploaderSet::single(uploader),
                revision: 1,
            },
        );
        Ok(InsertOutcome::Inserted)
    }

    async fn swap_uploaders(
        &self,
        package: &str,
        expected_revision: u64,
        uploaders: UploaderSet,
    ) -> RegistryResult<SwapOutcome> {
        let mut packages = self.packages.write().await;
        let Some(entry) = packages.get_mut(package) else {
            return Ok(SwapOutcome::UnknownPackage);
        };

        if entry.revision != expected_revision {
            return Ok(SwapOutcome::Stale);
        }

        entry.uploaders = uploaders;
        entry.revision += 1;
        Ok(SwapOutcome::Swapped {
            revision: entry.revision,
        })
    }
}

//! Archive extraction for uploaded packages.
//!
//! Uploads are gzip-compressed tar archives decoded entirely in memory. Only
//! one upload is held at a time per request, and [`ExtractLimits`] caps the
//! decompressed size so a small upload cannot expand without bound.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::digest::sha256_digest;
use crate::error::{RegistryError, RegistryResult};
use crate::types::RegistryConfig;

/// Manifest entry every package archive must carry at its root.
pub const MANIFEST_ENTRY: &str = "pubspec.yaml";

/// Bounds applied while decoding an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    /// Maximum sum of decompressed entry sizes.
    pub max_total_bytes: u64,
    /// Maximum number of file entries.
    pub max_entries: usize,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self::from_config(&RegistryConfig::default())
    }
}

impl ExtractLimits {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            max_total_bytes: config.max_archive_bytes,
            max_entries: config.max_archive_entries,
        }
    }
}

/// Files extracted from one upload. Never persisted.
#[derive(Debug, Clone)]
pub struct ArchiveBundle {
    entries: BTreeMap<String, Vec<u8>>,
    manifest: Vec<u8>,
    digest: String,
}

impl ArchiveBundle {
    /// Bytes of the manifest entry.
    pub fn manifest(&self) -> &[u8] {
        &self.manifest
    }

    /// Bytes of a named entry (leading `./` already stripped).
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digest of the compressed upload (sha256:...).
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

fn malformed(reason: impl std::fmt::Display) -> RegistryError {
    RegistryError::MalformedArchive {
        reason: reason.to_string(),
    }
}

fn normalize_entry_name(raw: &str) -> &str {
    let mut name = raw;
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    name
}

/// Decode a `.tar.gz` upload and locate its manifest.
///
/// # Errors
///
/// - `MalformedArchive` if the bytes are not gzip/tar, or a limit is exceeded
/// - `ManifestMissing` if there is no top-level [`MANIFEST_ENTRY`]
pub fn extract_archive(bytes: &[u8], limits: ExtractLimits) -> RegistryResult<ArchiveBundle> {
    if bytes.is_empty() {
        return Err(malformed("empty upload"));
    }

    let decoder = GzDecoder::new(Cursor::new(bytes));
    let mut archive = tar::Archive::new(decoder);

    let mut entries = BTreeMap::new();
    let mut files: usize = 0;
    let mut total: u64 = 0;

    for entry in archive.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = {
            let path = entry.path().map_err(malformed)?;
            normalize_entry_name(&path.to_string_lossy()).to_string()
        };

        // Repeated names still count.
        files += 1;
        if files > limits.max_entries {
            return Err(malformed(format!(
                "more than {} entries",
                limits.max_entries
            )));
        }

        let remaining = limits.max_total_bytes.saturating_sub(total);
        let mut content = Vec::new();
        (&mut entry)
            .take(remaining.saturating_add(1))
            .read_to_end(&mut content)
            .map_err(malformed)?;

        total = total.saturating_add(content.len() as u64);
        if total > limits.max_total_bytes {
            return Err(malformed(format!(
                "decompressed size exceeds {} bytes",
                limits.max_total_bytes
            )));
        }

        entries.insert(name, content);
    }

    let manifest = entries
        .get(MANIFEST_ENTRY)
        .cloned()
        .ok_or_else(|| RegistryError::ManifestMissing {
            entry: MANIFEST_ENTRY.to_string(),
        })?;

    debug!(entries = entries.len(), bytes = total, "extracted archive");

    Ok(ArchiveBundle {
        entries,
        manifest,
        digest: sha256_digest(bytes),
    })
}

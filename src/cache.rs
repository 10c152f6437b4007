//! On-disk topology cache: a versioned, gzip-compressed JSON envelope.
//!
//! Saves go through a temporary file in the same directory followed by a
//! rename, so a crash mid-write leaves either the old cache or the new one.

use crate::catalog::locale::Locale;
use crate::catalog::models::Group;
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bump whenever the serialized graph layout changes; older caches are discarded.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Persisted topology: format version plus the group/category tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEnvelope {
    pub format_version: u32,
    pub groups: Vec<Group>,
}

impl CacheEnvelope {
    /// Wraps groups at the current format version.
    pub fn new(groups: Vec<Group>) -> Self {
        Self { format_version: CACHE_FORMAT_VERSION, groups }
    }

    /// Serializes to the exact bytes written to disk.
    ///
    /// The gzip header carries no timestamp, so equal envelopes encode to equal bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)
            .map_err(|e| Error::CacheUnavailable(format!("failed to serialize cache: {}", e)))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    /// Decodes bytes written by [`CacheEnvelope::to_bytes`], rejecting other versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .map_err(|e| Error::CacheUnavailable(format!("corrupt cache: {}", e)))?;

        // Check the version before the full decode so layout changes report as such.
        let probe: VersionProbe = serde_json::from_slice(&json)
            .map_err(|e| Error::CacheUnavailable(format!("unreadable cache: {}", e)))?;
        if probe.format_version != CACHE_FORMAT_VERSION {
            return Err(Error::CacheUnavailable(format!(
                "cache format version {} does not match {}",
                probe.format_version, CACHE_FORMAT_VERSION
            )));
        }

        serde_json::from_slice(&json)
            .map_err(|e| Error::CacheUnavailable(format!("unreadable cache: {}", e)))
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

/// A cache file location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The cache file for `locale` inside `dir`.
    pub fn for_locale(dir: impl AsRef<Path>, locale: &Locale) -> Self {
        Self::new(dir.as_ref().join(locale.cache_file_name()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the envelope; any failure is reported as [`Error::CacheUnavailable`].
    pub fn load(&self) -> Result<CacheEnvelope> {
        debug!("Loading cache from {}", self.path.display());
        let bytes = fs::read(&self.path).map_err(|e| {
            Error::CacheUnavailable(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        CacheEnvelope::from_bytes(&bytes)
    }

    /// Atomically replaces the cache file with `envelope`.
    pub fn save(&self, envelope: &CacheEnvelope) -> Result<()> {
        let bytes = envelope.to_bytes()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.tmp_path();
        let written = (|| -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        info!(
            "Saved {} groups to cache {} ({} bytes)",
            envelope.groups.len(),
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }

    /// Removes the cache file. Returns false if there was nothing to remove.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".tmp.{}", std::process::id()));
        self.path.with_file_name(name)
    }
}

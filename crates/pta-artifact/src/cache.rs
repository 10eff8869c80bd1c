//! Local cache of materialized remote artifacts.
//!
//! Layout:
//! ```text
//! <cache_root>/
//!   <sha256(locator)>/       materialized artifact directory
//!   <sha256(locator)>.json   {"url": "<locator>"}
//! ```
//!
//! Entries are published atomically, so an entry directory is either complete
//! or absent. They are reused until removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use pta_io::ContentHash;

use crate::config::Config;
use crate::error::{ArtifactError, Result};
use crate::metadata::{read_source, source_sidecar, SourceInfo};

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

/// A cached artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Hex SHA-256 of the locator.
    pub key: String,
    pub path: PathBuf,
    /// Origin recorded in the sidecar, if readable.
    pub source: Option<SourceInfo>,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactCache { root: root.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        ArtifactCache::new(config.cache_dir.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache key of a locator: the hex SHA-256 of its exact text.
    pub fn key(locator: &str) -> String {
        ContentHash::compute(locator.as_bytes()).0
    }

    /// Where `locator` is (or would be) materialized.
    pub fn entry_path(&self, locator: &str) -> PathBuf {
        self.root.join(Self::key(locator))
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.entry_path(locator).exists()
    }

    pub fn get(&self, locator: &str) -> Option<CacheEntry> {
        let path = self.entry_path(locator);
        if !path.exists() {
            return None;
        }
        Some(CacheEntry {
            key: Self::key(locator),
            source: read_source(&path),
            path,
        })
    }

    /// Materialize `locator` by running `fill` on a temporary directory.
    ///
    /// The sidecar is written before the directory is published. If `fill`
    /// fails nothing is published and any existing entry is left untouched.
    pub fn populate<E, F>(&self, locator: &str, source: &SourceInfo, fill: F) -> std::result::Result<PathBuf, E>
    where
        E: From<io::Error>,
        F: FnOnce(&Path) -> std::result::Result<(), E>,
    {
        let dest = self.entry_path(locator);
        let staging = pta_io::finalized_directory(&dest)?;
        fill(staging.path())?;

        let mut sidecar = pta_io::finalized_open(source_sidecar(&dest))?;
        serde_json::to_writer(&mut sidecar, source).map_err(io::Error::from)?;

        // The entry goes first so a sidecar never outlives a failed publish.
        let published = staging.finalize()?;
        if let Err(e) = sidecar.finalize() {
            let _ = fs::remove_dir_all(&published);
            return Err(e.into());
        }
        tracing::debug!(locator, path = %published.display(), "cache entry published");
        Ok(published)
    }

    /// All entries, sorted by key.
    pub fn list(&self) -> Result<Vec<CacheEntry>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| self.error(&self.root, "listing entries", e))? {
            let entry = entry.map_err(|e| self.error(&self.root, "reading entry", e))?;
            let name = entry.file_name();
            let Some(key) = name.to_str().filter(|n| is_cache_key(n)) else {
                continue;
            };
            let path = entry.path();
            entries.push(CacheEntry {
                key: key.to_string(),
                source: read_source(&path),
                path,
            });
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Remove the entry for `locator`. Returns whether one existed.
    pub fn remove(&self, locator: &str) -> Result<bool> {
        self.remove_key(&Self::key(locator))
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = self.list()?;
        for entry in &entries {
            self.remove_key(&entry.key)?;
        }
        Ok(entries.len())
    }

    fn remove_key(&self, key: &str) -> Result<bool> {
        let path = self.root.join(key);
        let existed = if path.is_dir() {
            fs::remove_dir_all(&path).map_err(|e| self.error(&path, "removing entry", e))?;
            true
        } else if path.exists() {
            fs::remove_file(&path).map_err(|e| self.error(&path, "removing entry", e))?;
            true
        } else {
            false
        };

        let sidecar = source_sidecar(&path);
        if sidecar.is_file() {
            fs::remove_file(&sidecar).map_err(|e| self.error(&sidecar, "removing sidecar", e))?;
        }
        if existed {
            tracing::debug!(key, "cache entry removed");
        }
        Ok(existed)
    }

    fn error(&self, path: &Path, action: &str, e: io::Error) -> ArtifactError {
        ArtifactError::Cache {
            path: path.to_path_buf(),
            detail: format!("{action}: {e}"),
        }
    }
}

fn is_cache_key(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> SourceInfo {
        SourceInfo::Url(s.to_string())
    }

    #[test]
    fn key_is_sha256_of_locator() {
        assert_eq!(
            ArtifactCache::key("hf:org/repo"),
            ContentHash::compute(b"hf:org/repo").0
        );
        assert_ne!(ArtifactCache::key("hf:org/repo"), ArtifactCache::key("hf:org/repo@v2"));
        assert_eq!(ArtifactCache::key("x").len(), 64);
    }

    #[test]
    fn populate_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path().join("artifacts"));
        assert!(!cache.contains("hf:org/repo"));
        assert!(cache.get("hf:org/repo").is_none());

        let path = cache
            .populate("hf:org/repo", &url("hf:org/repo"), |tmp| -> io::Result<()> {
                fs::write(tmp.join("data.bin"), b"postings")
            })
            .unwrap();

        assert_eq!(path, cache.entry_path("hf:org/repo"));
        assert_eq!(fs::read(path.join("data.bin")).unwrap(), b"postings");
        let entry = cache.get("hf:org/repo").unwrap();
        assert_eq!(entry.source, Some(url("hf:org/repo")));
        assert_eq!(
            fs::read_to_string(source_sidecar(&entry.path)).unwrap(),
            r#"{"url":"hf:org/repo"}"#
        );
    }

    #[test]
    fn failed_populate_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());

        let result = cache.populate("https://example.org/a", &url("https://example.org/a"), |tmp| {
            fs::write(tmp.join("partial"), b"half")?;
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "dropped"))
        });

        assert!(result.is_err());
        assert!(!cache.contains("https://example.org/a"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unpublishable_sidecar_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        let locator = "https://example.org/a";
        // A non-empty directory where the sidecar belongs cannot be replaced.
        let blocker = source_sidecar(&cache.entry_path(locator));
        fs::create_dir_all(blocker.join("occupied")).unwrap();

        let result = cache.populate(locator, &url(locator), |tmp| -> io::Result<()> {
            fs::write(tmp.join("data.bin"), b"postings")
        });

        assert!(result.is_err());
        assert!(!cache.contains(locator));
        assert!(!cache.entry_path(locator).exists());
    }

    #[test]
    fn list_remove_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path());
        for locator in ["hf:a/one", "hf:a/two"] {
            cache
                .populate(locator, &url(locator), |_| -> io::Result<()> { Ok(()) })
                .unwrap();
        }
        // Unrelated files in the root are not entries.
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let entries = cache.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.windows(2).all(|w| w[0].key < w[1].key));

        assert!(cache.remove("hf:a/one").unwrap());
        assert!(!cache.remove("hf:a/one").unwrap());
        assert!(!source_sidecar(&cache.entry_path("hf:a/one")).exists());

        assert_eq!(cache.clear().unwrap(), 1);
        assert!(cache.list().unwrap().is_empty());
    }

    #[test]
    fn empty_cache_operations() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path().join("missing"));
        assert!(cache.list().unwrap().is_empty());
        assert_eq!(cache.clear().unwrap(), 0);
        assert!(!cache.remove("hf:x/y").unwrap());
    }
}

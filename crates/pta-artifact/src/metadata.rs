//! The `pt_meta.json` descriptor stored in every artifact directory, and the
//! `<path>.json` sidecar recording where a cached artifact came from.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ArtifactError, Result};
use crate::registry::ArtifactKind;

/// File name of the descriptor inside an artifact directory.
pub const METADATA_FILE: &str = "pt_meta.json";

/// Artifact descriptor. Unknown keys are kept in `extra` and written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Name of the package that provides an implementation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_hint: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ArtifactMetadata {
    pub fn new(artifact_type: impl Into<String>, format: impl Into<String>) -> Self {
        ArtifactMetadata {
            artifact_type: Some(artifact_type.into()),
            format: Some(format.into()),
            ..Default::default()
        }
    }

    pub fn with_package_hint(mut self, hint: impl Into<String>) -> Self {
        self.package_hint = Some(hint.into());
        self
    }

    /// The `(type, format)` pair, if both are present and non-empty.
    pub fn kind(&self) -> Option<ArtifactKind> {
        match (self.artifact_type.as_deref(), self.format.as_deref()) {
            (Some(t), Some(f)) if !t.is_empty() && !f.is_empty() => Some(ArtifactKind::new(t, f)),
            _ => None,
        }
    }

    /// Fill in fields this descriptor is missing from `other`.
    pub fn merge_missing(&mut self, other: ArtifactMetadata) {
        if self.artifact_type.is_none() {
            self.artifact_type = other.artifact_type;
        }
        if self.format.is_none() {
            self.format = other.format;
        }
        if self.package_hint.is_none() {
            self.package_hint = other.package_hint;
        }
        for (key, value) in other.extra {
            self.extra.entry(key).or_insert(value);
        }
    }
}

/// Read the descriptor of the artifact at `path`.
///
/// Returns `Ok(None)` when `path` is a file or a directory without a
/// descriptor, and `NotFound` when `path` does not exist.
pub fn load_metadata(path: &Path) -> Result<Option<ArtifactMetadata>> {
    if !path.is_dir() {
        if path.is_file() {
            return Ok(None);
        }
        return Err(ArtifactError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let metadata_path = path.join(METADATA_FILE);
    if !metadata_path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(&metadata_path).map_err(|e| ArtifactError::Metadata {
        path: path_repr(path),
        detail: format!("reading {METADATA_FILE}: {e}"),
    })?;
    let metadata = serde_json::from_str(&content).map_err(|e| ArtifactError::Metadata {
        path: path_repr(path),
        detail: format!("parsing {METADATA_FILE}: {e}"),
    })?;
    Ok(Some(metadata))
}

/// Write `metadata` as the descriptor of the artifact directory `dir`.
pub fn write_metadata(dir: &Path, metadata: &ArtifactMetadata) -> Result<PathBuf> {
    let mut out = pta_io::finalized_open(dir.join(METADATA_FILE))?;
    serde_json::to_writer(&mut out, metadata)?;
    out.write_all(b"\n")?;
    Ok(out.finalize()?)
}

/// Where a cached artifact was materialized from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceInfo {
    Url(String),
    Path(String),
}

impl SourceInfo {
    pub fn location(&self) -> &str {
        match self {
            SourceInfo::Url(s) | SourceInfo::Path(s) => s,
        }
    }
}

/// Path of the sidecar describing `path`'s origin: `<path>.json`.
pub fn source_sidecar(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}

/// Read the origin sidecar for `path`, if one exists and parses.
pub fn read_source(path: &Path) -> Option<SourceInfo> {
    let content = fs::read_to_string(source_sidecar(path)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Render `path` for messages, including its origin when known.
pub fn path_repr(path: &Path) -> String {
    match read_source(path) {
        Some(source) => format!("'{}' <from '{}'>", path.display(), source.location()),
        None => format!("'{}'", path.display()),
    }
}

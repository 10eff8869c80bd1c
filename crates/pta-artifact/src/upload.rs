//! Upload handlers publish a built package somewhere it can be loaded from.

use std::fs;
use std::path::Path;

use crate::error::FetchError;
use crate::locator::file_url_to_path;
use crate::metadata::ArtifactMetadata;

/// A package ready to be published.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    /// Where to publish, scheme included.
    pub destination: &'a str,
    /// Directory holding the package, its manifest and segments, and the
    /// README card.
    pub package_dir: &'a Path,
    pub metadata: &'a ArtifactMetadata,
}

/// Publishes packages for one or more URL schemes.
pub trait UploadHandler: Send + Sync {
    /// Publish the package. Returns the locator it can be loaded from.
    fn upload(&self, request: &UploadRequest<'_>) -> Result<String, FetchError>;
}

/// Publishes the package directory at a `file://` destination.
///
/// The destination directory is replaced atomically, and the result can be
/// loaded back through the same `file://` URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryUploader;

impl UploadHandler for DirectoryUploader {
    fn upload(&self, request: &UploadRequest<'_>) -> Result<String, FetchError> {
        let dest = file_url_to_path(request.destination).ok_or_else(|| FetchError::InvalidLocator {
            locator: request.destination.to_string(),
            detail: "not a local file URL".to_string(),
        })?;

        pta_io::with_finalized_directory(&dest, |tmp| -> Result<(), FetchError> {
            for entry in fs::read_dir(request.package_dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    fs::copy(entry.path(), tmp.join(entry.file_name()))?;
                }
            }
            Ok(())
        })?;

        tracing::info!(destination = %dest.display(), "package published");
        Ok(request.destination.to_string())
    }
}

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::FetchError;
use crate::locator::file_url_to_path;
use crate::package::{unpack_package, PackageSource, PACKAGE_FILE};

use super::{FetchRequest, SchemeHandler};

/// Package files on the local filesystem, addressed by path.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFiles;

impl PackageSource for LocalFiles {
    fn open(&self, location: &str) -> Result<Option<Box<dyn Read + Send>>, FetchError> {
        match File::open(location) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Unpacks packages addressed by `file://` URLs.
///
/// The URL may name the package file itself or a directory holding
/// `artifact.tar.lz4`, as written by the `file` upload handler.
#[derive(Debug, Clone)]
pub struct FileHandler {
    progress: bool,
}

impl FileHandler {
    pub fn new(progress: bool) -> Self {
        FileHandler { progress }
    }
}

impl SchemeHandler for FileHandler {
    fn fetch(&self, request: &FetchRequest<'_>, dest: &Path) -> Result<(), FetchError> {
        let invalid = |detail: &str| FetchError::InvalidLocator {
            locator: request.locator.to_string(),
            detail: detail.to_string(),
        };
        let mut path = file_url_to_path(request.locator)
            .ok_or_else(|| invalid("not a local file URL"))?;
        if path.is_dir() {
            path = path.join(PACKAGE_FILE);
        }
        let location = path
            .to_str()
            .ok_or_else(|| invalid("path is not valid UTF-8"))?;

        tracing::info!(path = location, "unpacking local package");
        unpack_package(&LocalFiles, location, request.expected_sha256, dest, self.progress)
    }
}

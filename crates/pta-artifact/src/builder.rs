//! Staged construction of new artifact directories.

use std::path::{Path, PathBuf};

use pta_io::FinalizedDir;

use crate::error::{ArtifactError, Result};
use crate::metadata::{write_metadata, ArtifactMetadata};

/// What to do when the destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// Fail with `AlreadyExists`.
    #[default]
    Create,
    /// Replace the existing artifact when the build finishes.
    Overwrite,
}

/// Builds an artifact in a temporary directory next to its destination.
///
/// Write the artifact's files under [`path`](Self::path), then call
/// [`finish`](Self::finish) to add `pt_meta.json` and publish. Dropping the
/// builder discards everything written so far.
///
/// ```no_run
/// # fn main() -> pta_artifact::Result<()> {
/// use pta_artifact::{ArtifactBuilder, ArtifactMetadata, BuildMode};
///
/// let meta = ArtifactMetadata::new("sparse_index", "terrier");
/// let builder = ArtifactBuilder::new("/data/msmarco.terrier", meta, BuildMode::Create)?;
/// std::fs::write(builder.path().join("data.properties"), b"num.docs=0\n")?;
/// builder.finish()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ArtifactBuilder {
    staging: FinalizedDir,
    metadata: ArtifactMetadata,
}

impl ArtifactBuilder {
    pub fn new(dest: impl AsRef<Path>, metadata: ArtifactMetadata, mode: BuildMode) -> Result<Self> {
        let dest = dest.as_ref();
        if metadata.kind().is_none() {
            return Err(ArtifactError::Metadata {
                path: format!("'{}'", dest.display()),
                detail: "both type and format are required to build an artifact".to_string(),
            });
        }
        if mode == BuildMode::Create && dest.exists() {
            return Err(ArtifactError::AlreadyExists {
                path: dest.to_path_buf(),
            });
        }
        let staging = pta_io::finalized_directory(dest)?;
        tracing::debug!(dest = %dest.display(), staging = %staging.path().display(), "building artifact");
        Ok(ArtifactBuilder { staging, metadata })
    }

    /// Directory to write the artifact's files into.
    pub fn path(&self) -> &Path {
        self.staging.path()
    }

    pub fn dest(&self) -> &Path {
        self.staging.dest()
    }

    /// Descriptor written on [`finish`](Self::finish); add extra keys here.
    pub fn metadata_mut(&mut self) -> &mut ArtifactMetadata {
        &mut self.metadata
    }

    /// Write `pt_meta.json` and publish the artifact.
    pub fn finish(self) -> Result<PathBuf> {
        write_metadata(self.staging.path(), &self.metadata)?;
        let published = self.staging.finalize()?;
        tracing::info!(path = %published.display(), kind = ?self.metadata.kind(), "artifact built");
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::load_metadata;
    use std::fs;

    #[test]
    fn finish_publishes_with_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("idx");

        let mut builder =
            ArtifactBuilder::new(&dest, ArtifactMetadata::new("sparse_index", "terrier"), BuildMode::Create)
                .unwrap();
        fs::write(builder.path().join("data.properties"), b"num.docs=0\n").unwrap();
        builder
            .metadata_mut()
            .extra
            .insert("num_docs".to_string(), 0.into());
        assert!(!dest.exists());

        let published = builder.finish().unwrap();
        assert_eq!(published, dest);
        assert!(dest.join("data.properties").is_file());
        let meta = load_metadata(&dest).unwrap().unwrap();
        assert_eq!(meta.format.as_deref(), Some("terrier"));
        assert_eq!(meta.extra["num_docs"], 0);
    }

    #[test]
    fn create_refuses_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ArtifactBuilder::new(tmp.path(), ArtifactMetadata::new("x", "y"), BuildMode::Create)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::AlreadyExists { .. }));
    }

    #[test]
    fn overwrite_replaces_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("idx");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("old.bin"), b"old").unwrap();

        let builder =
            ArtifactBuilder::new(&dest, ArtifactMetadata::new("x", "y"), BuildMode::Overwrite).unwrap();
        fs::write(builder.path().join("new.bin"), b"new").unwrap();
        // The old artifact stays readable until the build finishes.
        assert!(dest.join("old.bin").is_file());
        builder.finish().unwrap();

        assert!(!dest.join("old.bin").exists());
        assert!(dest.join("new.bin").is_file());
    }

    #[test]
    fn drop_discards() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("idx");
        {
            let builder =
                ArtifactBuilder::new(&dest, ArtifactMetadata::new("x", "y"), BuildMode::Create).unwrap();
            fs::write(builder.path().join("partial.bin"), b"half").unwrap();
        }
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn requires_kind() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ArtifactBuilder::new(tmp.path().join("idx"), ArtifactMetadata::default(), BuildMode::Create)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Metadata { .. }));
    }
}

//! Locator resolution: classify, materialize, read metadata, dispatch.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::ArtifactCache;
use crate::config::Config;
use crate::error::{ArtifactError, FetchError, Result};
use crate::locator::Locator;
use crate::metadata::{load_metadata, path_repr, ArtifactMetadata, SourceInfo};
use crate::package::{build_package, PackageOptions, PACKAGE_FILE};
use crate::readme::{render_readme, README_FILE};
use crate::registry::{Artifact, Registry};
use crate::scheme::FetchRequest;
use crate::upload::UploadRequest;

/// Hugging Face repository holding one branch per `<dataset>.<variant>`.
pub const DATASET_ARTIFACTS_REPO: &str = "macavaney/pyterrier-from-dataset";

/// Per-call options for [`Resolver::load_with`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Hex SHA-256 the downloaded package must match.
    pub expected_sha256: Option<String>,
    /// Fetch again even if the locator is cached.
    pub refresh: bool,
}

/// Options for [`Resolver::upload`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Split the package into segments of roughly this many bytes.
    pub max_file_size: Option<u64>,
    /// Title for the README card; defaults to the artifact directory name.
    pub name: Option<String>,
}

/// Turns locators into constructed artifacts.
///
/// The registry is fixed at construction; share a resolver across threads by
/// reference or behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Resolver {
    registry: Arc<Registry>,
    cache: ArtifactCache,
}

impl Resolver {
    pub fn new(registry: Arc<Registry>, cache: ArtifactCache) -> Self {
        Resolver { registry, cache }
    }

    /// A resolver with the built-in handlers and the configured cache.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Resolver::new(
            Arc::new(Registry::with_defaults(config)?),
            ArtifactCache::from_config(config),
        ))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Load the artifact at `locator`, a local path or a remote URL.
    pub fn load(&self, locator: &str) -> Result<Box<dyn Artifact>> {
        self.load_with(locator, &LoadOptions::default())
    }

    pub fn load_with(&self, locator: &str, options: &LoadOptions) -> Result<Box<dyn Artifact>> {
        let path = self.materialize(locator, options)?;
        self.load_path(&path)
    }

    /// Load `hf:<repo>[@<branch>]`. The branch may be given inline or as
    /// `branch`, not both.
    pub fn from_hf(
        &self,
        repo: &str,
        branch: Option<&str>,
        options: &LoadOptions,
    ) -> Result<Box<dyn Artifact>> {
        let locator = match branch {
            Some(_) if repo.contains('@') => {
                return Err(ArtifactError::InvalidLocator {
                    locator: repo.to_string(),
                    detail: "branch given both in the repository id and as an argument".to_string(),
                })
            }
            Some(branch) => format!("hf:{repo}@{branch}"),
            None => format!("hf:{repo}"),
        };
        self.load_with(&locator, options)
    }

    /// Load the artifact published for a dataset variant, e.g.
    /// `from_dataset("msmarco_passage", "terrier_stemmed", ..)`.
    pub fn from_dataset(
        &self,
        dataset: &str,
        variant: &str,
        options: &LoadOptions,
    ) -> Result<Box<dyn Artifact>> {
        self.from_hf(DATASET_ARTIFACTS_REPO, Some(&format!("{dataset}.{variant}")), options)
    }

    /// Local path for `locator`, fetching it into the cache if needed.
    ///
    /// Local paths are returned unchanged without touching the filesystem.
    pub fn materialize(&self, locator: &str, options: &LoadOptions) -> Result<PathBuf> {
        let (scheme, url) = match Locator::parse(locator) {
            Locator::Local(path) => return Ok(path),
            Locator::Remote { scheme, url } => (scheme, url),
        };
        let locator = url.as_str();
        let handler = self
            .registry
            .scheme(&scheme)
            .ok_or_else(|| ArtifactError::UnsupportedScheme {
                scheme: scheme.clone(),
                locator: locator.to_string(),
            })?;

        if !options.refresh {
            if let Some(entry) = self.cache.get(locator) {
                tracing::debug!(locator, path = %entry.path.display(), "cache hit");
                return Ok(entry.path);
            }
        }
        tracing::debug!(locator, refresh = options.refresh, "cache miss");

        let request = FetchRequest {
            locator,
            expected_sha256: options.expected_sha256.as_deref(),
        };
        let source = SourceInfo::Url(locator.to_string());
        let path = self
            .cache
            .populate(locator, &source, |tmp| handler.fetch(&request, tmp))
            .map_err(|e| match e {
                FetchError::Integrity(integrity) => ArtifactError::Integrity(integrity),
                other => ArtifactError::Fetch {
                    locator: locator.to_string(),
                    source: other,
                },
            })?;
        tracing::info!(locator, path = %path.display(), "artifact materialized");
        Ok(path)
    }

    /// Construct the artifact stored at a local path.
    pub fn load_path(&self, path: &Path) -> Result<Box<dyn Artifact>> {
        let metadata = self.metadata(path)?;
        let kind = metadata.kind().ok_or_else(|| ArtifactError::Metadata {
            path: path_repr(path),
            detail: "both type and format are required".to_string(),
        })?;

        let factory = self
            .registry
            .implementation(&kind)
            .ok_or_else(|| ArtifactError::UnknownArtifactType {
                path: path_repr(path),
                artifact_type: kind.artifact_type.clone(),
                format: kind.format.clone(),
                registered: self.registry.kinds(),
                package_hint: metadata.package_hint.clone(),
            })?;

        tracing::debug!(path = %path.display(), kind = %kind, "constructing artifact");
        factory(path).map_err(ArtifactError::Construction)
    }

    /// The descriptor of the artifact at `path`, completed by the registered
    /// metadata adapters where fields are missing.
    pub fn metadata(&self, path: &Path) -> Result<ArtifactMetadata> {
        let descriptor = load_metadata(path)?;
        if let Some(meta) = &descriptor {
            if meta.kind().is_some() {
                return Ok(meta.clone());
            }
        }

        let listing = directory_listing(path)?;
        let adapted = self.registry.adapt_metadata(path, &listing);
        match (descriptor, adapted) {
            (Some(mut meta), Some(adapted)) => {
                meta.merge_missing(adapted);
                Ok(meta)
            }
            (Some(meta), None) => Ok(meta),
            (None, Some(adapted)) => {
                tracing::debug!(path = %path.display(), "metadata supplied by adapter");
                Ok(adapted)
            }
            (None, None) => Err(ArtifactError::Metadata {
                path: path_repr(path),
                detail: "no pt_meta.json and no metadata adapter recognized the artifact".to_string(),
            }),
        }
    }

    /// Package the artifact directory and publish it at `destination`.
    ///
    /// Returns the locator the published artifact can be loaded from.
    pub fn upload(&self, artifact_dir: &Path, destination: &str, options: &UploadOptions) -> Result<String> {
        let destination = match Locator::parse(destination) {
            Locator::Remote { .. } => destination.to_string(),
            Locator::Local(path) => local_file_url(&path)?,
        };
        let scheme = Locator::parse(&destination)
            .scheme()
            .unwrap_or_default()
            .to_string();
        let handler = self
            .registry
            .uploader(&scheme)
            .ok_or_else(|| ArtifactError::UnsupportedScheme {
                scheme: scheme.clone(),
                locator: destination.clone(),
            })?;

        let metadata = self.metadata(artifact_dir)?;
        if metadata.kind().is_none() {
            return Err(ArtifactError::Metadata {
                path: path_repr(artifact_dir),
                detail: "both type and format are required to upload".to_string(),
            });
        }

        let staging = tempfile::tempdir()?;
        let manifest = build_package(
            artifact_dir,
            &PackageOptions {
                package_path: staging.path().join(PACKAGE_FILE),
                max_file_size: options.max_file_size,
                metadata: Some(metadata.clone()),
            },
        )?;

        let name = options.name.clone().unwrap_or_else(|| {
            artifact_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "artifact".to_string())
        });
        fs::write(
            staging.path().join(README_FILE),
            render_readme(&name, &destination, &metadata)?,
        )?;

        tracing::info!(
            destination = %destination,
            sha256 = manifest.expected_sha256.as_deref().unwrap_or_default(),
            "uploading package"
        );
        handler
            .upload(&UploadRequest {
                destination: &destination,
                package_dir: staging.path(),
                metadata: &metadata,
            })
            .map_err(|source| ArtifactError::Upload {
                destination: destination.clone(),
                source,
            })
    }
}

/// Sorted file names directly under `path`; empty when `path` is a file.
fn directory_listing(path: &Path) -> Result<Vec<String>> {
    if !path.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

fn local_file_url(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    url::Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|()| ArtifactError::InvalidLocator {
            locator: path.display().to_string(),
            detail: "cannot be expressed as a file URL".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{write_metadata, METADATA_FILE};
    use crate::scheme::SchemeHandler;
    use std::any::Any;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Index {
        path: PathBuf,
    }

    impl Artifact for Index {
        fn path(&self) -> &Path {
            &self.path
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn open_index(path: &Path) -> std::result::Result<Index, io::Error> {
        Ok(Index {
            path: path.to_path_buf(),
        })
    }

    /// Writes an `x.y` descriptor and counts its calls.
    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    impl SchemeHandler for CountingHandler {
        fn fetch(&self, _: &FetchRequest<'_>, dest: &Path) -> std::result::Result<(), FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            fs::write(dest.join(METADATA_FILE), br#"{"type":"x","format":"y"}"#)?;
            Ok(())
        }
    }

    struct FailingHandler(fn() -> FetchError);

    impl SchemeHandler for FailingHandler {
        fn fetch(&self, _: &FetchRequest<'_>, dest: &Path) -> std::result::Result<(), FetchError> {
            fs::write(dest.join("partial.bin"), b"half")?;
            Err((self.0)())
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_artifact("x", "y", open_index).unwrap();
        registry
    }

    fn resolver(registry: Registry, cache_root: &Path) -> Resolver {
        Resolver::new(Arc::new(registry), ArtifactCache::new(cache_root))
    }

    #[test]
    fn dispatches_on_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        write_metadata(tmp.path(), &ArtifactMetadata::new("x", "y")).unwrap();

        let resolver = resolver(registry(), &tmp.path().join("cache"));
        let artifact = resolver.load(tmp.path().to_str().unwrap()).unwrap();
        let index = artifact.downcast_ref::<Index>().unwrap();
        assert_eq!(index.path, tmp.path());
        assert_eq!(artifact.path(), tmp.path());
    }

    #[test]
    fn unknown_type_lists_registered() {
        let tmp = tempfile::tempdir().unwrap();
        write_metadata(
            tmp.path(),
            &ArtifactMetadata::new("x", "z").with_package_hint("pyterrier-z"),
        )
        .unwrap();

        let err = resolver(registry(), &tmp.path().join("cache"))
            .load_path(tmp.path())
            .unwrap_err();
        match &err {
            ArtifactError::UnknownArtifactType {
                artifact_type,
                format,
                registered,
                package_hint,
                ..
            } => {
                assert_eq!((artifact_type.as_str(), format.as_str()), ("x", "z"));
                assert_eq!(registered.len(), 1);
                assert_eq!(package_hint.as_deref(), Some("pyterrier-z"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("x.y"));
    }

    #[test]
    fn unsupported_scheme_before_io() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_root = tmp.path().join("cache");
        let err = resolver(registry(), &cache_root).load("nope://x").unwrap_err();
        assert!(matches!(
            &err,
            ArtifactError::UnsupportedScheme { scheme, .. } if scheme == "nope"
        ));
        assert!(!cache_root.exists());
    }

    #[test]
    fn remote_fetch_is_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = Arc::new(CountingHandler::default());
        let mut registry = registry();
        registry.register_scheme("mem", handler.clone()).unwrap();
        let resolver = resolver(registry, tmp.path());

        let first = resolver.load("mem://a").unwrap();
        let second = resolver.load("mem://a").unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.path(), second.path());
        assert_eq!(first.path(), resolver.cache().entry_path("mem://a"));
        assert_eq!(
            resolver.cache().get("mem://a").unwrap().source,
            Some(SourceInfo::Url("mem://a".to_string()))
        );

        resolver.load("mem://b").unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);

        let refresh = LoadOptions {
            refresh: true,
            ..Default::default()
        };
        resolver.load_with("mem://a", &refresh).unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_fetch_leaves_no_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let mut registry = registry();
        registry
            .register_scheme(
                "mem",
                Arc::new(FailingHandler(|| FetchError::NotFound {
                    location: "mem://gone".to_string(),
                })),
            )
            .unwrap();
        let resolver = resolver(registry, tmp.path());

        let err = resolver.load("mem://gone").unwrap_err();
        assert!(matches!(&err, ArtifactError::Fetch { locator, .. } if locator == "mem://gone"));
        assert!(!resolver.cache().contains("mem://gone"));
        assert!(resolver.cache().list().unwrap().is_empty());
    }

    #[test]
    fn integrity_failure_surfaces_as_integrity() {
        let tmp = tempfile::tempdir().unwrap();
        let mut registry = registry();
        registry
            .register_scheme(
                "mem",
                Arc::new(FailingHandler(|| {
                    pta_io::IntegrityError {
                        expected: "aa".to_string(),
                        actual: "bb".to_string(),
                    }
                    .into()
                })),
            )
            .unwrap();
        let err = resolver(registry, tmp.path()).load("mem://bad").unwrap_err();
        assert!(matches!(err, ArtifactError::Integrity(_)));
    }

    #[test]
    fn construction_error_is_passed_through() {
        let tmp = tempfile::tempdir().unwrap();
        write_metadata(tmp.path(), &ArtifactMetadata::new("x", "broken")).unwrap();
        let mut registry = registry();
        registry
            .register_artifact("x", "broken", |_: &Path| -> std::result::Result<Index, io::Error> {
                Err(io::Error::new(io::ErrorKind::InvalidData, "lexicon is truncated"))
            })
            .unwrap();

        let err = resolver(registry, &tmp.path().join("cache"))
            .load_path(tmp.path())
            .unwrap_err();
        assert_eq!(err.to_string(), "lexicon is truncated");
        match err {
            ArtifactError::Construction(inner) => {
                assert_eq!(
                    inner.downcast_ref::<io::Error>().unwrap().kind(),
                    io::ErrorKind::InvalidData
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_path_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing");
        let err = resolver(registry(), tmp.path())
            .load(missing.to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound { .. }));
    }

    #[test]
    fn missing_descriptor_without_adapter() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolver(registry(), &tmp.path().join("cache"))
            .load_path(tmp.path())
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Metadata { .. }));
    }

    #[test]
    fn incomplete_descriptor_names_path() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(METADATA_FILE), br#"{"type":"x"}"#).unwrap();
        let err = resolver(registry(), &tmp.path().join("cache"))
            .load_path(tmp.path())
            .unwrap_err();
        match err {
            ArtifactError::Metadata { path, .. } => {
                assert!(path.contains(&tmp.path().display().to_string()))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn adapter_supplies_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("data.properties"), b"").unwrap();
        let mut registry = registry();
        registry.register_adapter(|_: &Path, listing: &[String]| -> Option<ArtifactMetadata> {
            listing
                .iter()
                .any(|f| f == "data.properties")
                .then(|| ArtifactMetadata::new("x", "y"))
        });

        let artifact = resolver(registry, &tmp.path().join("cache"))
            .load_path(tmp.path())
            .unwrap();
        assert!(artifact.downcast_ref::<Index>().is_some());
    }

    #[test]
    fn adapter_completes_partial_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(METADATA_FILE), br#"{"type":"x","note":"kept"}"#).unwrap();
        let mut registry = registry();
        registry.register_adapter(|_: &Path, _: &[String]| -> Option<ArtifactMetadata> {
            Some(ArtifactMetadata::new("ignored", "y"))
        });

        let resolver = resolver(registry, &tmp.path().join("cache"));
        let meta = resolver.metadata(tmp.path()).unwrap();
        assert_eq!(meta.artifact_type.as_deref(), Some("x"));
        assert_eq!(meta.format.as_deref(), Some("y"));
        assert_eq!(meta.extra["note"], "kept");
    }

    #[test]
    fn from_hf_rejects_double_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolver(registry(), tmp.path())
            .from_hf("org/repo@v1", Some("v2"), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, ArtifactError::InvalidLocator { .. }));
    }

    #[test]
    fn from_hf_builds_locator() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = Arc::new(CountingHandler::default());
        let mut registry = registry();
        registry.register_scheme("hf", handler.clone()).unwrap();
        let resolver = resolver(registry, tmp.path());

        resolver
            .from_hf("org/repo", Some("v2"), &LoadOptions::default())
            .unwrap();
        assert!(resolver.cache().contains("hf:org/repo@v2"));
        resolver.load("hf:org/repo@v2").unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn padded_locator_is_normalized() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = Arc::new(CountingHandler::default());
        let mut registry = registry();
        registry.register_scheme("https", handler.clone()).unwrap();
        let resolver = resolver(registry, tmp.path());

        resolver.load(" https://example.org/idx\n").unwrap();
        resolver.load("https://example.org/idx").unwrap();
        assert!(resolver.cache().contains("https://example.org/idx"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn from_dataset_uses_variant_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let handler = Arc::new(CountingHandler::default());
        let mut registry = registry();
        registry.register_scheme("hf", handler.clone()).unwrap();
        let resolver = resolver(registry, tmp.path());

        resolver
            .from_dataset("msmarco_passage", "terrier_stemmed", &LoadOptions::default())
            .unwrap();
        assert!(resolver
            .cache()
            .contains("hf:macavaney/pyterrier-from-dataset@msmarco_passage.terrier_stemmed"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn upload_without_handler_is_unsupported() {
        let tmp = tempfile::tempdir().unwrap();
        write_metadata(tmp.path(), &ArtifactMetadata::new("x", "y")).unwrap();
        let err = resolver(registry(), &tmp.path().join("cache"))
            .upload(tmp.path(), "s3://bucket/idx", &UploadOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ArtifactError::UnsupportedScheme { scheme, .. } if scheme == "s3"
        ));
    }

    #[test]
    fn resolver_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Resolver>();
    }
}

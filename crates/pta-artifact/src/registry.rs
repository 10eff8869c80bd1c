//! Registration of artifact implementations and locator handlers.
//!
//! A [`Registry`] is built once, before the first load, by explicit
//! registration calls or by installing [`Plugin`]s. It is then frozen behind an
//! `Arc` and handed to a [`Resolver`](crate::Resolver). Registering the same
//! key twice is an error; there is no override.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{ArtifactError, BoxError, Result};
use crate::metadata::ArtifactMetadata;
use crate::scheme::{FileHandler, HfHandler, HttpHandler, SchemeHandler};
use crate::upload::{DirectoryUploader, UploadHandler};

/// An on-disk artifact, such as an index.
///
/// Implementations typically act as factories for the pipeline components
/// that use them. The resolver only needs the path; callers recover the
/// concrete type through [`as_any`](Artifact::as_any).
pub trait Artifact: fmt::Debug + Send + Sync + 'static {
    /// Root path of the artifact on disk.
    fn path(&self) -> &Path;

    fn as_any(&self) -> &dyn Any;
}

impl dyn Artifact {
    /// Downcast to a concrete artifact implementation.
    pub fn downcast_ref<T: Artifact>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// The `(type, format)` pair an implementation is registered under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactKind {
    /// What the artifact is, e.g. `sparse_index`.
    pub artifact_type: String,
    /// How it is laid out on disk, e.g. `terrier`.
    pub format: String,
}

impl ArtifactKind {
    pub fn new(artifact_type: impl Into<String>, format: impl Into<String>) -> Self {
        ArtifactKind {
            artifact_type: artifact_type.into(),
            format: format.into(),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.artifact_type, self.format)
    }
}

/// Builds an artifact from its local path.
pub type ArtifactFactory =
    Arc<dyn Fn(&Path) -> std::result::Result<Box<dyn Artifact>, BoxError> + Send + Sync>;

/// Supplies metadata for artifacts that lack a `pt_meta.json` descriptor.
///
/// Adapters see the artifact path and its directory listing (empty when the
/// path is a file) and return `None` when they do not recognize it.
pub trait MetadataAdapter: Send + Sync {
    fn adapt(&self, path: &Path, listing: &[String]) -> Option<ArtifactMetadata>;
}

impl<F> MetadataAdapter for F
where
    F: Fn(&Path, &[String]) -> Option<ArtifactMetadata> + Send + Sync,
{
    fn adapt(&self, path: &Path, listing: &[String]) -> Option<ArtifactMetadata> {
        self(path, listing)
    }
}

/// A bundle of registrations, installed together.
pub trait Plugin {
    fn register(&self, registry: &mut Registry) -> Result<()>;
}

/// Implementations, metadata adapters, and scheme/upload handlers.
#[derive(Default)]
pub struct Registry {
    implementations: BTreeMap<ArtifactKind, ArtifactFactory>,
    adapters: Vec<Box<dyn MetadataAdapter>>,
    schemes: BTreeMap<String, Arc<dyn SchemeHandler>>,
    uploaders: BTreeMap<String, Arc<dyn UploadHandler>>,
}

impl Registry {
    /// An empty registry with no handlers at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `http`, `https`, `file`, and `hf` scheme
    /// handlers and the `file` upload handler.
    pub fn with_defaults(config: &Config) -> Result<Self> {
        let mut registry = Registry::new();
        registry.install(&BuiltinHandlers { config })?;
        Ok(registry)
    }

    /// Register an implementation for `(artifact_type, format)`.
    pub fn register_artifact<A, E, F>(
        &mut self,
        artifact_type: &str,
        format: &str,
        factory: F,
    ) -> Result<&mut Self>
    where
        A: Artifact,
        E: Into<BoxError>,
        F: Fn(&Path) -> std::result::Result<A, E> + Send + Sync + 'static,
    {
        let kind = ArtifactKind::new(artifact_type, format);
        if kind.artifact_type.is_empty() || kind.format.is_empty() {
            return Err(ArtifactError::Metadata {
                path: "<registration>".to_string(),
                detail: format!("type and format must be non-empty (got '{kind}')"),
            });
        }
        if self.implementations.contains_key(&kind) {
            return Err(ArtifactError::DuplicateRegistration {
                what: "artifact implementation",
                key: kind.to_string(),
            });
        }
        let build: ArtifactFactory = Arc::new(
            move |path: &Path| -> std::result::Result<Box<dyn Artifact>, BoxError> {
                match factory(path) {
                    Ok(artifact) => Ok(Box::new(artifact)),
                    Err(e) => Err(e.into()),
                }
            },
        );
        self.implementations.insert(kind, build);
        Ok(self)
    }

    /// Register a metadata adapter. Adapters are consulted in registration order.
    pub fn register_adapter(&mut self, adapter: impl MetadataAdapter + 'static) -> &mut Self {
        self.adapters.push(Box::new(adapter));
        self
    }

    /// Register the handler for a (case-sensitive) URL scheme.
    pub fn register_scheme(
        &mut self,
        scheme: &str,
        handler: Arc<dyn SchemeHandler>,
    ) -> Result<&mut Self> {
        if self.schemes.contains_key(scheme) {
            return Err(ArtifactError::DuplicateRegistration {
                what: "scheme handler",
                key: scheme.to_string(),
            });
        }
        self.schemes.insert(scheme.to_string(), handler);
        Ok(self)
    }

    /// Register the upload handler for a (case-sensitive) URL scheme.
    pub fn register_uploader(
        &mut self,
        scheme: &str,
        handler: Arc<dyn UploadHandler>,
    ) -> Result<&mut Self> {
        if self.uploaders.contains_key(scheme) {
            return Err(ArtifactError::DuplicateRegistration {
                what: "upload handler",
                key: scheme.to_string(),
            });
        }
        self.uploaders.insert(scheme.to_string(), handler);
        Ok(self)
    }

    /// Install every registration a plugin provides.
    pub fn install(&mut self, plugin: &dyn Plugin) -> Result<&mut Self> {
        plugin.register(self)?;
        Ok(self)
    }

    pub fn implementation(&self, kind: &ArtifactKind) -> Option<&ArtifactFactory> {
        self.implementations.get(kind)
    }

    /// All registered kinds, sorted.
    pub fn kinds(&self) -> Vec<ArtifactKind> {
        self.implementations.keys().cloned().collect()
    }

    pub fn scheme(&self, scheme: &str) -> Option<&Arc<dyn SchemeHandler>> {
        self.schemes.get(scheme)
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.schemes.keys().map(String::as_str)
    }

    pub fn uploader(&self, scheme: &str) -> Option<&Arc<dyn UploadHandler>> {
        self.uploaders.get(scheme)
    }

    /// Ask each adapter in turn for metadata; the first answer wins.
    pub fn adapt_metadata(&self, path: &Path, listing: &[String]) -> Option<ArtifactMetadata> {
        self.adapters.iter().find_map(|a| a.adapt(path, listing))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("implementations", &self.kinds())
            .field("adapters", &self.adapters.len())
            .field("schemes", &self.schemes.keys().collect::<Vec<_>>())
            .field("uploaders", &self.uploaders.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct BuiltinHandlers<'a> {
    config: &'a Config,
}

impl Plugin for BuiltinHandlers<'_> {
    fn register(&self, registry: &mut Registry) -> Result<()> {
        let http = Arc::new(HttpHandler::new(self.config)?);
        registry.register_scheme("http", http.clone())?;
        registry.register_scheme("https", http.clone())?;
        registry.register_scheme("file", Arc::new(FileHandler::new(self.config.progress)))?;
        registry.register_scheme(
            "hf",
            Arc::new(HfHandler::new(self.config.hf_endpoint.clone(), http)),
        )?;
        registry.register_uploader("file", Arc::new(DirectoryUploader))?;
        Ok(())
    }
}

//! Pluggable loading of on-disk PyTerrier artifacts.
//!
//! An artifact is a directory (or file) with a `pt_meta.json` descriptor
//! naming its `type` and `format`. Given a locator, the [`Resolver`]:
//! 1. classifies it as a local path or a remote URL,
//! 2. materializes remote locators into the [`ArtifactCache`] through the
//!    [`SchemeHandler`] registered for the URL scheme,
//! 3. reads the descriptor, asking [`MetadataAdapter`]s when it is missing,
//! 4. constructs the implementation registered for `(type, format)`.
//!
//! ```no_run
//! # fn main() -> pta_artifact::Result<()> {
//! use std::sync::Arc;
//! use pta_artifact::{ArtifactCache, Config, Registry, Resolver};
//!
//! let config = Config::load()?;
//! let registry = Registry::with_defaults(&config)?;
//! // registry.register_artifact("sparse_index", "terrier", TerrierIndex::open)?;
//! let resolver = Resolver::new(Arc::new(registry), ArtifactCache::from_config(&config));
//! let artifact = resolver.load("hf:pyterrier/msmarco-passage.terrier")?;
//! println!("{}", artifact.path().display());
//! # Ok(())
//! # }
//! ```
//!
//! Packages built by [`build_package`] can be published with
//! [`Resolver::upload`] and loaded back by any handler that understands the
//! destination's scheme.

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod locator;
pub mod metadata;
pub mod package;
pub mod readme;
pub mod registry;
pub mod resolver;
pub mod scheme;
pub mod upload;

// Re-exports for convenience.
pub use builder::{ArtifactBuilder, BuildMode};
pub use cache::{ArtifactCache, CacheEntry};
pub use config::{Config, HttpConfig};
pub use error::{ArtifactError, BoxError, FetchError, Result};
pub use locator::Locator;
pub use metadata::{load_metadata, path_repr, ArtifactMetadata, SourceInfo, METADATA_FILE};
pub use package::{build_package, unpack_package, Codec, PackageManifest, PackageOptions, PACKAGE_FILE};
pub use registry::{Artifact, ArtifactFactory, ArtifactKind, MetadataAdapter, Plugin, Registry};
pub use resolver::{LoadOptions, Resolver, UploadOptions, DATASET_ARTIFACTS_REPO};
pub use scheme::{FetchRequest, FileHandler, HfHandler, HttpHandler, SchemeHandler};
pub use upload::{DirectoryUploader, UploadHandler, UploadRequest};

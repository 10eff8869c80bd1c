//! Artifact error types.

use std::io;
use std::path::PathBuf;

use pta_io::IntegrityError;

use crate::registry::ArtifactKind;

/// A boxed error from outside this crate (artifact constructors, custom handlers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures raised by scheme and upload handlers while moving bytes.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    /// The remote resource does not exist.
    #[error("{location} not found")]
    NotFound { location: String },

    /// Downloaded bytes did not match the expected digest.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// The handler cannot interpret the locator it was given.
    #[error("invalid locator '{locator}': {detail}")]
    InvalidLocator { locator: String, detail: String },

    /// The package or its manifest is malformed.
    #[error("invalid package: {detail}")]
    Package { detail: String },

    /// I/O error while reading or writing local data.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure reported by a third-party handler.
    #[error(transparent)]
    Other(BoxError),
}

/// Errors that can occur while resolving, loading, or publishing artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// No scheme handler is registered for the locator's scheme.
    #[error("no handler registered for scheme '{scheme}' (locator '{locator}')")]
    UnsupportedScheme { scheme: String, locator: String },

    /// A scheme handler failed to materialize a remote locator.
    #[error("failed to fetch '{locator}': {source}")]
    Fetch {
        locator: String,
        #[source]
        source: FetchError,
    },

    /// Computed digest did not match the expected one.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// The metadata descriptor is missing, unreadable, or incomplete.
    #[error("invalid artifact metadata at {path}: {detail}")]
    Metadata { path: String, detail: String },

    /// No implementation is registered for the artifact's `(type, format)`.
    #[error(
        "no implementation found that supports the artifact at {path}: type={artifact_type}, format={format}{}",
        unknown_type_suffix(.registered, .package_hint)
    )]
    UnknownArtifactType {
        path: String,
        artifact_type: String,
        format: String,
        registered: Vec<ArtifactKind>,
        package_hint: Option<String>,
    },

    /// The implementation's constructor failed.
    #[error(transparent)]
    Construction(BoxError),

    /// The artifact path does not exist.
    #[error("{} not found", .path.display())]
    NotFound { path: PathBuf },

    /// Something was registered twice.
    #[error("{what} already registered: {key}")]
    DuplicateRegistration { what: &'static str, key: String },

    /// An upload handler failed to publish a package.
    #[error("failed to upload to '{destination}': {source}")]
    Upload {
        destination: String,
        #[source]
        source: FetchError,
    },

    /// The locator could not be interpreted.
    #[error("invalid locator '{locator}': {detail}")]
    InvalidLocator { locator: String, detail: String },

    /// The destination of a build already exists.
    #[error("{} already exists", .path.display())]
    AlreadyExists { path: PathBuf },

    /// A cache entry could not be read, listed, or removed.
    #[error("cache error at {}: {detail}", .path.display())]
    Cache { path: PathBuf, detail: String },

    /// The configuration file could not be read or parsed.
    #[error("invalid configuration in {}: {detail}", .path.display())]
    Config { path: PathBuf, detail: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn unknown_type_suffix(registered: &[ArtifactKind], package_hint: &Option<String>) -> String {
    let mut out = String::new();
    if let Some(hint) = package_hint {
        out.push_str(&format!(". Is the '{hint}' package installed?"));
    }
    if !registered.is_empty() {
        let names: Vec<String> = registered.iter().map(ToString::to_string).collect();
        out.push_str(&format!(" (registered: {})", names.join(", ")));
    }
    out
}

/// Result type alias for artifact operations.
pub type Result<T> = std::result::Result<T, ArtifactError>;

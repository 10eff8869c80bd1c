//! Scheme handlers materialize remote locators into local directories.
//!
//! The resolver picks a handler by the locator's URL scheme and calls
//! [`SchemeHandler::fetch`] with a fresh temporary directory. Whatever the
//! handler leaves there is published into the cache on success and discarded
//! on failure, so handlers never need to clean up after themselves.

mod file;
mod hf;
mod http;

use std::path::Path;

use crate::error::FetchError;

pub use file::{FileHandler, LocalFiles};
pub use hf::{parse_hf_locator, HfHandler, DEFAULT_HF_REVISION};
pub use http::HttpHandler;

/// What to fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    /// The full locator, scheme included.
    pub locator: &'a str,
    /// Hex SHA-256 the downloaded package must have.
    pub expected_sha256: Option<&'a str>,
}

impl<'a> FetchRequest<'a> {
    pub fn new(locator: &'a str) -> Self {
        FetchRequest {
            locator,
            expected_sha256: None,
        }
    }
}

/// Materializes locators of one or more URL schemes.
pub trait SchemeHandler: Send + Sync {
    /// Fill `dest` (an existing, empty directory) with the artifact.
    fn fetch(&self, request: &FetchRequest<'_>, dest: &Path) -> Result<(), FetchError>;
}

//! I/O error types.

use std::io;

/// A computed digest did not match the digest the caller expected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("integrity check failed: expected sha256 {expected}, found {actual}")]
pub struct IntegrityError {
    /// The digest supplied by the caller (as given, not normalized).
    pub expected: String,
    /// The digest computed over the bytes actually read.
    pub actual: String,
}

impl From<IntegrityError> for io::Error {
    fn from(err: IntegrityError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

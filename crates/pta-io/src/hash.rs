//! Hashing stream wrappers.
//!
//! [`HashWriter`] and [`HashReader`] sit between a producer and a consumer
//! and keep a running digest of every byte that crosses them. The digest
//! defaults to SHA-256 but any [`sha2::Digest`] can be plugged in.

use std::fmt;
use std::io::{self, Read, Write};

use sha2::{Digest, Sha256};

use crate::error::IntegrityError;

/// A content hash (SHA-256 hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute the SHA-256 hash of the given data.
    pub fn compute(data: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data.as_ref());
        ContentHash(hex_encode(&hasher.finalize()))
    }

    /// Get the hex string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a hex digest, ignoring ASCII case.
    pub fn matches(&self, hex: &str) -> bool {
        self.0.eq_ignore_ascii_case(hex)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encode bytes as lowercase hex string.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A writer that digests everything written through it.
///
/// Only the bytes the inner writer reports as accepted are fed to the
/// digest, so the digest always matches what actually reached the sink.
pub struct HashWriter<W, D = Sha256> {
    inner: W,
    hasher: D,
    written: u64,
}

impl<W: Write> HashWriter<W> {
    /// Wrap `inner`, hashing with SHA-256.
    pub fn new(inner: W) -> Self {
        Self::with_digest(inner)
    }
}

impl<W: Write, D: Digest + Clone> HashWriter<W, D> {
    /// Wrap `inner`, hashing with the digest `D`.
    pub fn with_digest(inner: W) -> Self {
        HashWriter {
            inner,
            hasher: D::new(),
            written: 0,
        }
    }

    /// Hex digest of all bytes written so far.
    pub fn hexdigest(&self) -> String {
        hex_encode(&self.hasher.clone().finalize())
    }

    /// Number of bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Swap the underlying sink, keeping the running digest.
    ///
    /// Returns the previous sink so the caller can finalize it.
    pub fn replace_writer(&mut self, writer: W) -> W {
        std::mem::replace(&mut self.inner, writer)
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write, D: Digest> Write for HashWriter<W, D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A reader that digests everything read through it.
///
/// When constructed with [`HashReader::verifying`], [`HashReader::close`]
/// checks the computed digest against the expected one. Dropping the reader
/// without calling `close` skips the check.
pub struct HashReader<R, D = Sha256> {
    inner: R,
    hasher: D,
    expected: Option<String>,
    read: u64,
}

impl<R: Read> HashReader<R> {
    /// Wrap `inner`, hashing with SHA-256 and verifying nothing on close.
    pub fn new(inner: R) -> Self {
        Self::with_digest(inner, None)
    }

    /// Wrap `inner`, verifying the SHA-256 digest against `expected` on close.
    pub fn verifying(inner: R, expected: impl Into<String>) -> Self {
        Self::with_digest(inner, Some(expected.into()))
    }
}

impl<R: Read, D: Digest + Clone> HashReader<R, D> {
    /// Wrap `inner`, hashing with the digest `D`.
    pub fn with_digest(inner: R, expected: Option<String>) -> Self {
        HashReader {
            inner,
            hasher: D::new(),
            expected,
            read: 0,
        }
    }

    /// Hex digest of all bytes read so far.
    pub fn hexdigest(&self) -> String {
        hex_encode(&self.hasher.clone().finalize())
    }

    /// The expected digest, if one was supplied.
    pub fn expected(&self) -> Option<&str> {
        self.expected.as_deref()
    }

    /// Number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Release the reader, verifying the digest if an expectation was set.
    ///
    /// The digest covers only what was read; callers that want a whole-stream
    /// check must drain the reader first.
    pub fn close(self) -> Result<R, IntegrityError> {
        if let Some(expected) = &self.expected {
            let actual = self.hexdigest();
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(IntegrityError {
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(self.inner)
    }
}

impl<R: Read, D: Digest> Read for HashReader<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}

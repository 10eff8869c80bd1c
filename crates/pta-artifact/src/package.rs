//! Artifact packages: a compressed tar of an artifact directory.
//!
//! A package at `<url>` may come with a manifest at `<url>.json`:
//!
//! ```json
//! {"expected_sha256": "…", "total_size": 1234,
//!  "contents": [{"path": "pt_meta.json", "size": 40, "offset": 0}],
//!  "segments": [{"idx": 0, "offset": 0}, {"idx": 1, "offset": 1048576}]}
//! ```
//!
//! When `segments` is present the package bytes are split across
//! `<url>.0 … <url>.n`, which are read back to back as a single stream.
//! Offsets are positions in the compressed stream; sizes are uncompressed.
//!
//! The compression is chosen by extension: `.lz4` is an LZ4 frame, `.gz` and
//! `.tgz` are gzip, anything else is a plain tar.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use pta_io::{path_is_under_base, FinalizedFile, HashReader, HashWriter, MultiReader, ProgressReader};
use serde::{Deserialize, Serialize};

use crate::error::{ArtifactError, FetchError, Result};
use crate::metadata::{load_metadata, ArtifactMetadata, METADATA_FILE};

/// Default file name of a package inside an upload directory.
pub const PACKAGE_FILE: &str = "artifact.tar.lz4";

/// Every key is optional when read; a manifest of `{}` is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageManifest {
    pub expected_sha256: Option<String>,
    /// Uncompressed size of the packaged files.
    pub total_size: u64,
    pub contents: Vec<ContentEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub path: String,
    /// Uncompressed size.
    pub size: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub idx: usize,
    pub offset: u64,
}

/// Compression of a package stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Lz4,
    Gzip,
    Plain,
}

impl Codec {
    /// Pick the codec from the extension of a path or URL.
    pub fn from_location(location: &str) -> Codec {
        let path = match url::Url::parse(location) {
            Ok(url) if url.scheme().len() >= 2 => url.path().to_string(),
            _ => location.to_string(),
        };
        if path.ends_with(".lz4") {
            Codec::Lz4
        } else if path.ends_with(".gz") || path.ends_with(".tgz") {
            Codec::Gzip
        } else {
            Codec::Plain
        }
    }
}

/// Path of the manifest for a package location.
pub fn manifest_location(location: &str) -> String {
    format!("{location}.json")
}

/// Path of one segment of a package location.
pub fn segment_location(location: &str, idx: usize) -> String {
    format!("{location}.{idx}")
}

/// Somewhere package files can be read from.
pub trait PackageSource {
    /// Open `location`. Returns `Ok(None)` if it does not exist.
    fn open(&self, location: &str) -> std::result::Result<Option<Box<dyn Read + Send>>, FetchError>;
}

/// Read the manifest next to `location`, if there is one.
///
/// A manifest that cannot be fetched (an HTTP error status, a transport or
/// I/O failure) counts as absent. One that is fetched but does not parse is
/// an error.
pub fn read_manifest(
    source: &dyn PackageSource,
    location: &str,
) -> std::result::Result<Option<PackageManifest>, FetchError> {
    let manifest_at = manifest_location(location);
    let reader = match source.open(&manifest_at) {
        Ok(Some(reader)) => reader,
        Ok(None) => return Ok(None),
        Err(e @ (FetchError::Status { .. } | FetchError::Http(_) | FetchError::Io(_))) => {
            tracing::debug!(manifest = %manifest_at, error = %e, "package manifest unavailable");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let manifest = serde_json::from_reader(reader).map_err(|e| FetchError::Package {
        detail: format!("unreadable manifest {manifest_at}: {e}"),
    })?;
    Ok(Some(manifest))
}

/// Download, verify, and extract the package at `location` into `dest`.
///
/// The digest is taken from `expected_sha256`, or from the package manifest
/// when the caller has none. Both present and different is an integrity
/// failure before any package bytes are read. The whole stream is hashed,
/// including bytes past the end of the archive.
pub fn unpack_package(
    source: &dyn PackageSource,
    location: &str,
    expected_sha256: Option<&str>,
    dest: &Path,
    progress: bool,
) -> std::result::Result<(), FetchError> {
    let manifest = read_manifest(source, location)?;
    let expected = reconcile_digest(expected_sha256, manifest.as_ref())?;
    let total = manifest.as_ref().map(|m| m.total_size);

    let raw: Box<dyn Read + '_> = match manifest.as_ref().and_then(|m| m.segments.as_ref()) {
        Some(segments) => {
            tracing::debug!(location, segments = segments.len(), "reading segmented package");
            let locations: Vec<String> = segments
                .iter()
                .map(|s| segment_location(location, s.idx))
                .collect();
            Box::new(MultiReader::new(SegmentOpener {
                source,
                locations: locations.into_iter(),
            }))
        }
        None => source.open(location)?.ok_or_else(|| FetchError::NotFound {
            location: location.to_string(),
        })?,
    };

    let mut hashed = match &expected {
        Some(digest) => HashReader::verifying(raw, digest.clone()),
        None => HashReader::new(raw),
    };

    let extracted = {
        let decoded: Box<dyn Read + '_> = match Codec::from_location(location) {
            Codec::Lz4 => Box::new(FrameDecoder::new(&mut hashed)),
            Codec::Gzip => Box::new(GzDecoder::new(&mut hashed)),
            Codec::Plain => Box::new(&mut hashed),
        };
        let mut counted = ProgressReader::new(decoded, location, total);
        if !progress {
            counted = counted.quiet();
        }
        let mut archive = tar::Archive::new(counted);
        extract(&mut archive, dest)
    };
    if let Err(e) = extracted {
        // A corrupt stream is reported as a digest mismatch when one is known.
        if expected.is_some() && io::copy(&mut hashed, &mut io::sink()).is_ok() {
            hashed.close()?;
        }
        return Err(e.into());
    }
    // Whatever the decoder left unread still counts towards the digest.
    io::copy(&mut hashed, &mut io::sink())?;

    let digest = hashed.hexdigest();
    hashed.close()?;
    tracing::debug!(location, sha256 = %digest, "package verified");
    Ok(())
}

struct SegmentOpener<'a> {
    source: &'a dyn PackageSource,
    locations: std::vec::IntoIter<String>,
}

impl Iterator for SegmentOpener<'_> {
    type Item = io::Result<Box<dyn Read + Send>>;

    fn next(&mut self) -> Option<Self::Item> {
        let location = self.locations.next()?;
        tracing::debug!(segment = %location, "opening segment");
        Some(match self.source.open(&location) {
            Ok(Some(reader)) => Ok(reader),
            Ok(None) => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("package segment {location} not found"),
            )),
            Err(e) => Err(io::Error::other(e)),
        })
    }
}

fn reconcile_digest(
    caller: Option<&str>,
    manifest: Option<&PackageManifest>,
) -> std::result::Result<Option<String>, FetchError> {
    let from_manifest = manifest
        .and_then(|m| m.expected_sha256.as_deref())
        .filter(|d| !d.is_empty());
    match (caller, from_manifest) {
        (Some(c), Some(m)) if !c.eq_ignore_ascii_case(m) => Err(pta_io::IntegrityError {
            expected: c.to_string(),
            actual: m.to_string(),
        }
        .into()),
        (Some(c), _) => Ok(Some(c.to_string())),
        (None, m) => Ok(m.map(str::to_string)),
    }
}

fn extract<R: Read>(archive: &mut tar::Archive<R>, dest: &Path) -> io::Result<()> {
    archive.set_preserve_permissions(false);
    archive.set_preserve_mtime(false);
    archive.set_unpack_xattrs(false);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        let path = entry.path()?.into_owned();

        if !(kind.is_file() || kind.is_dir()) {
            tracing::warn!(member = %path.display(), kind = ?kind, "skipping archive member that is not a file or directory");
            continue;
        }
        if !path_is_under_base(&path, dest) {
            tracing::warn!(member = %path.display(), "skipping archive member outside the extraction root");
            continue;
        }

        tracing::debug!(member = %path.display(), "extracting");
        if !entry.unpack_in(dest)? {
            tracing::warn!(member = %path.display(), "archive member rejected during extraction");
        }
    }
    Ok(())
}

/// Options for [`build_package`].
#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
    /// Where to write the package; the manifest goes to `<path>.json`. The
    /// extension picks the compression.
    pub package_path: PathBuf,
    /// Start a new segment once the current one holds this many bytes.
    /// Segments may end in the middle of a file.
    pub max_file_size: Option<u64>,
    /// Written as `pt_meta.json` when the directory has no descriptor.
    pub metadata: Option<ArtifactMetadata>,
}

/// Package the artifact directory `dir`.
///
/// Entries are written in sorted order with zeroed timestamps, so the same
/// tree always produces the same bytes. Every output file is published
/// atomically once the whole package has been written.
pub fn build_package(dir: &Path, options: &PackageOptions) -> Result<PackageManifest> {
    if !dir.is_dir() {
        return Err(ArtifactError::NotFound {
            path: dir.to_path_buf(),
        });
    }

    let existing = load_metadata(dir)?;
    let synthesized = match (&existing, &options.metadata) {
        (None, Some(meta)) if meta.kind().is_some() => Some(serde_json::to_vec(meta)?),
        _ => None,
    };
    let entries = collect_entries(dir)?;

    let package_path = &options.package_path;
    let codec = Codec::from_location(&package_path.to_string_lossy());
    let sink = SegmentedWriter::create(package_path, options.max_file_size)?;
    let mut tar = tar::Builder::new(Encoder::new(codec, sink));

    let mut contents = Vec::new();
    if let Some(bytes) = &synthesized {
        let offset = checkpoint(&mut tar)?;
        append_file(&mut tar, Path::new(METADATA_FILE), bytes.len() as u64, &bytes[..])?;
        contents.push(ContentEntry {
            path: METADATA_FILE.to_string(),
            size: bytes.len() as u64,
            offset,
        });
    }

    for (relative, is_dir) in &entries {
        if *is_dir {
            append_dir(&mut tar, relative)?;
            continue;
        }
        let offset = checkpoint(&mut tar)?;
        let file = fs::File::open(dir.join(relative))?;
        let size = file.metadata()?.len();
        append_file(&mut tar, relative, size, file)?;
        contents.push(ContentEntry {
            path: tar_path(relative),
            size,
            offset,
        });
    }

    let written = tar.into_inner()?.finish()?.finish()?;
    let manifest = PackageManifest {
        expected_sha256: Some(written.sha256),
        total_size: contents.iter().map(|c| c.size).sum(),
        contents,
        segments: written.segments,
    };
    let published = written.files.len();
    publish_segments(package_path, written.files)?;

    let mut out = pta_io::finalized_open(manifest_location(&package_path.to_string_lossy()))?;
    serde_json::to_writer(&mut out, &manifest)?;
    out.finalize()?;

    tracing::info!(
        package = %package_path.display(),
        files = manifest.contents.len(),
        segments = published,
        size = %pta_io::human_bytes(written.size as f64),
        "package built"
    );
    Ok(manifest)
}

type PackageWriter = tar::Builder<Encoder<SegmentedWriter>>;

/// Flush the compressor so the next member starts at a fresh position in
/// the compressed stream, and return that position.
fn checkpoint(tar: &mut PackageWriter) -> io::Result<u64> {
    let encoder = tar.get_mut();
    encoder.flush()?;
    Ok(encoder.get_ref().bytes_written())
}

/// The compressor in front of the package files.
enum Encoder<W: Write> {
    Lz4(FrameEncoder<W>),
    Gzip(GzEncoder<W>),
    Plain(W),
}

impl<W: Write> Encoder<W> {
    fn new(codec: Codec, inner: W) -> Self {
        match codec {
            Codec::Lz4 => Encoder::Lz4(FrameEncoder::new(inner)),
            Codec::Gzip => Encoder::Gzip(GzEncoder::new(inner, Compression::default())),
            Codec::Plain => Encoder::Plain(inner),
        }
    }

    fn get_ref(&self) -> &W {
        match self {
            Encoder::Lz4(e) => e.get_ref(),
            Encoder::Gzip(e) => e.get_ref(),
            Encoder::Plain(w) => w,
        }
    }

    fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Lz4(e) => e.finish().map_err(io::Error::other),
            Encoder::Gzip(e) => e.finish(),
            Encoder::Plain(w) => Ok(w),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Lz4(e) => e.write(buf),
            Encoder::Gzip(e) => e.write(buf),
            Encoder::Plain(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Lz4(e) => e.flush(),
            Encoder::Gzip(e) => e.flush(),
            Encoder::Plain(w) => w.flush(),
        }
    }
}

/// Package output split into numbered segment files.
///
/// Bytes go to `<package>.0` until it holds `max_file_size` bytes, then to
/// `<package>.1`, and so on. Cuts fall wherever the limit is reached, even
/// inside a member. The digest runs across all segments.
struct SegmentedWriter {
    package_path: PathBuf,
    max_file_size: Option<u64>,
    out: HashWriter<FinalizedFile>,
    starts: Vec<u64>,
    finished: Vec<FinalizedFile>,
}

struct WrittenPackage {
    sha256: String,
    size: u64,
    segments: Option<Vec<Segment>>,
    files: Vec<FinalizedFile>,
}

impl SegmentedWriter {
    fn create(package_path: &Path, max_file_size: Option<u64>) -> io::Result<Self> {
        let first = pta_io::finalized_open(segment_path(package_path, 0))?;
        Ok(SegmentedWriter {
            package_path: package_path.to_path_buf(),
            max_file_size: max_file_size.filter(|m| *m > 0),
            out: HashWriter::new(first),
            starts: vec![0],
            finished: Vec::new(),
        })
    }

    fn bytes_written(&self) -> u64 {
        self.out.bytes_written()
    }

    fn segment_len(&self) -> u64 {
        self.bytes_written() - self.starts.last().copied().unwrap_or(0)
    }

    fn roll(&mut self) -> io::Result<()> {
        let idx = self.starts.len();
        let offset = self.bytes_written();
        tracing::debug!(segment = idx, offset, "starting new package segment");
        self.out.flush()?;
        let next = pta_io::finalized_open(segment_path(&self.package_path, idx))?;
        self.finished.push(self.out.replace_writer(next));
        self.starts.push(offset);
        Ok(())
    }

    fn finish(mut self) -> io::Result<WrittenPackage> {
        self.out.flush()?;
        let sha256 = self.out.hexdigest();
        let size = self.out.bytes_written();
        let mut files = self.finished;
        files.push(self.out.into_inner());
        let segments = (self.starts.len() >= 2).then(|| {
            self.starts
                .iter()
                .enumerate()
                .map(|(idx, offset)| Segment { idx, offset: *offset })
                .collect()
        });
        Ok(WrittenPackage {
            sha256,
            size,
            segments,
            files,
        })
    }
}

impl Write for SegmentedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(max) = self.max_file_size else {
            return self.out.write(buf);
        };
        if buf.is_empty() {
            return Ok(0);
        }
        if self.segment_len() >= max {
            self.roll()?;
        }
        let room = usize::try_from(max - self.segment_len()).unwrap_or(usize::MAX);
        self.out.write(&buf[..buf.len().min(room)])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn segment_path(package_path: &Path, idx: usize) -> PathBuf {
    PathBuf::from(segment_location(&package_path.to_string_lossy(), idx))
}

/// Publish every segment. A single segment becomes the package itself.
fn publish_segments(package_path: &Path, files: Vec<FinalizedFile>) -> io::Result<()> {
    let count = files.len();
    for file in files {
        file.finalize()?;
    }
    if count == 1 {
        fs::rename(segment_path(package_path, 0), package_path)?;
    }
    Ok(())
}

fn append_file<W: Write>(
    tar: &mut tar::Builder<W>,
    relative: &Path,
    size: u64,
    data: impl Read,
) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(size);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    tar.append_data(&mut header, relative, data)
}

fn append_dir<W: Write>(tar: &mut tar::Builder<W>, relative: &Path) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    tar.append_data(&mut header, relative, io::empty())
}

fn tar_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Every file and directory under `root`, relative and sorted. Symlinks and
/// other special files are left out.
fn collect_entries(root: &Path) -> io::Result<Vec<(PathBuf, bool)>> {
    let mut out = Vec::new();
    let mut pending = vec![PathBuf::new()];
    while let Some(relative) = pending.pop() {
        let mut children: Vec<fs::DirEntry> =
            fs::read_dir(root.join(&relative))?.collect::<io::Result<_>>()?;
        children.sort_by_key(|e| e.file_name());
        for child in children {
            let path = relative.join(child.file_name());
            let file_type = child.file_type()?;
            if file_type.is_dir() {
                out.push((path.clone(), true));
                pending.push(path);
            } else if file_type.is_file() {
                out.push((path, false));
            }
        }
    }
    out.sort();
    Ok(out)
}

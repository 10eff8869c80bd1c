//! Atomic publication of files and directories.
//!
//! A publication guard owns a fresh temporary sibling of its destination.
//! Callers write into the temporary, then call `finalize()` to rename it into
//! place. Dropping the guard without finalizing (early return, `?`, panic)
//! deletes the temporary and leaves the destination untouched.
//!
//! The temporary always lives in the destination's parent directory, named
//! `.{name}.tmp.XXXXXX`, so the final rename stays on one filesystem.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::{NamedTempFile, TempDir};

#[cfg(unix)]
const EXDEV: i32 = 18;
#[cfg(windows)]
const EXDEV: i32 = 17; // ERROR_NOT_SAME_DEVICE

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

static SIBLING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A directory under construction, published to `dest` on [`finalize`](Self::finalize).
#[derive(Debug)]
pub struct FinalizedDir {
    tmp: TempDir,
    dest: PathBuf,
}

/// A file under construction, published to `dest` on [`finalize`](Self::finalize).
#[derive(Debug)]
pub struct FinalizedFile {
    tmp: NamedTempFile,
    dest: PathBuf,
}

/// Create a temporary directory that will be published at `dest`.
///
/// The parent of `dest` is created if it does not exist.
pub fn finalized_directory(dest: impl AsRef<Path>) -> io::Result<FinalizedDir> {
    let dest = dest.as_ref().to_path_buf();
    let (parent, name) = split_dest(&dest)?;
    fs::create_dir_all(&parent)?;
    let tmp = tempfile::Builder::new()
        .prefix(&format!(".{name}.tmp."))
        .tempdir_in(&parent)?;
    Ok(FinalizedDir { tmp, dest })
}

/// Open a temporary file that will be published at `dest`.
///
/// The parent of `dest` is created if it does not exist.
pub fn finalized_open(dest: impl AsRef<Path>) -> io::Result<FinalizedFile> {
    let dest = dest.as_ref().to_path_buf();
    let (parent, name) = split_dest(&dest)?;
    fs::create_dir_all(&parent)?;
    let tmp = tempfile::Builder::new()
        .prefix(&format!(".{name}.tmp."))
        .tempfile_in(&parent)?;
    Ok(FinalizedFile { tmp, dest })
}

/// Run `body` against a temporary directory and publish it at `dest` if the
/// body succeeds. On error the temporary is discarded and the error returned.
pub fn with_finalized_directory<T, E, F>(dest: impl AsRef<Path>, body: F) -> Result<T, E>
where
    F: FnOnce(&Path) -> Result<T, E>,
    E: From<io::Error>,
{
    let dir = finalized_directory(dest)?;
    let value = body(dir.path())?;
    dir.finalize()?;
    Ok(value)
}

/// Run `body` against a temporary file and publish it at `dest` if the body
/// succeeds. On error the temporary is discarded and the error returned.
pub fn with_finalized_file<T, E, F>(dest: impl AsRef<Path>, body: F) -> Result<T, E>
where
    F: FnOnce(&mut FinalizedFile) -> Result<T, E>,
    E: From<io::Error>,
{
    let mut file = finalized_open(dest)?;
    let value = body(&mut file)?;
    file.finalize()?;
    Ok(value)
}

impl FinalizedDir {
    /// The temporary directory to populate.
    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    /// Where the directory will be published.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Publish the directory, replacing anything already at the destination.
    pub fn finalize(self) -> io::Result<PathBuf> {
        let FinalizedDir { tmp, dest } = self;
        set_mode(tmp.path(), DIR_MODE)?;
        publish_dir(tmp.path(), &dest)?;
        // `tmp` no longer exists on disk; its drop-time cleanup is a no-op.
        drop(tmp);
        Ok(dest)
    }
}

impl FinalizedFile {
    /// Path of the temporary file.
    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    /// Where the file will be published.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn as_file(&self) -> &fs::File {
        self.tmp.as_file()
    }

    /// Flush, sync, and atomically rename the file over the destination.
    pub fn finalize(self) -> io::Result<PathBuf> {
        let FinalizedFile { mut tmp, dest } = self;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        set_mode(tmp.path(), FILE_MODE)?;
        match tmp.persist(&dest) {
            Ok(_) => Ok(dest),
            Err(err) if is_cross_device(&err.error) => {
                let staging = staging_sibling(&dest, "copy")?;
                if let Err(e) = fs::copy(err.file.path(), &staging) {
                    let _ = fs::remove_file(&staging);
                    return Err(e);
                }
                fs::rename(&staging, &dest)?;
                Ok(dest)
            }
            Err(err) => Err(err.error),
        }
    }
}

impl Write for FinalizedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tmp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tmp.flush()
    }
}

fn split_dest(dest: &Path) -> io::Result<(PathBuf, String)> {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot publish to {}: no file name", dest.display()),
            )
        })?;
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, name))
}

/// Move `src` to `dest`. An existing destination is moved aside first and
/// restored if the swap fails, so observers see either tree but never a mix.
fn publish_dir(src: &Path, dest: &Path) -> io::Result<()> {
    let displaced = if fs::symlink_metadata(dest).is_ok() {
        let aside = staging_sibling(dest, "old")?;
        fs::rename(dest, &aside)?;
        Some(aside)
    } else {
        None
    };

    match rename_or_copy(src, dest) {
        Ok(()) => {
            if let Some(old) = displaced {
                if let Err(e) = remove_tree(&old) {
                    tracing::warn!(path = %old.display(), error = %e, "failed to remove replaced directory");
                }
            }
            Ok(())
        }
        Err(e) => {
            if let Some(old) = displaced {
                let _ = fs::rename(&old, dest);
            }
            Err(e)
        }
    }
}

fn rename_or_copy(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            tracing::debug!(
                src = %src.display(),
                dest = %dest.display(),
                "rename crosses filesystems, copying"
            );
            let staging = staging_sibling(dest, "copy")?;
            if let Err(e) = copy_tree(src, &staging) {
                let _ = remove_tree(&staging);
                return Err(e);
            }
            fs::rename(&staging, dest)?;
            remove_tree(src)
        }
        Err(e) => Err(e),
    }
}

#[cfg(any(unix, windows))]
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(EXDEV)
}

#[cfg(not(any(unix, windows)))]
fn is_cross_device(_err: &io::Error) -> bool {
    false
}

/// A path next to `dest` that nothing else is using.
fn staging_sibling(dest: &Path, tag: &str) -> io::Result<PathBuf> {
    let (parent, name) = split_dest(dest)?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    loop {
        let n = SIBLING_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = parent.join(format!(
            ".{name}.{tag}.{}.{nanos:x}.{n}",
            std::process::id()
        ));
        if fs::symlink_metadata(&candidate).is_err() {
            return Ok(candidate);
        }
    }
}

/// Recursively copy a file or directory.
fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    if !src.is_dir() {
        fs::copy(src, dest)?;
        return Ok(());
    }
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        copy_tree(&entry.path(), &dest.join(entry.file_name()))?;
    }
    Ok(())
}

fn remove_tree(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

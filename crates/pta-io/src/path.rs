//! Path containment checks for archive extraction.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Returns `true` if `path` resolves to `base` or somewhere beneath it.
///
/// A relative `path` is taken relative to `base` (the way archive members
/// are). Both sides are resolved the same way: symlinks are followed for
/// every prefix that exists on disk and `..` is applied to whatever has been
/// resolved so far. Containment is decided component by component, so
/// `/a/bc` is not under `/a/b` and trailing separators make no difference.
pub fn path_is_under_base(path: impl AsRef<Path>, base: impl AsRef<Path>) -> bool {
    let base = resolve(base.as_ref());
    let path = resolve(&base.join(path.as_ref()));
    path.starts_with(&base)
}

/// Make `path` absolute and resolve `.`, `..` and symlinks along the way.
fn resolve(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => {
                out.push(name);
                if let Ok(real) = fs::canonicalize(&out) {
                    out = real;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_segments_inside_base() {
        assert!(path_is_under_base("/a/b/../c", "/a"));
    }

    #[test]
    fn parent_segments_escaping_base() {
        assert!(!path_is_under_base("/a/../b", "/a"));
    }

    #[test]
    fn path_is_under_itself() {
        assert!(path_is_under_base("/a", "/a"));
        assert!(path_is_under_base("/a/", "/a"));
        assert!(path_is_under_base("/a", "/a/"));
    }

    #[test]
    fn sibling_with_shared_prefix_is_not_under() {
        assert!(!path_is_under_base("/a/bc", "/a/b"));
        assert!(!path_is_under_base("/a/b-evil/x", "/a/b/"));
    }

    #[test]
    fn relative_member_paths() {
        let base = tempfile::tempdir().unwrap();
        assert!(path_is_under_base("docs/file.txt", base.path()));
        assert!(path_is_under_base("./x/../y", base.path()));
        assert!(!path_is_under_base("../outside", base.path()));
        assert!(!path_is_under_base("x/../../outside", base.path()));
    }

    #[test]
    fn absolute_member_outside_base() {
        let base = tempfile::tempdir().unwrap();
        assert!(!path_is_under_base("/etc/passwd", base.path()));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_base() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("base");
        let outside = root.path().join("outside");
        fs::create_dir(&base).unwrap();
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, base.join("link")).unwrap();

        assert!(!path_is_under_base("link/file", &base));
        assert!(path_is_under_base("real/file", &base));
    }
}

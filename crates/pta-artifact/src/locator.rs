//! Classification of artifact locators into local paths and remote URLs.

use std::fmt;
use std::path::{Path, PathBuf};

/// A classified locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A filesystem path, used as-is.
    Local(PathBuf),
    /// Anything with a URL scheme of two or more characters.
    Remote {
        /// The scheme exactly as written; lookups are case-sensitive.
        scheme: String,
        url: String,
    },
}

impl Locator {
    /// Classify `raw`.
    ///
    /// Strings that do not parse as URLs are local paths. So are single-letter
    /// schemes, which are Windows drive letters (`C:\indexes\msmarco`).
    /// Leading and trailing spaces and control characters around a URL are
    /// dropped, the same way URL parsing ignores them.
    pub fn parse(raw: &str) -> Locator {
        match url::Url::parse(raw) {
            Ok(parsed) if parsed.scheme().len() >= 2 => {
                let url = raw.trim_matches(|c: char| c <= ' ');
                // `Url` lowercases the scheme; keep the caller's spelling
                // when it is written out contiguously.
                let scheme = match url.split_once(':') {
                    Some((written, _)) if written.eq_ignore_ascii_case(parsed.scheme()) => {
                        written.to_string()
                    }
                    _ => parsed.scheme().to_string(),
                };
                Locator::Remote {
                    scheme,
                    url: url.to_string(),
                }
            }
            _ => Locator::Local(PathBuf::from(raw)),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Locator::Remote { .. })
    }

    pub fn scheme(&self) -> Option<&str> {
        match self {
            Locator::Remote { scheme, .. } => Some(scheme),
            Locator::Local(_) => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Locator::Local(path) => Some(path),
            Locator::Remote { .. } => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Local(path) => write!(f, "{}", path.display()),
            Locator::Remote { url, .. } => f.write_str(url),
        }
    }
}

/// Convert a `file://` URL into a local path.
pub fn file_url_to_path(raw: &str) -> Option<PathBuf> {
    url::Url::parse(raw).ok()?.to_file_path().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn remote(scheme: &str, url: &str) -> Locator {
        Locator::Remote {
            scheme: scheme.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn plain_paths_are_local() {
        assert_eq!(Locator::parse("/data/idx"), Locator::Local("/data/idx".into()));
        assert_eq!(Locator::parse("idx"), Locator::Local("idx".into()));
        assert_eq!(Locator::parse("./a:b"), Locator::Local("./a:b".into()));
        assert_eq!(Locator::parse(""), Locator::Local("".into()));
    }

    #[test]
    fn drive_letters_are_local() {
        let loc = Locator::parse(r"C:\indexes\msmarco");
        assert!(!loc.is_remote());
        assert!(!Locator::parse("d:/indexes").is_remote());
    }

    #[test]
    fn schemes_are_remote() {
        assert_eq!(
            Locator::parse("https://example.org/a.tar.gz"),
            remote("https", "https://example.org/a.tar.gz")
        );
        assert_eq!(Locator::parse("hf:org/repo"), remote("hf", "hf:org/repo"));
        assert_eq!(Locator::parse("nope://x"), remote("nope", "nope://x"));
    }

    #[test]
    fn scheme_keeps_case() {
        assert_eq!(Locator::parse("HF:org/repo").scheme(), Some("HF"));
    }

    #[test]
    fn surrounding_whitespace_is_not_part_of_the_scheme() {
        assert_eq!(
            Locator::parse(" https://x/a"),
            remote("https", "https://x/a")
        );
        assert_eq!(Locator::parse("\thf:org/repo\n"), remote("hf", "hf:org/repo"));
        assert_eq!(Locator::parse("ht\ttps://x/a").scheme(), Some("https"));
    }

    #[test]
    fn file_urls() {
        assert_eq!(
            file_url_to_path("file:///tmp/pkg/artifact.tar.gz"),
            Some(PathBuf::from("/tmp/pkg/artifact.tar.gz"))
        );
        assert_eq!(file_url_to_path("https://example.org/x"), None);
    }

    proptest! {
        #[test]
        fn strings_without_colon_are_local(raw in "[^:]*") {
            prop_assert_eq!(Locator::parse(&raw), Locator::Local(PathBuf::from(&raw)));
        }

        #[test]
        fn scheme_is_a_prefix(scheme in "[a-zA-Z][a-zA-Z0-9+.-]{1,8}", rest in "[a-z/]{0,12}") {
            let raw = format!("{scheme}:{rest}");
            let loc = Locator::parse(&raw);
            if let Some(found) = loc.scheme() {
                prop_assert!(raw.starts_with(found));
                prop_assert!(found.len() >= 2);
            }
        }
    }
}

use std::path::Path;
use std::sync::Arc;

use crate::error::FetchError;
use crate::package::PACKAGE_FILE;

use super::{FetchRequest, HttpHandler, SchemeHandler};

/// Revision used when an `hf:` locator names none.
pub const DEFAULT_HF_REVISION: &str = "main";

/// Split `hf:org/repo[@revision]` into the repository id and revision.
pub fn parse_hf_locator(locator: &str) -> Option<(&str, Option<&str>)> {
    let rest = locator.strip_prefix("hf:")?;
    let (repo, revision) = match rest.split_once('@') {
        Some((repo, revision)) if !revision.is_empty() => (repo, Some(revision)),
        Some(_) => return None,
        None => (rest, None),
    };
    let (org, name) = repo.split_once('/')?;
    if org.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((repo, revision))
}

/// Fetches packages from a Hugging Face dataset repository.
///
/// `hf:org/repo@v2` downloads
/// `{endpoint}/datasets/org/repo/resolve/v2/artifact.tar.lz4` over HTTP.
#[derive(Debug, Clone)]
pub struct HfHandler {
    endpoint: String,
    http: Arc<HttpHandler>,
}

impl HfHandler {
    pub fn new(endpoint: String, http: Arc<HttpHandler>) -> Self {
        HfHandler {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http,
        }
    }

    /// The download URL for an `hf:` locator.
    pub fn package_url(&self, locator: &str) -> Result<String, FetchError> {
        let (repo, revision) = parse_hf_locator(locator).ok_or_else(|| FetchError::InvalidLocator {
            locator: locator.to_string(),
            detail: "expected hf:<org>/<repo>[@<revision>]".to_string(),
        })?;
        Ok(format!(
            "{}/datasets/{repo}/resolve/{}/{PACKAGE_FILE}",
            self.endpoint,
            revision.unwrap_or(DEFAULT_HF_REVISION)
        ))
    }
}

impl SchemeHandler for HfHandler {
    fn fetch(&self, request: &FetchRequest<'_>, dest: &Path) -> Result<(), FetchError> {
        let url = self.package_url(request.locator)?;
        tracing::debug!(locator = request.locator, url = %url, "resolved Hugging Face locator");
        self.http.fetch(
            &FetchRequest {
                locator: &url,
                expected_sha256: request.expected_sha256,
            },
            dest,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn handler(endpoint: &str) -> HfHandler {
        let config = Config::with_home("/nonexistent-home".into());
        HfHandler::new(endpoint.to_string(), Arc::new(HttpHandler::new(&config).unwrap()))
    }

    #[test]
    fn parse_locators() {
        assert_eq!(parse_hf_locator("hf:org/repo"), Some(("org/repo", None)));
        assert_eq!(parse_hf_locator("hf:org/repo@v2"), Some(("org/repo", Some("v2"))));
        assert_eq!(parse_hf_locator("hf:repo"), None);
        assert_eq!(parse_hf_locator("hf:org/repo@"), None);
        assert_eq!(parse_hf_locator("hf:a/b/c"), None);
        assert_eq!(parse_hf_locator("hf:/repo"), None);
        assert_eq!(parse_hf_locator("https://x/y"), None);
    }

    #[test]
    fn package_urls() {
        let hf = handler("https://huggingface.co/");
        assert_eq!(
            hf.package_url("hf:macavaney/msmarco.terrier").unwrap(),
            "https://huggingface.co/datasets/macavaney/msmarco.terrier/resolve/main/artifact.tar.lz4"
        );
        assert_eq!(
            hf.package_url("hf:org/repo@v2").unwrap(),
            "https://huggingface.co/datasets/org/repo/resolve/v2/artifact.tar.lz4"
        );
    }

    #[test]
    fn malformed_locator_fails_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let err = handler("http://127.0.0.1:9")
            .fetch(&FetchRequest::new("hf:not-a-repo"), dir.path())
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidLocator { .. }));
    }
}

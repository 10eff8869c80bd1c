use std::io::Read;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;

use crate::config::{Config, CONFIG_FILE};
use crate::error::{ArtifactError, FetchError, Result};
use crate::package::{unpack_package, PackageSource};

use super::{FetchRequest, SchemeHandler};

/// Downloads packages over `http` and `https`.
#[derive(Debug, Clone)]
pub struct HttpHandler {
    client: Client,
    progress: bool,
}

impl HttpHandler {
    pub fn new(config: &Config) -> Result<Self> {
        let user_agent = config
            .http
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("pta/{}", env!("CARGO_PKG_VERSION")));
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(config.http.timeout_secs.map(Duration::from_secs))
            .build()
            .map_err(|e| ArtifactError::Config {
                path: config.home.join(CONFIG_FILE),
                detail: format!("building HTTP client: {e}"),
            })?;
        Ok(HttpHandler {
            client,
            progress: config.progress,
        })
    }
}

impl PackageSource for HttpHandler {
    fn open(&self, location: &str) -> std::result::Result<Option<Box<dyn Read + Send>>, FetchError> {
        let response = self.client.get(location).send()?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: location.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Some(Box::new(response)))
    }
}

impl SchemeHandler for HttpHandler {
    fn fetch(&self, request: &FetchRequest<'_>, dest: &Path) -> std::result::Result<(), FetchError> {
        tracing::info!(url = request.locator, "downloading");
        unpack_package(self, request.locator, request.expected_sha256, dest, self.progress)?;
        tracing::info!(url = request.locator, "download complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_config() {
        let mut config = Config::with_home("/nonexistent-home".into());
        config.http.timeout_secs = Some(5);
        config.http.user_agent = Some("indexer/1.0".to_string());
        assert!(HttpHandler::new(&config).is_ok());
    }
}

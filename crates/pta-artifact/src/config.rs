//! Runtime configuration: cache location, Hugging Face endpoint, HTTP client.
//!
//! Sources, later ones winning:
//! 1. Built-in defaults (`~/.pyterrier`, `https://huggingface.co`)
//! 2. `<home>/artifacts.toml`, if present
//! 3. Environment: `PYTERRIER_HOME`, `HF_ENDPOINT`, `PTA_HTTP_TIMEOUT`
//!
//! Example `artifacts.toml`:
//! ```toml
//! cache_dir = "/scratch/artifacts"
//! hf_endpoint = "https://hf-mirror.example.org"
//! progress = false
//!
//! [http]
//! timeout_secs = 600
//! user_agent = "my-indexer/1.0"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ArtifactError, Result};

/// Name of the optional configuration file inside the home directory.
pub const CONFIG_FILE: &str = "artifacts.toml";

const DEFAULT_HF_ENDPOINT: &str = "https://huggingface.co";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root of all on-disk state.
    pub home: PathBuf,
    /// Where remote artifacts are materialized.
    pub cache_dir: PathBuf,
    pub hf_endpoint: String,
    pub http: HttpConfig,
    /// Emit transfer progress events.
    pub progress: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Whole-request timeout. `None` waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// On-disk form of `artifacts.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    cache_dir: Option<PathBuf>,
    #[serde(default)]
    hf_endpoint: Option<String>,
    #[serde(default)]
    http: Option<HttpConfig>,
    #[serde(default)]
    progress: Option<bool>,
}

impl Config {
    /// Defaults for a given home directory, ignoring files and environment.
    pub fn with_home(home: PathBuf) -> Self {
        Config {
            cache_dir: home.join("artifacts"),
            home,
            hf_endpoint: DEFAULT_HF_ENDPOINT.to_string(),
            http: HttpConfig::default(),
            progress: true,
        }
    }

    /// Load from the process environment and `<home>/artifacts.toml`.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let home = match lookup("PYTERRIER_HOME").filter(|h| !h.is_empty()) {
            Some(home) => PathBuf::from(home),
            None => lookup("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(".pyterrier"),
        };

        let mut config = Config::with_home(home);
        let path = config.home.join(CONFIG_FILE);
        if path.is_file() {
            config.apply_file(&path)?;
        }

        if let Some(endpoint) = lookup("HF_ENDPOINT").filter(|e| !e.is_empty()) {
            config.hf_endpoint = endpoint;
        }
        if let Some(timeout) = lookup("PTA_HTTP_TIMEOUT") {
            let secs = timeout.trim().parse().map_err(|e| ArtifactError::Config {
                path: PathBuf::from("$PTA_HTTP_TIMEOUT"),
                detail: format!("'{timeout}' is not a number of seconds: {e}"),
            })?;
            config.http.timeout_secs = Some(secs);
        }
        tracing::debug!(home = %config.home.display(), cache = %config.cache_dir.display(), "configuration loaded");
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| ArtifactError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let file: ConfigFile = toml::from_str(&content).map_err(|e| ArtifactError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

        if let Some(cache_dir) = file.cache_dir {
            // Relative cache paths are taken from the home directory.
            self.cache_dir = self.home.join(cache_dir);
        }
        if let Some(endpoint) = file.hf_endpoint {
            self.hf_endpoint = endpoint;
        }
        if let Some(http) = file.http {
            self.http = http;
        }
        if let Some(progress) = file.progress {
            self.progress = progress;
        }
        Ok(())
    }
}

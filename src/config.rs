//! Configuration for the review-target tool.
//!
//! Read from `~/.reviewtarget/config.json` (or the file given with
//! `--config`), then overridden by `REVIEWTARGET_*` environment variables.
//! Missing keys take the defaults of the host plugin.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_URL: &str = "REVIEWTARGET_URL";
pub const ENV_USER: &str = "REVIEWTARGET_USER";
pub const ENV_HTTP_PASSWORD: &str = "REVIEWTARGET_HTTP_PASSWORD";
pub const ENV_FOLLOW_BRANCH: &str = "REVIEWTARGET_FOLLOW_BRANCH";
pub const ENV_REVIEW_BRANCH: &str = "REVIEWTARGET_REVIEW_BRANCH";
pub const ENV_TIMEOUT_SECS: &str = "REVIEWTARGET_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Base URL of the review server, e.g. `https://review.example.com/`
    pub server_url: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub http_password: Option<String>,
    /// Branch whose tip is offered as the next review target
    pub follow_branch: String,
    /// Branch (or `*` pattern) changes must target to be reviewable
    pub review_branch: String,
    pub review_files_footer: String,
    pub review_target_footer: String,
    /// Refs with this prefix name a version (e.g. tags)
    pub version_prefix: String,
    /// Stripped from version refs for display
    pub version_drop_prefix: String,
    /// Timeout for each dry-run or apply request
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: None,
            username: None,
            http_password: None,
            follow_branch: "refs/heads/master".to_string(),
            review_branch: "refs/heads/review".to_string(),
            review_files_footer: "Review-Files".to_string(),
            review_target_footer: "Review-Target".to_string(),
            version_prefix: "refs/tags/".to_string(),
            version_drop_prefix: "refs/tags/".to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// A zero timeout would fail every request before it is sent.
fn is_valid_timeout(secs: u64) -> bool {
    secs > 0
}

/// Default location of the configuration file.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".reviewtarget").join("config.json"))
}

impl Config {
    /// Load configuration and apply environment overrides.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No configuration file, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse configuration from {}", path.display()))?;
        if !is_valid_timeout(config.request_timeout_secs) {
            warn!(
                "Ignoring invalid requestTimeoutSecs={} in {}",
                config.request_timeout_secs,
                path.display()
            );
            config.request_timeout_secs = DEFAULT_TIMEOUT_SECS;
        }
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Override fields from a key lookup (the process environment in
    /// production). Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_URL) {
            self.server_url = Some(url);
        }
        if let Some(user) = get(ENV_USER) {
            self.username = Some(user);
        }
        if let Some(password) = get(ENV_HTTP_PASSWORD) {
            self.http_password = Some(password);
        }
        if let Some(branch) = get(ENV_FOLLOW_BRANCH) {
            self.follow_branch = branch;
        }
        if let Some(branch) = get(ENV_REVIEW_BRANCH) {
            self.review_branch = branch;
        }
        if let Some(raw) = get(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if is_valid_timeout(secs) => self.request_timeout_secs = secs,
                _ => warn!("Ignoring invalid {}={}", ENV_TIMEOUT_SECS, raw),
            }
        }
    }

    /// Server URL, or an error telling the user how to set it.
    pub fn require_server_url(&self) -> Result<&str> {
        self.server_url.as_deref().with_context(|| {
            format!(
                "No server URL configured. Set {} or add \"serverUrl\" to the config file.",
                ENV_URL
            )
        })
    }
}

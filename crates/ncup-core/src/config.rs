//! Run configuration.
//!
//! Precedence: built-in defaults, then the TOML file, then environment
//! variables. Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use semver::Version;
use serde::Deserialize;

pub const ENV_STATE_DIR: &str = "NCUP_STATE_DIR";
pub const ENV_PHP_VERSION: &str = "NCUP_PHP_VERSION";
pub const ENV_CONCURRENCY: &str = "NCUP_CONCURRENCY";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root of the per-track state files (`<state_dir>/<major>/upstream.json`).
    pub state_dir: PathBuf,
    /// Major versions to reconcile. Empty means every track found under `state_dir`.
    pub tracks: Vec<u64>,
    /// PHP version reported to the update server.
    pub php_version: Version,
    pub update_server_url: String,
    /// App index URL template; `{version}` is replaced by the platform version.
    pub app_index_url: String,
    pub github_api_url: String,
    pub github_token: Option<String>,
    /// Concurrent artifact verifications per track.
    pub concurrency: usize,
    pub http_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub helper_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("package"),
            tracks: Vec::new(),
            php_version: Version::new(8, 2, 0),
            update_server_url: "https://updates.nextcloud.com/updater_server/".to_string(),
            app_index_url: "https://apps.nextcloud.com/api/v1/platform/{version}/apps.json"
                .to_string(),
            github_api_url: "https://api.github.com".to_string(),
            github_token: None,
            concurrency: 8,
            http_timeout_secs: 600,
            connect_timeout_secs: 30,
            helper_timeout_secs: 900,
        }
    }
}

impl Config {
    pub const DEFAULT_PATH: &str = "ncup.toml";

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse configuration")
    }

    /// Load configuration from `path` (or `ncup.toml` if present), then apply
    /// environment overrides.
    ///
    /// An explicitly given path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Self::from_toml(&text).with_context(|| format!("In {}", path.display()))?
            }
            None => match std::fs::read_to_string(Self::DEFAULT_PATH) {
                Ok(text) => Self::from_toml(&text)
                    .with_context(|| format!("In {}", Self::DEFAULT_PATH))?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
                Err(e) => {
                    return Err(e).context(format!("Failed to read {}", Self::DEFAULT_PATH));
                }
            },
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup(ENV_STATE_DIR) {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(php) = lookup(ENV_PHP_VERSION) {
            self.php_version = Version::parse(php.trim())
                .with_context(|| format!("Invalid {ENV_PHP_VERSION} '{php}'"))?;
        }
        if let Some(n) = lookup(ENV_CONCURRENCY) {
            self.concurrency = n
                .trim()
                .parse()
                .with_context(|| format!("Invalid {ENV_CONCURRENCY} '{n}'"))?;
        }
        if let Some(token) = lookup(ENV_GITHUB_TOKEN).filter(|t| !t.is_empty()) {
            self.github_token = Some(token);
        }
        Ok(())
    }

    /// The app index URL for a platform version.
    pub fn app_index_url_for(&self, platform: &Version) -> String {
        self.app_index_url.replace("{version}", &platform.to_string())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn helper_timeout(&self) -> Duration {
        Duration::from_secs(self.helper_timeout_secs)
    }

    /// Verification worker pool size, never zero.
    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_to_empty_file() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.state_dir, PathBuf::from("package"));
        assert_eq!(config.workers(), 8);
    }

    #[test]
    fn file_values_override_defaults() {
        let config = Config::from_toml(
            r#"
state_dir = "/srv/nextcloud"
tracks = [25, 26, 27]
php_version = "8.1.14"
concurrency = 2
"#,
        )
        .unwrap();
        assert_eq!(config.tracks, vec![25, 26, 27]);
        assert_eq!(config.php_version, Version::new(8, 1, 14));
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.http_timeout_secs, 600);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("statedir = \"x\"").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_STATE_DIR, "/tmp/state"),
            (ENV_PHP_VERSION, "8.3.1"),
            (ENV_CONCURRENCY, "0"),
            (ENV_GITHUB_TOKEN, "ghp_secret"),
        ]);
        let mut config = Config::from_toml("state_dir = \"from-file\"").unwrap();
        config
            .apply_env(|key| env.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.state_dir, PathBuf::from("/tmp/state"));
        assert_eq!(config.php_version, Version::new(8, 3, 1));
        assert_eq!(config.workers(), 1);
        assert_eq!(config.github_token.as_deref(), Some("ghp_secret"));
    }

    #[test]
    fn invalid_env_value_is_an_error() {
        let mut config = Config::default();
        let result = config.apply_env(|key| (key == ENV_CONCURRENCY).then(|| "many".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn index_url_template() {
        let config = Config::default();
        assert_eq!(
            config.app_index_url_for(&Version::new(25, 0, 3)),
            "https://apps.nextcloud.com/api/v1/platform/25.0.3/apps.json"
        );
    }
}

//! Configuration management with XDG paths
//!
//! ~/.config/titan/config.json      - base URL, API key, timeout (0600)
//! ~/.local/state/titan/history.json - recent prompts
//! ~/.local/state/titan/titan.log    - TUI log output

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "titan";

/// Router address used when nothing is configured
pub const DEFAULT_BASE_URL: &str = "https://api.titancraft.io";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ADMIN_PREFIX: &str = "/v1";

/// Environment overrides, applied at startup and never persisted
pub const ENV_BASE_URL: &str = "TITAN_BASE_URL";
pub const ENV_API_KEY: &str = "TITAN_API_KEY";

/// Get config directory (~/.config/titan/)
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .context("Could not determine config directory")?;
    Ok(base.join(APP_NAME))
}

/// Get state directory (~/.local/state/titan/)
pub fn state_dir() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .context("Could not determine state directory")?;
    Ok(base.join(APP_NAME))
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

/// Get history file path
pub fn history_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("history.json"))
}

/// Get TUI log file path
pub fn log_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("titan.log"))
}

/// Connection settings for the router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Router base address, e.g. https://api.titancraft.io
    pub base_url: String,

    /// Sent as X-API-Key; empty means unauthenticated
    pub credential: String,

    /// Per-request timeout; 0 disables it
    pub timeout_secs: u64,

    /// Prefix for admin endpoints ("/v1" or "/admin" depending on deployment)
    pub admin_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credential: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
        }
    }
}

impl Config {
    pub fn has_credential(&self) -> bool {
        !self.credential.trim().is_empty()
    }

    /// Base address with trailing slashes removed, ready for path concatenation
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Replace base URL and/or credential; blank values are ignored
    pub fn with_overrides(mut self, base_url: Option<String>, credential: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(key) = credential.filter(|k| !k.trim().is_empty()) {
            self.credential = key.trim().to_string();
        }
        self
    }

    /// Normalize a user-entered base address; only http(s) is accepted
    pub fn check_base_url(url: &str) -> Result<String> {
        let url = url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("Base URL must start with http:// or https://");
        }
        Ok(url.to_string())
    }

    /// Build from a stored JSON record, defaulting each missing or mistyped field
    fn from_record(record: &Value) -> Self {
        let defaults = Config::default();

        let base_url = record
            .get("base_url")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or(defaults.base_url);
        let credential = record
            .get("credential")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(defaults.credential);
        let timeout_secs = record
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .unwrap_or(defaults.timeout_secs);
        let admin_prefix = record
            .get("admin_prefix")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or(defaults.admin_prefix);

        Self {
            base_url,
            credential,
            timeout_secs,
            admin_prefix,
        }
    }
}

/// Reads and writes the persisted [`Config`]
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store at the default XDG location
    pub fn open() -> Result<Self> {
        Ok(Self::at(config_path()?))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load config from disk; anything missing or unreadable falls back to defaults
    pub fn load(&self) -> Config {
        if !self.path.exists() {
            return Config::default();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", self.path, err);
                return Config::default();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(record) => Config::from_record(&record),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", self.path, err);
                Config::default()
            }
        }
    }

    /// Save config to disk with secure permissions; the credential is trimmed
    pub fn save(&self, config: &Config) -> Result<Config> {
        let stored = Config {
            credential: config.credential.trim().to_string(),
            ..config.clone()
        };

        let content = serde_json::to_string_pretty(&stored)?;
        write_atomic(&self.path, &content)?;

        tracing::debug!(path = %self.path.display(), "config saved");
        Ok(stored)
    }
}

/// Write via temp file + rename so a crash never leaves a truncated file.
/// The temp file is owner-only before any content lands in it.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = create_private(&tmp_path)
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    file.write_all(content.as_bytes())
        .and_then(|_| file.sync_all())
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// 0600 (owner read/write only) since the config holds the API key
#[cfg(unix)]
fn create_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation; a leftover temp file keeps its old bits
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    Ok(file)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::at(dir.path().join("config.json"));
        (dir, store)
    }

    #[test]
    fn test_config_default() {
        let cfg = Config::default();
        assert_eq!(cfg.base_url, "https://api.titancraft.io");
        assert!(cfg.credential.is_empty());
        assert!(!cfg.has_credential());
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.admin_prefix, "/v1");
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let (_dir, store) = store();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let (_dir, store) = store();
        let cfg = Config {
            base_url: "http://localhost:8080".into(),
            credential: "secret".into(),
            timeout_secs: 5,
            admin_prefix: "/admin".into(),
        };

        store.save(&cfg).unwrap();

        let fresh = ConfigStore::at(store.path());
        assert_eq!(fresh.load(), cfg);
    }

    #[test]
    fn test_save_trims_credential() {
        let (_dir, store) = store();
        let cfg = Config {
            credential: "  key-123 \n".into(),
            ..Default::default()
        };

        let saved = store.save(&cfg).unwrap();
        assert_eq!(saved.credential, "key-123");
        assert_eq!(store.load().credential, "key-123");
    }

    #[test]
    fn test_unparsable_file_falls_back() {
        let (_dir, store) = store();
        fs::write(store.path(), "{ not json").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn test_bad_fields_default_individually() {
        let (_dir, store) = store();
        fs::write(
            store.path(),
            r#"{"base_url": "", "credential": "k", "timeout_secs": "soon"}"#,
        )
        .unwrap();

        let cfg = store.load();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.credential, "k");
        assert_eq!(cfg.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cfg.admin_prefix, DEFAULT_ADMIN_PREFIX);
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = store();
        store.save(&Config::default()).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_temp_file_does_not_leak_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, store) = store();
        let tmp = dir.path().join(".config.json.tmp");
        fs::write(&tmp, "stale").unwrap();
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o644)).unwrap();

        let cfg = Config {
            credential: "secret".into(),
            ..Default::default()
        };
        store.save(&cfg).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!tmp.exists());
        assert_eq!(store.load(), cfg);
    }

    #[test]
    fn test_check_base_url() {
        assert_eq!(
            Config::check_base_url("  http://localhost:8080 ").unwrap(),
            "http://localhost:8080"
        );
        assert!(Config::check_base_url("localhost:8080").is_err());
        assert!(Config::check_base_url("").is_err());
    }

    #[test]
    fn test_base_strips_trailing_slashes() {
        let cfg = Config {
            base_url: "https://api.titancraft.io//".into(),
            ..Default::default()
        };
        assert_eq!(cfg.base(), "https://api.titancraft.io");
    }

    #[test]
    fn test_timeout_zero_disables() {
        let cfg = Config {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(cfg.timeout().is_none());
        assert_eq!(Config::default().timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_overrides_ignore_blank_values() {
        let cfg = Config::default().with_overrides(Some("  ".into()), Some("env-key".into()));
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.credential, "env-key");
    }
}

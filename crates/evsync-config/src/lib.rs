//! Shared configuration for the evsync CLI.
//!
//! TOML file + `EVSYNC_` environment layering, API-key resolution, the
//! optional pairing seed file, and translation to `evsync_core::SyncConfig`.
//! The CLI adds flag-aware overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use evsync_api::{DEFAULT_BASE_URL, RetryPolicy};
use evsync_core::{Cadence, LocalSettings, Pairing, SyncConfig};

/// Environment variable consulted after `api_key_env`.
pub const API_KEY_ENV: &str = "EVSYNC_API_KEY";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API key configured (set EVSYNC_API_KEY, api_key_env, or api_key)")]
    NoCredentials,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("invalid pairings file {path}: {source}")]
    Pairings {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// API key (plaintext, prefer an env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    pub base_url: String,

    /// Per-request cloud timeout in seconds.
    pub timeout: u64,

    pub daily_request_budget: u32,
    pub minimum_interval: u64,
    pub default_interval: u64,
    pub pairing_ttl: u64,
    pub rfid_refresh: u64,
    pub rfid_retry: u64,
    pub version_refresh: u64,
    pub version_retry: u64,
    pub hold_window: u64,

    /// JSON file holding pre-seeded pairings.
    pub pairings_file: Option<PathBuf>,

    pub retry: RetrySection,

    pub local: LocalSection,

    pub defaults: Defaults,

    pub pairings: Vec<Pairing>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: None,
            base_url: DEFAULT_BASE_URL.into(),
            timeout: 30,
            daily_request_budget: 1000,
            minimum_interval: 90,
            default_interval: 120,
            pairing_ttl: 900,
            rfid_refresh: 21_600,
            rfid_retry: 1800,
            version_refresh: 43_200,
            version_retry: 1800,
            hold_window: 20,
            pairings_file: None,
            retry: RetrySection::default(),
            local: LocalSection::default(),
            defaults: Defaults::default(),
            pairings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LocalSection {
    pub enabled: bool,
    pub poll_interval: u64,
    pub timeout: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub write_followup: u64,
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: 30,
            timeout: 10,
            max_attempts: 3,
            backoff_ms: 1500,
            write_followup: 5,
        }
    }
}

/// Rendering defaults for the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "evsync", "evsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("evsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Layered provider: defaults, then the TOML file, then `EVSYNC_*`.
///
/// Nested keys use a double underscore: `EVSYNC_LOCAL__ENABLED=false`.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("EVSYNC_").split("__"))
}

/// Load the config from the canonical path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from an explicit path. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment(path).extract()?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.base_url).map_err(|e| ConfigError::Validation {
            field: "base_url".into(),
            reason: format!("{e}: {}", self.base_url),
        })?;
        if self.timeout == 0 {
            return Err(ConfigError::Validation {
                field: "timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        if self.minimum_interval == 0 {
            return Err(ConfigError::Validation {
                field: "minimum_interval".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        if self.local.poll_interval == 0 {
            return Err(ConfigError::Validation {
                field: "local.poll_interval".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        Ok(())
    }

    /// Copy with the plaintext API key masked, for display.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.api_key.is_some() {
            cfg.api_key = Some("********".into());
        }
        cfg
    }
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Pairing seeds ───────────────────────────────────────────────────

/// Read a pairing seed file. A missing file is an empty roster.
pub fn load_pairings(path: &Path) -> Result<Vec<Pairing>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&raw).map_err(|source| ConfigError::Pairings {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_pairings(path: &Path, pairings: &[Pairing]) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(pairings).map_err(|source| ConfigError::Pairings {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Default seed file location, beside `config.toml`.
pub fn default_pairings_path() -> PathBuf {
    config_path().with_file_name("pairings.json")
}

/// Inline `[[pairings]]` first, then entries from `pairings_file` whose
/// device id is not already listed.
pub fn seed_pairings(cfg: &Config) -> Result<Vec<Pairing>, ConfigError> {
    let mut seeds = cfg.pairings.clone();
    if let Some(ref path) = cfg.pairings_file {
        for pairing in load_pairings(path)? {
            if !seeds.iter().any(|p| p.device_id == pairing.device_id) {
                seeds.push(pairing);
            }
        }
    }
    Ok(seeds)
}

// ── Credential resolution (without CLI flags) ───────────────────────

/// Resolve the API key from the process environment and the config.
pub fn resolve_api_key(cfg: &Config) -> Result<SecretString, ConfigError> {
    resolve_api_key_with(cfg, |name| std::env::var(name).ok())
}

/// Resolve the API key with an injectable environment lookup.
///
/// Order: `api_key_env` → `EVSYNC_API_KEY` → plaintext `api_key`.
/// Empty values are skipped.
pub fn resolve_api_key_with(
    cfg: &Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    // 1. Config's api_key_env → env var lookup
    if let Some(val) = cfg.api_key_env.as_deref().and_then(|n| non_empty(lookup(n))) {
        return Ok(SecretString::from(val));
    }

    // 2. Well-known env var
    if let Some(val) = non_empty(lookup(API_KEY_ENV)) {
        return Ok(SecretString::from(val));
    }

    // 3. Plaintext in config
    if let Some(key) = non_empty(cfg.api_key.clone()) {
        return Ok(SecretString::from(key));
    }

    Err(ConfigError::NoCredentials)
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `SyncConfig` from a loaded config and a resolved key.
pub fn to_sync_config(cfg: &Config, api_key: SecretString) -> Result<SyncConfig, ConfigError> {
    cfg.validate()?;
    let secs = Duration::from_secs;

    let mut sync = SyncConfig::new(api_key);
    sync.base_url.clone_from(&cfg.base_url);
    sync.timeout = secs(cfg.timeout);
    sync.retry = RetryPolicy {
        max_attempts: cfg.retry.max_attempts.max(1),
        backoff_base: Duration::from_millis(cfg.retry.backoff_ms),
        ..RetryPolicy::default()
    };
    sync.daily_request_budget = cfg.daily_request_budget;
    sync.minimum_interval = secs(cfg.minimum_interval);
    sync.default_interval = secs(cfg.default_interval);
    sync.pairing_ttl = secs(cfg.pairing_ttl);
    sync.rfid = Cadence {
        refresh: secs(cfg.rfid_refresh),
        retry: secs(cfg.rfid_retry),
    };
    sync.version = Cadence {
        refresh: secs(cfg.version_refresh),
        retry: secs(cfg.version_retry),
    };
    sync.hold_window = secs(cfg.hold_window);
    sync.local = LocalSettings {
        enabled: cfg.local.enabled,
        poll_interval: secs(cfg.local.poll_interval),
        timeout: secs(cfg.local.timeout),
        max_attempts: cfg.local.max_attempts,
        backoff: Duration::from_millis(cfg.local.backoff_ms),
        write_followup: secs(cfg.local.write_followup),
        ..LocalSettings::default()
    };
    sync.seed_pairings = seed_pairings(cfg)?;
    Ok(sync)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn api_key_env_wins_over_everything() {
        let cfg = Config {
            api_key: Some("plain".into()),
            api_key_env: Some("MY_KEY".into()),
            ..Config::default()
        };
        let vars = [("MY_KEY", "from-named"), (API_KEY_ENV, "from-default")];
        let key = resolve_api_key_with(&cfg, lookup(&vars)).unwrap();
        assert_eq!(key.expose_secret(), "from-named");
    }

    #[test]
    fn default_env_var_beats_plaintext() {
        let cfg = Config {
            api_key: Some("plain".into()),
            api_key_env: Some("UNSET".into()),
            ..Config::default()
        };
        let vars = [(API_KEY_ENV, "from-default")];
        let key = resolve_api_key_with(&cfg, lookup(&vars)).unwrap();
        assert_eq!(key.expose_secret(), "from-default");
    }

    #[test]
    fn empty_values_fall_through() {
        let cfg = Config {
            api_key: Some("  ".into()),
            ..Config::default()
        };
        let vars = [(API_KEY_ENV, "")];
        assert!(matches!(
            resolve_api_key_with(&cfg, lookup(&vars)),
            Err(ConfigError::NoCredentials)
        ));
    }

    #[test]
    fn sync_config_carries_tunables() {
        let mut cfg = Config::default();
        cfg.local.backoff_ms = 250;
        cfg.rfid_refresh = 60;
        let sync = to_sync_config(&cfg, SecretString::from("k".to_owned())).unwrap();
        assert_eq!(sync.local.backoff, Duration::from_millis(250));
        assert_eq!(sync.rfid.refresh, Duration::from_secs(60));
        assert_eq!(sync.version.refresh, Duration::from_secs(43_200));
        assert_eq!(sync.minimum_interval, Duration::from_secs(90));
        assert_eq!(sync.retry.backoff_base, Duration::from_secs(1));
        assert!(sync.background);
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let cfg = Config {
            base_url: "not a url".into(),
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "base_url"
        ));
    }

    #[test]
    fn redaction_masks_plaintext_key() {
        let cfg = Config {
            api_key: Some("secret".into()),
            ..Config::default()
        };
        assert_eq!(cfg.redacted().api_key.as_deref(), Some("********"));
        assert_eq!(Config::default().redacted().api_key, None);
    }
}

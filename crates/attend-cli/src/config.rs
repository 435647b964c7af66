use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Client configuration: `ATTEND_*` environment variables layered over an
/// optional TOML file, layered over defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend origin (default: http://localhost:3000).
    pub api_url: String,
    /// Per-request HTTP timeout in seconds.
    pub api_timeout_secs: u64,
    /// Path to the SQLite state database.
    pub db_path: PathBuf,
    /// gpsd host:port.
    pub gpsd_addr: String,
    /// Cached coordinates younger than this are reused without a new fix.
    pub freshness_secs: u64,
    /// Lifetime of a cached office geofence.
    pub geofence_ttl_secs: u64,
}

/// Optional on-disk overrides; every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    api_url: Option<String>,
    api_timeout_secs: Option<u64>,
    db_path: Option<PathBuf>,
    gpsd_addr: Option<String>,
    freshness_secs: Option<u64>,
    geofence_ttl_secs: Option<u64>,
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let file = match config_file_path() {
            Some(path) if path.exists() => read_file(&path)?,
            _ => FileConfig::default(),
        };
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| env(key).and_then(|v| v.parse::<u64>().ok());

        let db_path = env("ATTEND_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| data_dir(&env).join("state.db"));

        Self {
            api_url: env("ATTEND_API_URL")
                .or(file.api_url)
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            api_timeout_secs: parsed("ATTEND_API_TIMEOUT_SECS")
                .or(file.api_timeout_secs)
                .unwrap_or(30),
            db_path,
            gpsd_addr: env("ATTEND_GPSD_ADDR")
                .or(file.gpsd_addr)
                .unwrap_or_else(|| attend_platform::DEFAULT_GPSD_ADDR.to_string()),
            freshness_secs: parsed("ATTEND_FRESHNESS_SECS")
                .or(file.freshness_secs)
                .unwrap_or(120),
            geofence_ttl_secs: parsed("ATTEND_GEOFENCE_TTL_SECS")
                .or(file.geofence_ttl_secs)
                .unwrap_or(3600),
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ATTEND_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;
    Some(base.join("attend/config.toml"))
}

fn data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("attend")
}

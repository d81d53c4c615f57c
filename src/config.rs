use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::date::TimeZone;
use crate::logging::{LogFormat, LogLevel};
use crate::store::DEFAULT_DB_PATH;

pub const CONFIG_ENV: &str = "SERVICELOG_CONFIG";
pub const DB_ENV: &str = "SERVICELOG_DB";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/servicelog/servicelog.toml";

/// Settings read from `servicelog.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database: Option<PathBuf>,
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
    pub log_path: Option<String>,
    pub no_color: Option<bool>,
    pub time_zone: Option<TimeZone>,
}

impl AppConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid servicelog configuration")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Load the configuration. A file named on the command line or in
/// `$SERVICELOG_CONFIG` must exist; the system-wide default may be absent.
pub fn load(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(p) = explicit { return AppConfig::from_file(p); }
    if let Some(p) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) { return AppConfig::from_file(Path::new(&p)); }
    let def = Path::new(DEFAULT_CONFIG_PATH);
    if def.exists() { AppConfig::from_file(def) } else { Ok(AppConfig::default()) }
}

/// `--db`, then `$SERVICELOG_DB`, then the config file, then the default.
pub fn resolve_db_path(cli: Option<&Path>, env: Option<&Path>, cfg: &AppConfig) -> PathBuf {
    if let Some(p) = cli { return p.to_path_buf(); }
    if let Some(p) = env && !p.as_os_str().is_empty() { return p.to_path_buf(); }
    if let Some(p) = cfg.database.as_ref() { return p.clone(); }
    PathBuf::from(DEFAULT_DB_PATH)
}

pub fn db_path_from_env() -> Option<PathBuf> { std::env::var_os(DB_ENV).map(PathBuf::from) }

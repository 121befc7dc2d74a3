// ⚙️ Configuration - TOML file with environment overrides
//
// Resolution order:
//   1. file named by PDN_MONITOR_CONFIG
//   2. ./pdn-monitor.toml if it exists
//   3. built-in defaults
// then PDN_MONITOR_DB / PDN_MONITOR_BIND override single fields.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "PDN_MONITOR_CONFIG";
pub const DB_ENV: &str = "PDN_MONITOR_DB";
pub const BIND_ENV: &str = "PDN_MONITOR_BIND";
pub const DEFAULT_CONFIG_FILE: &str = "pdn-monitor.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// SQLite file holding system_catalog and execution_records
    pub database_path: PathBuf,

    pub bind_addr: String,

    /// Budget for capturing one snapshot
    pub query_timeout_secs: u64,

    pub default_ranking_limit: usize,
    pub max_ranking_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            database_path: PathBuf::from("monitoreo_pdn.db"),
            bind_addr: "0.0.0.0:8000".to_string(),
            query_timeout_secs: 10,
            default_ranking_limit: crate::ranking::DEFAULT_RANKING_LIMIT,
            max_ranking_limit: 100,
        }
    }
}

impl MonitorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: MonitorConfig = toml::from_str(raw).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Resolve configuration from the environment (see module header)
    pub fn load() -> Result<Self> {
        let config = match env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from_path(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_from_path(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => MonitorConfig::default(),
        };

        let config = config.with_overrides(env::var(DB_ENV).ok(), env::var(BIND_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn with_overrides(mut self, database_path: Option<String>, bind_addr: Option<String>) -> Self {
        if let Some(path) = database_path.filter(|p| !p.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(addr) = bind_addr.filter(|a| !a.is_empty()) {
            self.bind_addr = addr;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.query_timeout_secs == 0 {
            bail!("query_timeout_secs must be positive");
        }
        if self.max_ranking_limit == 0 {
            bail!("max_ranking_limit must be positive");
        }
        if self.default_ranking_limit == 0 || self.default_ranking_limit > self.max_ranking_limit {
            bail!(
                "default_ranking_limit must be between 1 and {}",
                self.max_ranking_limit
            );
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Bring a caller-supplied ranking limit into 1..=max_ranking_limit
    pub fn clamp_ranking_limit(&self, requested: Option<i64>) -> usize {
        match requested {
            None => self.default_ranking_limit,
            Some(n) if n < 1 => 1,
            Some(n) => usize::try_from(n).map_or(self.max_ranking_limit, |n| n.min(self.max_ranking_limit)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.default_ranking_limit, 8);
        assert_eq!(config.query_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MonitorConfig::from_toml_str(
            r#"
            database_path = "/var/lib/pdn/monitor.db"
            max_ranking_limit = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/pdn/monitor.db"));
        assert_eq!(config.max_ranking_limit, 20);
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_invalid_limits_rejected() {
        assert!(MonitorConfig::from_toml_str("default_ranking_limit = 0").is_err());
        assert!(MonitorConfig::from_toml_str("default_ranking_limit = 50\nmax_ranking_limit = 10").is_err());
        assert!(MonitorConfig::from_toml_str("query_timeout_secs = 0").is_err());
        assert!(MonitorConfig::from_toml_str("query_timeout_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_overrides() {
        let config = MonitorConfig::default()
            .with_overrides(Some("other.db".to_string()), Some(String::new()));

        assert_eq!(config.database_path, PathBuf::from("other.db"));
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_clamp_ranking_limit() {
        let config = MonitorConfig::default();

        assert_eq!(config.clamp_ranking_limit(None), 8);
        assert_eq!(config.clamp_ranking_limit(Some(3)), 3);
        assert_eq!(config.clamp_ranking_limit(Some(0)), 1);
        assert_eq!(config.clamp_ranking_limit(Some(-4)), 1);
        assert_eq!(config.clamp_ranking_limit(Some(10_000)), 100);
    }
}

//! Portal configuration (`portal.toml`).
//!
//! Values are resolved in three layers: the TOML file, then `PORTAL_*`
//! environment variables (a `.env` file is honoured), then CLI flags applied
//! by the caller through [`PortalConfig::apply_overrides`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "portal.toml";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines (default)
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: pretty, json", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allow any origin. Only meant for local front-end development.
    #[serde(default)]
    pub cors_permissive: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3180
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_permissive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".portal/portal.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "ops_portal=info,tower_http=info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySection {
    /// Rows returned by the recent-activity feed.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: u32,
    /// Rows returned by per-user, per-partner and per-type feeds.
    #[serde(default = "default_feed_limit")]
    pub feed_limit: u32,
}

fn default_recent_limit() -> u32 {
    20
}

fn default_feed_limit() -> u32 {
    50
}

impl Default for ActivitySection {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            feed_limit: default_feed_limit(),
        }
    }
}

/// Contents of `portal.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub activity: ActivitySection,
}

/// CLI flags that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub cors_permissive: bool,
}

impl PortalConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse portal.toml")
    }

    /// Load the given file, or `portal.toml` in the working directory.
    /// Missing files yield the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let p = Path::new(CONFIG_FILE_NAME);
                if p.exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize portal.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Full resolution: file, then `.env` and `PORTAL_*` variables.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides. The lookup is injected so tests do not
    /// have to mutate the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PORTAL_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORTAL_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORTAL_PORT '{}'", port))?;
        }
        if let Some(path) = lookup("PORTAL_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(format) = lookup("PORTAL_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(filter) = lookup("PORTAL_LOG") {
            self.logging.filter = filter;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref host) = overrides.host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(ref path) = overrides.db_path {
            self.database.path = path.clone();
        }
        if overrides.cors_permissive {
            self.server.cors_permissive = true;
        }
    }

    /// Return human-readable warnings; an empty list means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.host.trim().is_empty() {
            warnings.push("server.host is empty".to_string());
        }
        if self.server.port == 0 {
            warnings.push("server.port is 0; the OS will pick a random port".to_string());
        }
        if self.database.path.as_os_str().is_empty() {
            warnings.push("database.path is empty".to_string());
        }
        if self.activity.recent_limit == 0 || self.activity.feed_limit == 0 {
            warnings.push("activity limits must be greater than 0".to_string());
        }
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.logging.filter) {
            warnings.push(format!(
                "Invalid logging.filter '{}': {}",
                self.logging.filter, e
            ));
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PortalConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3180);
        assert!(!config.server.cors_permissive);
        assert_eq!(config.database.path, PathBuf::from(".portal/portal.db"));
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.activity.recent_limit, 20);
        assert_eq!(config.activity.feed_limit, 50);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = PortalConfig::parse(
            r#"
            [server]
            port = 9000

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.activity.recent_limit, 20);
    }

    #[test]
    fn test_parse_rejects_unknown_format() {
        let result = PortalConfig::parse("[logging]\nformat = \"xml\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = PortalConfig::parse("[server]\nport = 9000\n").unwrap();
        let env: HashMap<&str, &str> = [
            ("PORTAL_PORT", "9100"),
            ("PORTAL_DB_PATH", "/tmp/p.db"),
            ("PORTAL_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.database.path, PathBuf::from("/tmp/p.db"));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_env_bad_port_is_error() {
        let mut config = PortalConfig::default();
        let err = config
            .apply_env(|k| (k == "PORTAL_PORT").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PORTAL_PORT"));
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = PortalConfig::default();
        config
            .apply_env(|k| (k == "PORTAL_PORT").then(|| "9100".to_string()))
            .unwrap();
        config.apply_overrides(&ConfigOverrides {
            port: Some(9200),
            cors_permissive: true,
            ..Default::default()
        });
        assert_eq!(config.server.port, 9200);
        assert!(config.server.cors_permissive);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut config = PortalConfig::default();
        config.server.host = " ".to_string();
        config.server.port = 0;
        config.activity.feed_limit = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("host")));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = PortalConfig::default();
        config.server.port = 4000;
        config.save(&path).unwrap();

        let loaded = PortalConfig::load(&path).unwrap();
        assert_eq!(loaded.server.port, 4000);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        let err = "xml".parse::<LogFormat>().unwrap_err();
        assert!(err.to_string().contains("pretty, json"));
    }
}

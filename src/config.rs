//! Configuration management for seointel.
//!
//! Settings start from defaults, are overlaid by an optional config file
//! (`seointel.toml`, `.json`, `.yaml`), then by CLI flags and environment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repository::{DbContext, DbError, DomainDefaults};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "competitor_intelligence.db";

/// Basename for config file discovery.
pub const CONFIG_BASENAME: &str = "seointel";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "SEOINTEL_DATA_DIR";

const CONFIG_EXTENSIONS: &[&str] = &["toml", "json", "yaml", "yml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    #[error("invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Crawl and persistence policy knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlPolicy {
    /// Hours before an unchanged page is snapshotted again.
    pub ttl_hours: i64,
    /// Pages per domain per UTC day; zero or less disables the check.
    pub daily_budget: i64,
    /// Share of the daily budget that raises a soft alert.
    pub budget_soft_ratio: f64,
    /// Transient failures tolerated before a frontier item fails.
    pub max_retries: i32,
    /// Retry delays in seconds, indexed by attempt.
    pub backoff_secs: Vec<u64>,
    /// Domain pause after a frontier item exhausts its retries.
    pub cooldown_secs: i64,
    pub max_redirects: usize,
    /// Smaller HTML bodies fail the size gate.
    pub min_html_bytes: usize,
    /// Suppress repeats of the same alert kind for a page within this window.
    pub alert_cooldown_hours: i64,
    pub score_drop_warning: i32,
    pub score_drop_critical: i32,
}

impl Default for CrawlPolicy {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            daily_budget: 500,
            budget_soft_ratio: 0.8,
            max_retries: 3,
            backoff_secs: vec![30, 120, 600],
            cooldown_secs: 3600,
            max_redirects: 10,
            min_html_bytes: 256,
            alert_cooldown_hours: 24,
            score_drop_warning: 15,
            score_drop_critical: 30,
        }
    }
}

impl CrawlPolicy {
    /// Starting values for a newly seen domain.
    pub fn domain_defaults(&self) -> DomainDefaults {
        DomainDefaults {
            ttl_hours: self.ttl_hours,
            daily_budget: self.daily_budget,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.budget_soft_ratio) {
            return Err(ConfigError::Invalid {
                key: "budget_soft_ratio",
                message: format!("{} is not within 0..=1", self.budget_soft_ratio),
            });
        }
        if self.score_drop_warning > self.score_drop_critical {
            return Err(ConfigError::Invalid {
                key: "score_drop_warning",
                message: "must not exceed score_drop_critical".to_string(),
            });
        }
        if self.max_retries < 0 {
            return Err(ConfigError::Invalid {
                key: "max_retries",
                message: format!("{} is negative", self.max_retries),
            });
        }
        check_window("ttl_hours", self.ttl_hours, MAX_WINDOW_HOURS)?;
        check_window("alert_cooldown_hours", self.alert_cooldown_hours, MAX_WINDOW_HOURS)?;
        check_window("cooldown_secs", self.cooldown_secs, MAX_WINDOW_SECS)?;
        if let Some(delay) = self
            .backoff_secs
            .iter()
            .find(|&&d| d > MAX_WINDOW_SECS as u64)
        {
            return Err(ConfigError::Invalid {
                key: "backoff_secs",
                message: format!("{} exceeds {}", delay, MAX_WINDOW_SECS),
            });
        }
        Ok(())
    }
}

/// Longest accepted time window, in hours (ten years).
const MAX_WINDOW_HOURS: i64 = 24 * 365 * 10;
const MAX_WINDOW_SECS: i64 = MAX_WINDOW_HOURS * 3600;

fn check_window(key: &'static str, value: i64, max: i64) -> Result<(), ConfigError> {
    if (0..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            message: format!("{} is not within 0..={}", value, max),
        })
    }
}

/// Resolved application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// User agent for HTTP requests (None = browser default).
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay between requests in milliseconds.
    pub request_delay_ms: u64,
    pub policy: CrawlPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        // Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("seointel");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            user_agent: None,
            request_timeout: 15,
            request_delay_ms: 1000,
            policy: CrawlPolicy::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Full path to the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }

    /// Open a database context for the configured database.
    pub fn create_db_context(&self) -> Result<DbContext, DbError> {
        Ok(DbContext::from_path(&self.database_path()))
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Delay between requests in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    /// Crawl policy; unspecified keys keep their defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl: Option<CrawlPolicy>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a specific file path.
    /// The format follows the file extension; anything unknown is read as JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_err = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_err("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_err("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_err("JSON", e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, if loaded from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(ref crawl) = self.crawl {
            settings.policy = crawl.clone();
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory or database file (`--target`).
    pub target: Option<PathBuf>,
}

/// Look for `seointel.{ext}` inside a directory.
fn find_config_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", CONFIG_BASENAME, ext)))
        .find(|p| p.is_file())
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Split a target into its data directory and optional database filename.
fn resolve_target(path: &Path) -> (PathBuf, Option<String>) {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        current_dir().join(path)
    };

    let is_db_file = path
        .extension()
        .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3");

    if is_db_file {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        (dir, filename)
    } else {
        (path, None)
    }
}

/// Config file discovery, in priority order: explicit path, next to the
/// target, the current directory, then the user config directory.
async fn load_config(options: &LoadOptions, target_dir: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(ref path) = options.config_path {
        return Config::load_from_path(path).await;
    }

    let mut candidates = Vec::new();
    if let Some(dir) = target_dir {
        candidates.push(dir.to_path_buf());
    }
    candidates.push(current_dir());
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(CONFIG_BASENAME));
    }

    for dir in candidates {
        if let Some(path) = find_config_in(&dir) {
            tracing::debug!("Using config file: {}", path.display());
            return Config::load_from_path(&path).await;
        }
    }

    Ok(Config::default())
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), ConfigError> {
    let target = options.target.as_deref().map(resolve_target);
    let config = load_config(&options, target.as_ref().map(|(dir, _)| dir.as_path())).await?;

    let mut settings = Settings::default();
    let base_dir = config.base_dir().unwrap_or_else(current_dir);
    config.apply_to_settings(&mut settings, &base_dir);

    // SEOINTEL_DATA_DIR overrides the config file
    if let Some(dir) = std::env::var(DATA_DIR_ENV).ok().filter(|s| !s.is_empty()) {
        tracing::debug!("Using {} from environment: {}", DATA_DIR_ENV, dir);
        settings.data_dir = config.resolve_path(&dir, &current_dir());
    }

    // --target takes precedence over everything
    if let Some((dir, filename)) = target {
        settings.data_dir = dir;
        if let Some(filename) = filename {
            settings.database_filename = filename;
        }
    }

    settings.policy.validate()?;
    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_toml_partial_policy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seointel.toml");
        std::fs::write(
            &path,
            "data_dir = \"data\"\nrequest_delay_ms = 250\n[crawl]\nttl_hours = 6\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, &config.base_dir().unwrap());

        assert_eq!(settings.data_dir, dir.path().join("data"));
        assert_eq!(settings.request_delay_ms, 250);
        assert_eq!(settings.policy.ttl_hours, 6);
        assert_eq!(settings.policy.max_retries, 3);
        assert_eq!(settings.policy.backoff_secs, vec![30, 120, 600]);
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("seointel.yaml");
        std::fs::write(&yaml, "database: other.db\nrequest_timeout: 5\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.database.as_deref(), Some("other.db"));
        assert_eq!(config.request_timeout, Some(5));

        let json = dir.path().join("seointel.json");
        std::fs::write(&json, r#"{"user_agent": "bot"}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.user_agent.as_deref(), Some("bot"));
    }

    #[tokio::test]
    async fn test_parse_error_names_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seointel.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: "TOML", .. }));
    }

    #[tokio::test]
    async fn test_target_db_file_sets_filename() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("custom.db");
        let (settings, _) = load_settings_with_options(LoadOptions {
            config_path: None,
            target: Some(db.clone()),
        })
        .await
        .unwrap();
        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.database_filename, "custom.db");
        assert_eq!(settings.database_path(), db);
    }

    #[tokio::test]
    async fn test_config_next_to_target() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("seointel.json"), r#"{"crawl": {"daily_budget": 7}}"#)
            .unwrap();
        let (settings, config) = load_settings_with_options(LoadOptions {
            config_path: None,
            target: Some(dir.path().to_path_buf()),
        })
        .await
        .unwrap();
        assert!(config.source_path.is_some());
        assert_eq!(settings.policy.daily_budget, 7);
        assert_eq!(settings.database_filename, DEFAULT_DATABASE_FILENAME);
    }

    #[test]
    fn test_policy_validation() {
        assert!(CrawlPolicy::default().validate().is_ok());
        let bad = CrawlPolicy {
            budget_soft_ratio: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = CrawlPolicy {
            score_drop_warning: 40,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_policy_windows_are_bounded() {
        let unlimited = CrawlPolicy {
            daily_budget: 0,
            ..Default::default()
        };
        assert!(unlimited.validate().is_ok());

        for bad in [
            CrawlPolicy {
                ttl_hours: i64::MAX,
                ..Default::default()
            },
            CrawlPolicy {
                alert_cooldown_hours: -1,
                ..Default::default()
            },
            CrawlPolicy {
                cooldown_secs: i64::MAX,
                ..Default::default()
            },
            CrawlPolicy {
                backoff_secs: vec![30, u64::MAX],
                ..Default::default()
            },
        ] {
            assert!(
                matches!(bad.validate(), Err(ConfigError::Invalid { .. })),
                "{:?}",
                bad
            );
        }
    }
}

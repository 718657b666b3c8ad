use chrono::Duration;
use config::{Config, ConfigError, Environment, File as ConfigFile, FileFormat};
use serde::{Deserialize, Serialize};

/// Component whose file records are aged by modification time rather than creation time.
pub const BACKUP_COMPONENT: &str = "backup";

/// Longest retention window accepted, about ten thousand years.
pub const MAX_RETENTION_DAYS: i64 = 3_650_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file holding the host platform's tables.
    pub database_path: String,
    /// Root of the content store; content objects live under `filedir/`.
    pub data_root: String,
    /// Page size for the listing commands.
    pub items_per_page: usize,
    pub cleanup: CleanupConfig,
    pub scan: ScanConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: "lms.db".to_string(),
            data_root: "./data".to_string(),
            items_per_page: 250,
            cleanup: CleanupConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

/// Retention windows and the master switch for the removal steps.
///
/// All windows are in days. Use the `Duration` accessors when computing cutoffs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// When off, only the content-expiry step runs.
    pub auto_remove: bool,
    pub backup_timeout_days: i64,
    pub draft_timeout_days: i64,
    pub logs_timeout_days: i64,
    pub component_files_days: i64,
    pub grades_days: i64,
    pub course_modules_days: i64,
    pub components: Vec<String>,
    pub optional_log_tables: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            auto_remove: false,
            backup_timeout_days: 30,
            draft_timeout_days: 30,
            logs_timeout_days: 500,
            component_files_days: 180,
            grades_days: 500,
            course_modules_days: 7,
            components: vec![
                "assignsubmission_file".to_string(),
                BACKUP_COMPONENT.to_string(),
            ],
            optional_log_tables: vec!["logstore_lanalytics_log".to_string()],
        }
    }
}

impl CleanupConfig {
    pub fn backup_timeout(&self) -> Duration {
        window(self.backup_timeout_days)
    }

    pub fn draft_timeout(&self) -> Duration {
        window(self.draft_timeout_days)
    }

    pub fn logs_timeout(&self) -> Duration {
        window(self.logs_timeout_days)
    }

    pub fn component_files_retention(&self) -> Duration {
        window(self.component_files_days)
    }

    pub fn grades_retention(&self) -> Duration {
        window(self.grades_days)
    }

    pub fn course_modules_retention(&self) -> Duration {
        window(self.course_modules_days)
    }

    /// Reject windows that are negative or too long to subtract from the current time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let windows = [
            ("backup_timeout_days", self.backup_timeout_days),
            ("draft_timeout_days", self.draft_timeout_days),
            ("logs_timeout_days", self.logs_timeout_days),
            ("component_files_days", self.component_files_days),
            ("grades_days", self.grades_days),
            ("course_modules_days", self.course_modules_days),
        ];
        for (key, days) in windows {
            if !(0..=MAX_RETENTION_DAYS).contains(&days) {
                return Err(ConfigError::Message(format!(
                    "cleanup.{} must be between 0 and {} days, got {}",
                    key, MAX_RETENTION_DAYS, days
                )));
            }
        }
        Ok(())
    }
}

/// Out-of-range values are clamped; `validate` is what rejects them.
fn window(days: i64) -> Duration {
    let days = days.clamp(0, MAX_RETENTION_DAYS);
    Duration::try_days(days).unwrap_or_else(|| Duration::days(MAX_RETENTION_DAYS))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Glob patterns, relative to the data root, the scanner never records.
    pub ignore_patterns: Vec<String>,
}

/// Load `Config.*` from the working directory if present, overlaid by
/// `CLEANUP__`-prefixed environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(environment())
        .build()?;
    checked(builder.try_deserialize::<AppConfig>()?)
}

/// Like `load_configuration`, but the named file must exist.
pub fn load_configuration_from(path: &str) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(path).required(true))
        .add_source(environment())
        .build()?;
    checked(builder.try_deserialize::<AppConfig>()?)
}

pub fn parse_toml(source: &str) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::from_str(source, FileFormat::Toml))
        .build()?;
    checked(builder.try_deserialize::<AppConfig>()?)
}

fn checked(config: AppConfig) -> Result<AppConfig, ConfigError> {
    config.cleanup.validate()?;
    Ok(config)
}

fn environment() -> Environment {
    Environment::with_prefix("CLEANUP")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

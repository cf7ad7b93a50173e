use std::fmt;
use std::path::PathBuf;

use chrono_tz::Tz;

use crate::limits::DEFAULT_RETENTION_DAYS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Runtime settings, read once at start-up from `SLOTBOOK_*` variables.
/// The bot token is read by teloxide itself from `TELOXIDE_TOKEN`.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub tz: Tz,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub retention_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            tz: chrono_tz::Europe::Moscow,
            metrics_port: None,
            compact_threshold: 1000,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Unset variables fall back to defaults; set but unparsable ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = lookup("SLOTBOOK_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(tz) = parsed::<Tz>(&lookup, "SLOTBOOK_TZ")? {
            config.tz = tz;
        }
        config.metrics_port = parsed::<u16>(&lookup, "SLOTBOOK_METRICS_PORT")?;
        if let Some(n) = parsed::<u64>(&lookup, "SLOTBOOK_COMPACT_THRESHOLD")? {
            config.compact_threshold = n;
        }
        if let Some(days) = parsed::<i64>(&lookup, "SLOTBOOK_RETENTION_DAYS")? {
            if days < 0 {
                return Err(ConfigError::Invalid {
                    var: "SLOTBOOK_RETENTION_DAYS",
                    value: days.to_string(),
                });
            }
            config.retention_days = days;
        }
        Ok(config)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

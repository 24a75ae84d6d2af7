//! Process configuration, read from the environment (and from a `.env` file if present).
//!
//! The bot token is not part of it: teloxide reads `TELOXIDE_TOKEN` itself.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use log::LevelFilter;

const DATABASE_PATH: &str = "KITTY_DATABASE_PATH";
const LOG_DIR: &str = "KITTY_LOG_DIR";
const LOG_LEVEL: &str = "KITTY_LOG_LEVEL";
const HISTORY_LIMIT: &str = "KITTY_HISTORY_LIMIT";
const CONFIRMATION_TIMEOUT_SECS: &str = "KITTY_CONFIRMATION_TIMEOUT_SECS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: LevelFilter,
    /// How many transactions `/history` shows.
    pub history_limit: usize,
    /// How long a typed amount waits for confirmation.
    pub confirmation_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("kitty.db"),
            log_dir: PathBuf::from("log"),
            log_level: LevelFilter::Info,
            history_limit: 50,
            confirmation_timeout: Duration::minutes(5),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        // A missing .env file is fine: variables can be set externally.
        dotenvy::dotenv().ok();
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key-value source. Unset keys take their default.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(path) = lookup(DATABASE_PATH) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(LOG_DIR) {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(LOG_LEVEL) {
            config.log_level = parse_value(LOG_LEVEL, &level)?;
        }
        if let Some(limit) = lookup(HISTORY_LIMIT) {
            config.history_limit = parse_value(HISTORY_LIMIT, &limit)?;
            if config.history_limit == 0 {
                anyhow::bail!("{HISTORY_LIMIT} must be at least 1");
            }
        }
        if let Some(timeout) = lookup(CONFIRMATION_TIMEOUT_SECS) {
            let seconds: u32 = parse_value(CONFIRMATION_TIMEOUT_SECS, &timeout)?;
            if seconds == 0 {
                anyhow::bail!("{CONFIRMATION_TIMEOUT_SECS} must be at least 1");
            }
            config.confirmation_timeout = Duration::seconds(seconds.into());
        }

        Ok(config)
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("kitty.log")
    }

    /// Pattern of the rotated log files, as expected by log4rs.
    pub fn log_file_pattern(&self) -> PathBuf {
        self.log_dir.join("kitty.{}.log")
    }
}

fn parse_value<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value `{value}` for {key}: {e}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).expect("test");
        assert_eq!(config, Config::default());
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.confirmation_timeout, Duration::seconds(300));
        assert_eq!(config.log_file(), PathBuf::from("log/kitty.log"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            (DATABASE_PATH, "/var/lib/kitty/kitty.db"),
            (LOG_DIR, "/var/log/kitty"),
            (LOG_LEVEL, "debug"),
            (HISTORY_LIMIT, "20"),
            (CONFIRMATION_TIMEOUT_SECS, "60"),
        ])
        .expect("test");

        assert_eq!(config.database_path, PathBuf::from("/var/lib/kitty/kitty.db"));
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.confirmation_timeout, Duration::minutes(1));
        assert_eq!(
            config.log_file_pattern(),
            PathBuf::from("/var/log/kitty/kitty.{}.log")
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[(LOG_LEVEL, "loud")]).is_err());
        assert!(config_from(&[(HISTORY_LIMIT, "many")]).is_err());
        assert!(config_from(&[(HISTORY_LIMIT, "0")]).is_err());
        assert!(config_from(&[(CONFIRMATION_TIMEOUT_SECS, "-1")]).is_err());
        assert!(config_from(&[(CONFIRMATION_TIMEOUT_SECS, "0")]).is_err());
    }
}

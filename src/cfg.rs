use crate::utils::tracing::{LogFormat, LogLevel};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings of the synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Id of the live subscription opened by `initialize`.
    #[serde(default = "default_subscription_id")]
    pub subscription_id: String,

    /// When false, `initialize` never subscribes to live reactions.
    #[serde(default = "default_realtime_enabled")]
    pub realtime_enabled: bool,

    /// Limit on history queries. 0 means unbounded.
    #[serde(default)]
    pub history_limit: usize,

    /// Buffer of the liked-ids broadcast. Slow watchers skip snapshots.
    #[serde(default = "default_watch_capacity")]
    pub watch_capacity: usize,
}

fn default_subscription_id() -> String {
    "likes-realtime".to_string()
}

fn default_realtime_enabled() -> bool {
    true
}

fn default_watch_capacity() -> usize {
    crate::storage::DEFAULT_WATCH_CAPACITY
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            subscription_id: default_subscription_id(),
            realtime_enabled: default_realtime_enabled(),
            history_limit: 0,
            watch_capacity: default_watch_capacity(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub sync: SyncConfig,
}

impl Config {
    /// Defaults, then the TOML file at `path` if given, then `LIKESYNC_`
    /// environment variables (`__` separates nested keys).
    pub fn load(path: Option<&Path>) -> Result<Config, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("LIKESYNC_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load(None)?;
            assert_eq!(config, Config::default());
            assert_eq!(config.sync.subscription_id, "likes-realtime");
            assert!(config.sync.realtime_enabled);
            assert_eq!(config.sync.watch_capacity, 64);
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "likesync.toml",
                r#"
                log_level = "debug"
                log_format = "json"

                [sync]
                subscription_id = "my-likes"
                history_limit = 500
                "#,
            )?;
            jail.set_env("LIKESYNC_SYNC__REALTIME_ENABLED", "false");
            jail.set_env("LIKESYNC_SYNC__HISTORY_LIMIT", "100");

            let config = Config::load(Some(Path::new("likesync.toml")))?;
            assert_eq!(config.log_level, LogLevel::Debug);
            assert_eq!(config.log_format, LogFormat::Json);
            assert_eq!(config.sync.subscription_id, "my-likes");
            assert!(!config.sync.realtime_enabled);
            assert_eq!(config.sync.history_limit, 100);
            assert_eq!(config.sync.watch_capacity, 64);
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load(Some(Path::new("nowhere.toml")))?;
            assert_eq!(config.sync, SyncConfig::default());
            Ok(())
        });
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level TOML configuration.
///
/// Every section and field has a default, so an empty file (or no file at
/// all) yields a working replay-provider setup writing to the default store
/// location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreSection,
    pub provider: ProviderSection,
    pub telegram: Option<TelegramSection>,
    pub sync: SyncSection,
    pub calendar: CalendarSection,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(raw.as_str()).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the configuration: an explicit path first, then the
    /// `BARCRAWL_CONFIG` environment variable, then `barcrawl.toml` in the
    /// working directory, and finally the built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Ok(env_path) = std::env::var("BARCRAWL_CONFIG") {
            return Self::load(Path::new(env_path.as_str()));
        }
        let default = Path::new("barcrawl.toml");
        if default.exists() {
            return Self::load(default);
        }
        Ok(Self::default())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    /// Database file path. Empty means the default under `$BARCRAWL_HOME`.
    pub db_path: Option<PathBuf>,
    pub max_pool_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    /// Provider kind; `replay` is the only in-process implementation.
    pub kind: String,
    /// Fixture directory for the replay provider.
    pub fixtures: Option<PathBuf>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            kind: String::from("replay"),
            fixtures: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramSection {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    /// Inter-call delay outside the busy windows, in milliseconds.
    pub normal_delay_ms: u64,
    /// Inter-call delay inside the busy windows.
    pub busy_delay_ms: u64,
    /// Windows (inclusive, HH:MM local) where the terminal is under load.
    pub busy_windows: Vec<BusyWindow>,
    /// Hourly call budget against the terminal.
    pub calls_per_hour: u32,
    /// Instruments per wave between cooldowns.
    pub wave_size: usize,
    pub cooldown_secs: u64,
    /// Concurrent in-flight instruments per phase.
    pub daily_permits: usize,
    pub intraday_permits: usize,
    pub tick_permits: usize,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    /// Local time after which the out-of-hours pass may run on weekdays.
    pub out_of_hours_after: String,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            normal_delay_ms: 500,
            busy_delay_ms: 700,
            busy_windows: vec![
                BusyWindow {
                    start: String::from("09:00"),
                    end: String::from("09:10"),
                },
                BusyWindow {
                    start: String::from("15:20"),
                    end: String::from("15:30"),
                },
            ],
            calls_per_hour: 5_000,
            wave_size: 200,
            cooldown_secs: 30,
            daily_permits: 2,
            intraday_permits: 1,
            tick_permits: 1,
            retry_attempts: 3,
            retry_base_ms: 500,
            out_of_hours_after: String::from("18:01"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusyWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalendarSection {
    pub open: String,
    pub close: String,
    /// Exchange-local UTC offset, in hours.
    pub utc_offset_hours: i8,
}

impl Default for CalendarSection {
    fn default() -> Self {
        Self {
            open: String::from("09:00"),
            close: String::from("15:30"),
            utc_offset_hours: 9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").expect("must parse");
        assert_eq!(config.provider.kind, "replay");
        assert_eq!(config.sync.normal_delay_ms, 500);
        assert_eq!(config.sync.busy_windows.len(), 2);
        assert_eq!(config.calendar.close, "15:30");
        assert!(config.telegram.is_none());
    }

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(
            r#"
[store]
db_path = "/tmp/barcrawl.duckdb"

[provider]
kind = "replay"
fixtures = "/tmp/fixtures"

[telegram]
bot_token = "123:abc"
chat_id = "42"

[sync]
busy_delay_ms = 900
wave_size = 50

[calendar]
close = "15:45"
"#,
        )
        .expect("must parse");

        assert_eq!(
            config.store.db_path.as_deref(),
            Some(Path::new("/tmp/barcrawl.duckdb"))
        );
        assert_eq!(config.sync.busy_delay_ms, 900);
        assert_eq!(config.sync.wave_size, 50);
        assert_eq!(config.sync.normal_delay_ms, 500);
        assert_eq!(config.calendar.close, "15:45");
        assert_eq!(
            config.telegram.as_ref().map(|t| t.chat_id.as_str()),
            Some("42")
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(toml::from_str::<Config>("[sync]\nspeed = 1\n").is_err());
    }
}

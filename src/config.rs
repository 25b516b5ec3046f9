//! Runtime configuration.
//!
//! [`Config::default`] gives working values for everything. Hosts override
//! them from a TOML file ([`Config::from_file`]) and from their own command
//! line. Durations are written in milliseconds:
//!
//! ```toml
//! device_name = "Living Room"
//! poll_interval_active = 1000
//! poll_interval_idle = 5000
//! auto_transfer = false
//! ```

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use url::Url;

use crate::error::{Error, Result};

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    /// Name under which the local output device announces itself.
    pub device_name: String,

    /// Volume the local output device starts with, as a ratio.
    pub initial_volume: f32,

    /// Base URL of the Web API player endpoints.
    pub api_url: Url,

    /// Poll interval while the local device is active and playing.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval_active: Duration,

    /// Poll interval in all other cases.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval_idle: Duration,

    /// Interval at which live progress is recomputed while playing.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,

    /// Delay between a successful transfer and the status refresh that
    /// follows it.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub transfer_settle: Duration,

    /// Delay between a successful remote write and the re-poll that
    /// confirms it.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub repoll_delay: Duration,

    /// Whether to pull playback onto the local device when another device
    /// starts playing.
    pub auto_transfer: bool,

    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();
        let user_agent = format!("{app_name}/{app_version} (Rust; {})", std::env::consts::OS);

        Self {
            device_name: app_name.clone(),
            app_name,
            app_version,
            initial_volume: 0.5,
            api_url: Url::parse(Self::API_URL).expect("invalid default api url"),
            poll_interval_active: Duration::from_millis(1000),
            poll_interval_idle: Duration::from_millis(5000),
            tick_interval: Duration::from_millis(50),
            transfer_settle: Duration::from_millis(500),
            repoll_delay: Duration::from_millis(750),
            auto_transfer: true,
            user_agent,
        }
    }
}

impl Config {
    const API_URL: &'static str = "https://api.spotify.com/v1/me/player";

    /// Configuration files are tiny. Refuse anything larger.
    const MAX_FILE_SIZE: u64 = 16 * 1024;

    /// Loads a configuration file, with defaults for every missing key.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is too large, does not
    /// parse, or holds values that fail [`Config::validate`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let size = fs::metadata(path)?.len();
        if size > Self::MAX_FILE_SIZE {
            return Err(Error::out_of_range(format!(
                "{} is too large ({size} bytes)",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)?;
        let config = toml::from_str::<Self>(&contents)?;
        config.validate()?;

        Ok(config)
    }

    /// Checks values that would make the core misbehave.
    ///
    /// # Errors
    ///
    /// Returns an error for zero intervals, a volume outside `0.0..=1.0` or
    /// an empty device name.
    pub fn validate(&self) -> Result<()> {
        if self.device_name.trim().is_empty() {
            return Err(Error::invalid_argument("device name must not be empty"));
        }

        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(Error::out_of_range(format!(
                "initial volume {} must be between 0.0 and 1.0",
                self.initial_volume
            )));
        }

        for (name, interval) in [
            ("poll_interval_active", self.poll_interval_active),
            ("poll_interval_idle", self.poll_interval_idle),
            ("tick_interval", self.tick_interval),
        ] {
            if interval.is_zero() {
                return Err(Error::invalid_argument(format!("{name} must not be zero")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval_active, Duration::from_secs(1));
        assert_eq!(config.poll_interval_idle, Duration::from_secs(5));
        assert_eq!(config.transfer_settle, Duration::from_millis(500));
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let config: Config = toml::from_str(
            r#"
            device_name = "Kitchen"
            poll_interval_idle = 8000
            auto_transfer = false
            "#,
        )
        .unwrap();

        assert_eq!(config.device_name, "Kitchen");
        assert_eq!(config.poll_interval_idle, Duration::from_secs(8));
        assert!(!config.auto_transfer);
        assert_eq!(config.poll_interval_active, Duration::from_secs(1));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("poll_interval = 10").is_err());
    }

    #[test]
    fn zero_tick_interval_is_invalid() {
        let config = Config {
            tick_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}

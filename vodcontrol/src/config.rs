use std::time::Duration;

use tracing::warn;
use vodconfig::Config;

use crate::bridge::DEFAULT_POLL_INTERVAL_MS;

/// Session tunables, usually read from the `player.*` configuration keys.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    /// Watcher cadence, used for polled engines and timers alike.
    pub poll_interval: Duration,
    pub loading_timeout: Duration,
    /// Delay before visible controls auto-hide.
    pub controls_timeout: Duration,
    pub auto_advance: bool,
    /// Enter picture-in-picture instead of pausing when the app goes to background.
    pub pip_on_background: bool,
    pub default_rate: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            loading_timeout: Duration::from_millis(vodconfig::DEFAULT_LOADING_TIMEOUT_MS),
            controls_timeout: Duration::from_millis(vodconfig::DEFAULT_CONTROLS_TIMEOUT_MS),
            auto_advance: vodconfig::DEFAULT_AUTO_ADVANCE,
            pip_on_background: vodconfig::DEFAULT_PIP_ON_BACKGROUND,
            default_rate: vodconfig::DEFAULT_PLAYBACK_RATE as f32,
        }
    }
}

impl SessionConfig {
    /// Reads the session settings, falling back to defaults on any bad value.
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();

        let millis = |value: anyhow::Result<u64>, fallback: Duration, key: &str| match value {
            Ok(0) => {
                warn!(key, "Zero duration in config, using default");
                fallback
            }
            Ok(ms) => Duration::from_millis(ms),
            Err(err) => {
                warn!(key, error = %err, "Invalid duration in config, using default");
                fallback
            }
        };

        let default_rate = match config.get_default_rate() {
            Ok(rate) if rate > 0.0 && rate <= 4.0 => rate as f32,
            Ok(rate) => {
                warn!(rate, "Default playback rate out of range, using 1.0");
                defaults.default_rate
            }
            Err(_) => defaults.default_rate,
        };

        Self {
            poll_interval: millis(
                config.get_poll_interval_ms(),
                defaults.poll_interval,
                "player.poll_interval_ms",
            ),
            loading_timeout: millis(
                config.get_loading_timeout_ms(),
                defaults.loading_timeout,
                "player.loading_timeout_ms",
            ),
            controls_timeout: millis(
                config.get_controls_timeout_ms(),
                defaults.controls_timeout,
                "player.controls_timeout_ms",
            ),
            auto_advance: config.get_auto_advance().unwrap_or(defaults.auto_advance),
            pip_on_background: config
                .get_pip_on_background()
                .unwrap_or(defaults.pip_on_background),
            default_rate,
        }
    }
}

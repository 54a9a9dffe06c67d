//! Status bridge between a player backend and the session.
//!
//! The bridge turns the two engine vocabularies into one [`PlaybackStatus`]
//! and detects coarse transitions (loading, ready, failed).
//!
//! ## Engines
//!
//! - Poll-only engines expose a coarse status string and times in seconds.
//!   The watcher reads them every `interval_ms` through [`read_polled_status`].
//! - Push engines call back with a full status record. The host forwards it
//!   through `PlaybackSession::on_backend_status`.
//!
//! Every observation is tagged with the URL it was made for. An observation
//! for a URL other than the attached one is stale and is dropped.

use std::time::Duration;

use serde::Deserialize;

use crate::backend::{EngineStatus, PlayerBackend, seconds_to_millis};
use crate::errors::{BackendError, FailureKind};
use crate::model::PlaybackStatus;

/// Default cadence of the bridge poll.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Strategy for monitoring backend status changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchStrategy {
    /// Poll the backend at regular intervals.
    Polling { interval_ms: u64 },
    /// Backend calls back on every status change; nothing to poll.
    Push,
}

impl Default for WatchStrategy {
    fn default() -> Self {
        WatchStrategy::Polling {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WatchStrategy {
    /// Returns the polling interval, None for push engines.
    pub fn polling_interval(&self) -> Option<Duration> {
        match self {
            WatchStrategy::Polling { interval_ms } => Some(Duration::from_millis(*interval_ms)),
            WatchStrategy::Push => None,
        }
    }

    /// Applies the configured poll cadence to engines that kept the default.
    /// An engine that asked for its own interval keeps it.
    pub fn with_configured_interval(self, configured: Duration) -> Self {
        match self {
            WatchStrategy::Polling { interval_ms } if interval_ms == DEFAULT_POLL_INTERVAL_MS => {
                WatchStrategy::Polling {
                    interval_ms: configured.as_millis() as u64,
                }
            }
            other => other,
        }
    }
}

/// One read of a poll-only engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolledStatus {
    pub status: EngineStatus,
    /// Seconds.
    pub current_time: f64,
    /// Seconds, 0 when unknown.
    pub duration: f64,
    pub playing: bool,
    pub error: Option<String>,
}

/// Status record delivered by a push engine.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushedStatus {
    pub is_loaded: bool,
    pub is_playing: bool,
    pub is_buffering: bool,
    pub position_millis: u64,
    pub duration_millis: u64,
    pub did_just_finish: bool,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawStatus {
    Polled(PolledStatus),
    Pushed(PushedStatus),
}

impl RawStatus {
    /// Coarse state used for transition detection.
    pub fn coarse(&self) -> EngineStatus {
        match self {
            RawStatus::Polled(polled) => polled.status,
            RawStatus::Pushed(pushed) => {
                if pushed.error.is_some() {
                    EngineStatus::Error
                } else if pushed.is_loaded {
                    EngineStatus::ReadyToPlay
                } else {
                    EngineStatus::Loading
                }
            }
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            RawStatus::Polled(polled) => polled.error.as_deref(),
            RawStatus::Pushed(pushed) => pushed.error.as_deref(),
        }
    }

    pub fn normalize(&self) -> PlaybackStatus {
        match self {
            RawStatus::Polled(polled) => {
                let is_loaded = polled.status == EngineStatus::ReadyToPlay;
                let position_millis = seconds_to_millis(polled.current_time);
                let duration_millis = seconds_to_millis(polled.duration);
                // Poll-only engines have no end-of-stream flag.
                let did_just_finish = is_loaded
                    && !polled.playing
                    && duration_millis > 0
                    && position_millis >= duration_millis;
                PlaybackStatus {
                    is_loaded,
                    is_playing: polled.playing,
                    is_buffering: polled.status == EngineStatus::Loading,
                    position_millis,
                    duration_millis,
                    did_just_finish,
                    error: polled.error.clone(),
                }
                .normalized()
            }
            RawStatus::Pushed(pushed) => PlaybackStatus {
                is_loaded: pushed.is_loaded,
                is_playing: pushed.is_playing,
                is_buffering: pushed.is_buffering,
                position_millis: pushed.position_millis,
                duration_millis: pushed.duration_millis,
                did_just_finish: pushed.did_just_finish,
                error: pushed.error.clone(),
            }
            .normalized(),
        }
    }
}

/// Reads one status sample from a poll-only engine.
///
/// Times are only read once the engine reports `readyToPlay`.
pub fn read_polled_status(backend: &dyn PlayerBackend) -> Result<PolledStatus, BackendError> {
    let status = backend.status()?;
    let mut polled = PolledStatus {
        status,
        ..Default::default()
    };
    match status {
        EngineStatus::ReadyToPlay => {
            polled.current_time = backend.current_time()?;
            polled.duration = backend.duration()?;
            polled.playing = backend.playing()?;
        }
        EngineStatus::Error => {
            polled.error = Some(
                backend
                    .last_error()
                    .unwrap_or_else(|| "unknown playback error".to_string()),
            );
        }
        EngineStatus::Idle | EngineStatus::Loading => {}
    }
    Ok(polled)
}

#[derive(Clone, Debug, PartialEq)]
pub enum BridgeTransition {
    Loading,
    /// `first` is true only for the first ready transition of the attached URL.
    Ready { first: bool },
    Failed { kind: FailureKind, message: String },
}

/// Outcome of one observation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BridgeTick {
    pub transition: Option<BridgeTransition>,
    /// Status to forward, None while the engine is idle or failed.
    pub status: Option<PlaybackStatus>,
}

/// Change detector for the URL currently handed to the backend.
#[derive(Clone, Debug, Default)]
pub struct StatusBridge {
    url: Option<String>,
    last_coarse: Option<EngineStatus>,
    ready_seen: bool,
}

impl StatusBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts watching a new URL, forgetting everything about the previous one.
    pub fn attach(&mut self, url: &str) {
        self.url = Some(url.to_string());
        self.last_coarse = None;
        self.ready_seen = false;
    }

    pub fn detach(&mut self) {
        self.url = None;
        self.last_coarse = None;
        self.ready_seen = false;
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_attached_to(&self, url: &str) -> bool {
        self.url.as_deref() == Some(url)
    }

    /// Processes one observation made for `url`.
    ///
    /// Returns None when the observation is stale.
    pub fn observe(&mut self, url: &str, raw: &RawStatus) -> Option<BridgeTick> {
        if !self.is_attached_to(url) {
            return None;
        }

        let coarse = raw.coarse();
        let changed = self.last_coarse != Some(coarse);
        self.last_coarse = Some(coarse);

        let transition = if changed {
            match coarse {
                EngineStatus::Loading => Some(BridgeTransition::Loading),
                EngineStatus::ReadyToPlay => {
                    let first = !self.ready_seen;
                    self.ready_seen = true;
                    Some(BridgeTransition::Ready { first })
                }
                EngineStatus::Error => {
                    let message = raw.error_message().unwrap_or_default().to_string();
                    Some(BridgeTransition::Failed {
                        kind: FailureKind::classify(&message),
                        message,
                    })
                }
                EngineStatus::Idle => None,
            }
        } else {
            None
        };

        let status = match coarse {
            EngineStatus::Loading | EngineStatus::ReadyToPlay => Some(raw.normalize()),
            EngineStatus::Idle | EngineStatus::Error => None,
        };

        Some(BridgeTick { transition, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_interval_applies_to_default_polling() {
        let configured = Duration::from_millis(250);
        assert_eq!(
            WatchStrategy::default()
                .with_configured_interval(configured)
                .polling_interval(),
            Some(configured)
        );
        assert_eq!(
            WatchStrategy::Polling { interval_ms: 100 }.with_configured_interval(configured),
            WatchStrategy::Polling { interval_ms: 100 }
        );
        assert_eq!(
            WatchStrategy::Push.with_configured_interval(configured),
            WatchStrategy::Push
        );
    }

    fn ready(time: f64, duration: f64, playing: bool) -> RawStatus {
        RawStatus::Polled(PolledStatus {
            status: EngineStatus::ReadyToPlay,
            current_time: time,
            duration,
            playing,
            error: None,
        })
    }

    fn loading() -> RawStatus {
        RawStatus::Polled(PolledStatus {
            status: EngineStatus::Loading,
            ..Default::default()
        })
    }

    #[test]
    fn test_stale_observation_is_dropped() {
        let mut bridge = StatusBridge::new();
        assert!(bridge.observe("http://a/1.m3u8", &loading()).is_none());

        bridge.attach("http://a/2.m3u8");
        assert!(bridge.observe("http://a/1.m3u8", &loading()).is_none());
        assert!(bridge.observe("http://a/2.m3u8", &loading()).is_some());
    }

    #[test]
    fn test_ready_transition_once_per_url() {
        let mut bridge = StatusBridge::new();
        bridge.attach("u");

        let tick = bridge.observe("u", &loading()).unwrap();
        assert_eq!(tick.transition, Some(BridgeTransition::Loading));

        let tick = bridge.observe("u", &ready(0.0, 100.0, false)).unwrap();
        assert_eq!(tick.transition, Some(BridgeTransition::Ready { first: true }));

        for _ in 0..10 {
            let tick = bridge.observe("u", &ready(1.0, 100.0, true)).unwrap();
            assert_eq!(tick.transition, None);
            assert!(tick.status.unwrap().is_playing);
        }

        // Rebuffering then ready again is not a first ready.
        bridge.observe("u", &loading());
        let tick = bridge.observe("u", &ready(2.0, 100.0, true)).unwrap();
        assert_eq!(tick.transition, Some(BridgeTransition::Ready { first: false }));

        // Re-attaching the same URL starts over.
        bridge.attach("u");
        let tick = bridge.observe("u", &ready(2.0, 100.0, true)).unwrap();
        assert_eq!(tick.transition, Some(BridgeTransition::Ready { first: true }));
    }

    #[test]
    fn test_error_is_classified() {
        let mut bridge = StatusBridge::new();
        bridge.attach("u");
        let raw = RawStatus::Polled(PolledStatus {
            status: EngineStatus::Error,
            error: Some("SSL handshake failed".to_string()),
            ..Default::default()
        });
        let tick = bridge.observe("u", &raw).unwrap();
        assert_eq!(
            tick.transition,
            Some(BridgeTransition::Failed {
                kind: FailureKind::Ssl,
                message: "SSL handshake failed".to_string()
            })
        );
        assert!(tick.status.is_none());
    }

    #[test]
    fn test_polled_normalization() {
        let status = ready(12.5, 100.0, true).normalize();
        assert!(status.is_loaded);
        assert_eq!(status.position_millis, 12_500);
        assert_eq!(status.duration_millis, 100_000);
        assert!(!status.did_just_finish);

        let finished = ready(100.0, 100.0, false).normalize();
        assert!(finished.did_just_finish);

        let status = loading().normalize();
        assert!(!status.is_loaded);
        assert!(status.is_buffering);
    }

    #[test]
    fn test_pushed_status_from_json() {
        let pushed: PushedStatus = serde_json::from_str(
            r#"{"isLoaded":true,"isPlaying":true,"isBuffering":false,"positionMillis":5000,"durationMillis":4000}"#,
        )
        .unwrap();
        let raw = RawStatus::Pushed(pushed);
        assert_eq!(raw.coarse(), EngineStatus::ReadyToPlay);
        let status = raw.normalize();
        assert_eq!(status.position_millis, 4000);
        assert!(!status.did_just_finish);

        let failed = RawStatus::Pushed(PushedStatus {
            error: Some("Network request failed".to_string()),
            ..Default::default()
        });
        assert_eq!(failed.coarse(), EngineStatus::Error);
    }
}

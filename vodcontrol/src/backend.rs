//! Player backend capability surface.
//!
//! Every concrete engine binding implements [`PlayerBackend`]. The session
//! only depends on these traits, never on a concrete engine type.
//!
//! Times cross this boundary in seconds, the unit engines expose; the rest of
//! the crate works in milliseconds.

use crate::bridge::WatchStrategy;
use crate::errors::BackendError;

/// Coarse status vocabulary of poll-only engines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    #[default]
    Idle,
    Loading,
    ReadyToPlay,
    Error,
}

impl EngineStatus {
    /// Parses the engine's status string; unknown values map to `Idle`.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "loading" => EngineStatus::Loading,
            "readyToPlay" => EngineStatus::ReadyToPlay,
            "error" => EngineStatus::Error,
            _ => EngineStatus::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::Idle => "idle",
            EngineStatus::Loading => "loading",
            EngineStatus::ReadyToPlay => "readyToPlay",
            EngineStatus::Error => "error",
        }
    }
}

/// Transport commands: play / pause / seek / source replacement.
pub trait TransportControl {
    fn play(&mut self) -> Result<(), BackendError>;

    fn pause(&mut self) -> Result<(), BackendError>;

    /// Seeks to an absolute position in seconds.
    fn set_current_time(&mut self, seconds: f64) -> Result<(), BackendError>;

    /// Replaces the media being played with the stream at `url`.
    fn replace_source(&mut self, url: &str) -> Result<(), BackendError>;
}

/// Position and state reads.
pub trait PlaybackPosition {
    /// Current position in seconds.
    fn current_time(&self) -> Result<f64, BackendError>;

    /// Duration in seconds, 0 when unknown.
    fn duration(&self) -> Result<f64, BackendError>;

    fn playing(&self) -> Result<bool, BackendError>;
}

pub trait RateControl {
    fn playback_rate(&self) -> Result<f32, BackendError>;

    fn set_playback_rate(&mut self, rate: f32) -> Result<(), BackendError>;
}

pub trait PlaybackStatusSource {
    fn status(&self) -> Result<EngineStatus, BackendError>;

    /// Last error message reported by the engine, if any.
    fn last_error(&self) -> Option<String> {
        None
    }
}

/// Uniform capability surface over a concrete player engine.
pub trait PlayerBackend:
    TransportControl + PlaybackPosition + RateControl + PlaybackStatusSource + Send
{
    fn name(&self) -> &str;

    /// How the session learns about status changes for this engine.
    fn watch_strategy(&self) -> WatchStrategy {
        WatchStrategy::default()
    }

    fn supports_picture_in_picture(&self) -> bool {
        false
    }

    fn enter_picture_in_picture(&mut self) -> Result<(), BackendError> {
        Err(BackendError::Unsupported("enter_picture_in_picture"))
    }
}

/// Commands the session issues to the backend after releasing its state lock.
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCommand {
    Load(String),
    Play,
    Pause,
    SeekTo { position_millis: u64 },
    SetRate(f32),
}

impl BackendCommand {
    pub fn apply(&self, backend: &mut dyn PlayerBackend) -> Result<(), BackendError> {
        match self {
            BackendCommand::Load(url) => backend.replace_source(url),
            BackendCommand::Play => backend.play(),
            BackendCommand::Pause => backend.pause(),
            BackendCommand::SeekTo { position_millis } => {
                backend.set_current_time(millis_to_seconds(*position_millis))
            }
            BackendCommand::SetRate(rate) => backend.set_playback_rate(*rate),
        }
    }
}

#[inline]
pub fn seconds_to_millis(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    }
}

#[inline]
pub fn millis_to_seconds(millis: u64) -> f64 {
    millis as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_status_parse() {
        assert_eq!(EngineStatus::parse("loading"), EngineStatus::Loading);
        assert_eq!(EngineStatus::parse("readyToPlay"), EngineStatus::ReadyToPlay);
        assert_eq!(EngineStatus::parse("error"), EngineStatus::Error);
        assert_eq!(EngineStatus::parse("idle"), EngineStatus::Idle);
        assert_eq!(EngineStatus::parse("bogus"), EngineStatus::Idle);
        assert_eq!(EngineStatus::ReadyToPlay.as_str(), "readyToPlay");
    }

    #[test]
    fn test_time_conversions() {
        assert_eq!(seconds_to_millis(1.5), 1500);
        assert_eq!(seconds_to_millis(-3.0), 0);
        assert_eq!(seconds_to_millis(f64::NAN), 0);
        assert_eq!(millis_to_seconds(45_000), 45.0);
    }
}

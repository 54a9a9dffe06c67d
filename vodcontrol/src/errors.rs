use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a playback failure, used to pick the notice
/// shown to the user and to label a terminal failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Ssl,
    Network,
    Other,
}

impl FailureKind {
    /// Classifies a raw engine error message.
    ///
    /// Engines only give us free text, so this matches the markers they are
    /// known to emit (`SSL`/`Certificate`, `Network`/`connection`).
    pub fn classify(message: &str) -> Self {
        if message.contains("SSL") || message.contains("Certificate") {
            FailureKind::Ssl
        } else if message.contains("Network") || message.contains("connection") {
            FailureKind::Network
        } else {
            FailureKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Ssl => "ssl",
            FailureKind::Network => "network",
            FailureKind::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced by the session, already translated from backend errors.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
pub enum PlaybackFailure {
    /// A load request lacked one of source, id or title. Logged only.
    #[error("load request is missing {0}")]
    InvalidRequest(&'static str),
    /// The active source failed; a fallback sweep is in progress.
    #[error("playback failed ({0}), trying another source")]
    LoadFailure(FailureKind),
    /// Loading did not complete before the watchdog fired.
    #[error("playback timed out")]
    TimeoutFailure,
    /// Every candidate source failed. Requires an explicit retry.
    #[error("playback failed on every source ({0})")]
    TerminalFailure(FailureKind),
}

impl PlaybackFailure {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackFailure::TerminalFailure(_))
    }

    /// Text for the transient notification shown to the user.
    pub fn notice(&self) -> Option<String> {
        match self {
            PlaybackFailure::InvalidRequest(_) => None,
            PlaybackFailure::LoadFailure(FailureKind::Ssl) => {
                Some("SSL certificate error, trying another source...".to_string())
            }
            PlaybackFailure::LoadFailure(FailureKind::Network) => {
                Some("Network connection failed, trying another source...".to_string())
            }
            PlaybackFailure::LoadFailure(FailureKind::Other) => {
                Some("Playback failed, trying another source...".to_string())
            }
            PlaybackFailure::TimeoutFailure => {
                Some("Playback timed out, please try again".to_string())
            }
            PlaybackFailure::TerminalFailure(_) => {
                Some("No source could play this episode".to_string())
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend operation '{0}' is not supported")]
    Unsupported(&'static str),
    #[error("Backend error: {0}")]
    Engine(String),
}

impl BackendError {
    pub fn engine(message: impl Into<String>) -> Self {
        BackendError::Engine(message.into())
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            BackendError::Unsupported(_) => FailureKind::Other,
            BackendError::Engine(message) => FailureKind::classify(message),
        }
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),
    #[error("Invalid metadata response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Metadata service base URL is not configured")]
    NotConfigured,
    #[error("No episodes for {source_id}/{id}")]
    NoEpisodes { source_id: String, id: String },
    #[error("{0}")]
    Other(String),
}

impl ResolveError {
    /// Maps a metadata failure onto the fallback taxonomy.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ResolveError::Http(err) => {
                let text = err.to_string().to_lowercase();
                if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
                    FailureKind::Ssl
                } else {
                    FailureKind::Network
                }
            }
            ResolveError::Other(message) => FailureKind::classify(message),
            ResolveError::Json(_) | ResolveError::NotConfigured | ResolveError::NoEpisodes { .. } => {
                FailureKind::Other
            }
        }
    }
}

/// Failure reported by the orientation collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Orientation lock failed: {0}")]
pub struct OrientationError(pub String);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid load request: missing {0}")]
    InvalidRequest(&'static str),
    #[error("Episode index {index} out of range ({len} episodes)")]
    EpisodeOutOfRange { index: usize, len: usize },
    #[error("Unknown source '{0}'")]
    UnknownSource(String),
    #[error("Invalid playback rate {0}")]
    InvalidRate(f32),
    #[error(transparent)]
    Orientation(#[from] OrientationError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

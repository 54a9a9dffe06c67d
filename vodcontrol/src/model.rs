use serde::{Deserialize, Serialize};

use crate::errors::{PlaybackFailure, SessionError};

/// Logical content identity, independent of any provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Title {
    pub id: String,
    pub display_title: String,
}

/// One provider's view of a title.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub source_id: String,
    pub source_name: String,
    pub title_id_at_source: String,
}

impl SourceCandidate {
    pub fn new(
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        title_id_at_source: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_name: source_name.into(),
            title_id_at_source: title_id_at_source.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub index: usize,
    pub title: String,
    pub stream_url: String,
}

/// Normalized playback status shared by every backend.
///
/// Once loaded, `position_millis` stays within `[0, duration_millis]` and
/// `is_playing` implies `is_loaded`; [`PlaybackStatus::normalized`] enforces both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub is_loaded: bool,
    pub is_playing: bool,
    pub is_buffering: bool,
    pub position_millis: u64,
    pub duration_millis: u64,
    pub did_just_finish: bool,
    pub error: Option<String>,
}

impl PlaybackStatus {
    pub fn normalized(mut self) -> Self {
        if !self.is_loaded {
            self.is_playing = false;
        }
        if self.is_loaded && self.duration_millis > 0 {
            self.position_millis = self.position_millis.min(self.duration_millis);
        }
        self
    }

    /// Position as a fraction of the duration, 0 when the duration is unknown.
    pub fn progress_ratio(&self) -> f64 {
        if !self.is_loaded || self.duration_millis == 0 {
            return 0.0;
        }
        (self.position_millis as f64 / self.duration_millis as f64).clamp(0.0, 1.0)
    }
}

/// A "watch this title, this episode" request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub source: String,
    pub id: String,
    pub title: String,
    pub episode_index: usize,
    pub position_millis: Option<u64>,
}

impl LoadRequest {
    pub fn new(source: impl Into<String>, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
            title: title.into(),
            episode_index: 0,
            position_millis: None,
        }
    }

    pub fn episode(mut self, index: usize) -> Self {
        self.episode_index = index;
        self
    }

    pub fn resume_at(mut self, position_millis: u64) -> Self {
        self.position_millis = Some(position_millis);
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.source.trim().is_empty() {
            return Err(SessionError::InvalidRequest("source"));
        }
        if self.id.trim().is_empty() {
            return Err(SessionError::InvalidRequest("id"));
        }
        if self.title.trim().is_empty() {
            return Err(SessionError::InvalidRequest("title"));
        }
        Ok(())
    }
}

/// Resume record handed to the persistence collaborator at teardown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub source: String,
    pub id: String,
    pub episode_index: usize,
    pub position_millis: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    /// A source failed and a fallback is being attempted.
    Error,
    /// Every source failed or loading timed out.
    Terminal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalFlags {
    pub episodes: bool,
    pub sources: bool,
    pub speed: bool,
}

impl ModalFlags {
    pub fn any(&self) -> bool {
        self.episodes || self.sources || self.speed
    }
}

/// What a back press did, see `PlaybackSession::handle_back`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackAction {
    ClosedEpisodeModal,
    ClosedSourceModal,
    ClosedSpeedModal,
    HidControls,
    Exit,
}

/// Observable record consumed by the UI layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub is_loading: bool,
    pub status: Option<PlaybackStatus>,
    /// Authoritative progress, or the drag position while scrubbing.
    pub progress_ratio: f64,
    /// Position to render next to the progress bar.
    pub display_position_millis: u64,
    pub is_in_pip: bool,
    pub intro_end_time: Option<u64>,
    pub outro_start_time: Option<u64>,
    pub playback_rate: f32,
    pub title: Option<Title>,
    pub source: Option<SourceCandidate>,
    pub episode_index: Option<usize>,
    pub episode_count: usize,
    pub show_controls: bool,
    pub modals: ModalFlags,
    pub failure: Option<PlaybackFailure>,
}

/// Per-field change notifications broadcast by the session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    PhaseChanged(SessionPhase),
    LoadingChanged(bool),
    StatusChanged(Option<PlaybackStatus>),
    ProgressChanged(f64),
    EpisodeChanged { index: usize, url: String },
    SourceChanged(SourceCandidate),
    PipChanged(bool),
    MarkersChanged {
        intro_end_time: Option<u64>,
        outro_start_time: Option<u64>,
    },
    RateChanged(f32),
    ControlsChanged(bool),
    ModalsChanged(ModalFlags),
    Failure(PlaybackFailure),
    /// Transient user-visible notification.
    Notice(String),
    Reset,
}

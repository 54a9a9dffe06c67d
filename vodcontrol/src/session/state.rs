//! Session state and its transitions.
//!
//! Everything here runs under the session lock and never touches the
//! backend or the resolver. Transitions record the backend commands and
//! events they need in an [`Effects`] value that the session executes once
//! the lock is released.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::backend::BackendCommand;
use crate::bridge::{BridgeTick, BridgeTransition, RawStatus, StatusBridge};
use crate::config::SessionConfig;
use crate::errors::{FailureKind, PlaybackFailure, ResolveError, SessionError};
use crate::fallback::{FallbackDecision, FallbackResolver};
use crate::model::{
    Episode, LoadRequest, ModalFlags, PlaybackStatus, ProgressRecord, SessionEvent, SessionPhase,
    SessionView, SourceCandidate, Title,
};
use crate::scrub::ScrubReconciler;
use crate::timers::{LoadWatchdog, OneShotTimer};

/// A pending optimistic seek is confirmed once the engine reports a position
/// this close to the target.
const SEEK_TOLERANCE_MS: u64 = 1000;
/// Engine reports tolerated before a pending seek is abandoned.
const SEEK_MAX_TICKS: u32 = 2;

/// Side effects produced by one transition.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub commands: Vec<BackendCommand>,
    pub events: Vec<SessionEvent>,
    /// Generation the commands belong to.
    pub generation: u64,
}

impl Effects {
    pub fn command(&mut self, command: BackendCommand) {
        self.commands.push(command);
    }

    pub fn event(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    pub fn notice(&mut self, text: impl Into<String>) {
        self.events.push(SessionEvent::Notice(text.into()));
    }
}

/// Which source to fetch the episode list from, for which generation.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LoadPlan {
    pub generation: u64,
    pub source: SourceCandidate,
    pub episode_index: usize,
}

/// Guard deciding whether a reported failure still concerns the active load.
#[derive(Clone, Debug)]
pub(crate) enum FailureGuard {
    Url(String),
    Generation(u64),
    Active,
}

/// Follow-up work the session must run after a status observation.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct Followup {
    pub failure: Option<(FailureKind, String)>,
    pub advance_from: Option<u64>,
}

/// What started a load. Only user-initiated loads get a fresh watchdog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoadOrigin {
    User,
    Fallback,
}

#[derive(Clone, Copy, Debug)]
struct PendingSeek {
    target_millis: u64,
    ticks: u32,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub generation: u64,
    config: SessionConfig,
    request: Option<LoadRequest>,
    title: Option<Title>,
    fallback: FallbackResolver,
    active_source: Option<SourceCandidate>,
    episodes: Vec<Episode>,
    episode_index: Option<usize>,
    active_url: Option<String>,
    bridge: StatusBridge,
    status: Option<PlaybackStatus>,
    is_loading: bool,
    phase: SessionPhase,
    failure: Option<PlaybackFailure>,
    resume_position: Option<u64>,
    initial_jump_done: bool,
    intro_end_time: Option<u64>,
    outro_start_time: Option<u64>,
    playback_rate: f32,
    auto_advance: bool,
    advanced: bool,
    is_in_pip: bool,
    pending_seek: Option<PendingSeek>,
    watchdog: LoadWatchdog,
    controls_timer: OneShotTimer,
    show_controls: bool,
    modals: ModalFlags,
    pub scrub: ScrubReconciler,
}

impl SessionState {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            generation: 0,
            request: None,
            title: None,
            fallback: FallbackResolver::default(),
            active_source: None,
            episodes: Vec::new(),
            episode_index: None,
            active_url: None,
            bridge: StatusBridge::new(),
            status: None,
            is_loading: false,
            phase: SessionPhase::Idle,
            failure: None,
            resume_position: None,
            initial_jump_done: false,
            intro_end_time: None,
            outro_start_time: None,
            playback_rate: config.default_rate,
            auto_advance: config.auto_advance,
            advanced: false,
            is_in_pip: false,
            pending_seek: None,
            watchdog: LoadWatchdog::new(config.loading_timeout),
            controls_timer: OneShotTimer::new(config.controls_timeout),
            show_controls: false,
            modals: ModalFlags::default(),
            scrub: ScrubReconciler::new(),
            config,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_none()
    }

    pub fn active_url(&self) -> Option<&str> {
        self.active_url.as_deref()
    }

    pub fn bridge_url(&self) -> Option<String> {
        self.bridge.url().map(str::to_string)
    }

    pub fn status(&self) -> Option<&PlaybackStatus> {
        self.status.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.is_playing)
    }

    pub fn episode_index(&self) -> Option<usize> {
        self.episode_index
    }

    pub fn has_next_episode(&self) -> bool {
        self.episode_index
            .is_some_and(|index| index + 1 < self.episodes.len())
    }

    pub fn view(&self) -> SessionView {
        let (authoritative, duration) = self
            .status
            .as_ref()
            .map(|s| (s.position_millis, s.duration_millis))
            .unwrap_or((0, 0));
        let progress_ratio = if self.scrub.is_dragging() {
            self.scrub.ratio()
        } else {
            self.status
                .as_ref()
                .map(PlaybackStatus::progress_ratio)
                .unwrap_or(0.0)
        };
        SessionView {
            phase: self.phase,
            is_loading: self.is_loading,
            status: self.status.clone(),
            progress_ratio,
            display_position_millis: self.scrub.display_position(authoritative, duration),
            is_in_pip: self.is_in_pip,
            intro_end_time: self.intro_end_time,
            outro_start_time: self.outro_start_time,
            playback_rate: self.playback_rate,
            title: self.title.clone(),
            source: self.active_source.clone(),
            episode_index: self.episode_index,
            episode_count: self.episodes.len(),
            show_controls: self.show_controls,
            modals: self.modals,
            failure: self.failure.clone(),
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Installs the ordered candidate list for a title.
    pub fn set_source_candidates(&mut self, title: Title, candidates: Vec<SourceCandidate>) {
        debug!(
            title = %title.display_title,
            count = candidates.len(),
            "Source candidates installed"
        );
        self.title = Some(title);
        self.fallback.set_candidates(candidates);
    }

    pub fn candidates(&self) -> &[SourceCandidate] {
        self.fallback.candidates()
    }

    /// Starts an external load request. The request is already validated.
    pub fn begin_request(
        &mut self,
        request: LoadRequest,
        now: Instant,
        fx: &mut Effects,
    ) -> LoadPlan {
        let same_title = self
            .title
            .as_ref()
            .is_some_and(|t| t.display_title == request.title);
        if !same_title {
            self.title = Some(Title {
                id: request.id.clone(),
                display_title: request.title.clone(),
            });
            self.fallback.set_candidates(Vec::new());
        }

        let source = self
            .fallback
            .candidate(&request.source)
            .cloned()
            .unwrap_or_else(|| {
                SourceCandidate::new(
                    request.source.clone(),
                    request.source.clone(),
                    request.id.clone(),
                )
            });
        if self.fallback.candidates().is_empty() {
            self.fallback.set_candidates(vec![source.clone()]);
        }

        // Markers belong to the previous request; the rate survives.
        self.intro_end_time = None;
        self.outro_start_time = None;
        self.fallback.reset_sweep();
        self.episodes.clear();
        self.episode_index = None;

        let resume = request.position_millis.filter(|p| *p > 0);
        let episode_index = request.episode_index;
        info!(
            source = %request.source,
            id = %request.id,
            title = %request.title,
            episode = episode_index,
            resume = ?resume,
            "Load requested"
        );
        self.request = Some(request);
        self.start_loading(source, episode_index, resume, LoadOrigin::User, now, fx)
    }

    /// Common part of every load: bumps the generation and enters `Loading`.
    fn start_loading(
        &mut self,
        source: SourceCandidate,
        episode_index: usize,
        resume: Option<u64>,
        origin: LoadOrigin,
        now: Instant,
        fx: &mut Effects,
    ) -> LoadPlan {
        self.generation += 1;
        self.bridge.detach();
        self.active_url = None;
        self.status = None;
        self.pending_seek = None;
        self.scrub.cancel();
        self.resume_position = resume;
        self.initial_jump_done = false;
        self.advanced = false;
        self.is_loading = true;
        self.phase = SessionPhase::Loading;
        if !matches!(self.failure, Some(PlaybackFailure::LoadFailure(_))) {
            self.failure = None;
        }
        match origin {
            // One deadline covers a whole fallback sweep.
            LoadOrigin::Fallback => self.watchdog.start(now),
            LoadOrigin::User => self.watchdog.restart(now),
        }

        if self.active_source.as_ref() != Some(&source) {
            fx.event(SessionEvent::SourceChanged(source.clone()));
        }
        self.active_source = Some(source.clone());

        LoadPlan {
            generation: self.generation,
            source,
            episode_index,
        }
    }

    /// Applies the episode list fetched for `plan`.
    ///
    /// Returns the classified failure when the fetch failed and the fallback
    /// path should run; stale results are dropped.
    pub fn finish_resolve(
        &mut self,
        plan: &LoadPlan,
        result: Result<Vec<Episode>, ResolveError>,
        fx: &mut Effects,
    ) -> Option<(FailureKind, String)> {
        if plan.generation != self.generation {
            debug!(
                generation = plan.generation,
                current = self.generation,
                "Dropping stale episode list"
            );
            return None;
        }

        match result {
            Ok(episodes) if !episodes.is_empty() => {
                self.episodes = episodes;
                self.hand_over_episode(plan.episode_index, fx);
                None
            }
            Ok(_) => {
                warn!(source = %plan.source.source_id, "Source returned no episodes");
                Some((FailureKind::Other, "no episodes".to_string()))
            }
            Err(err) => {
                warn!(source = %plan.source.source_id, error = %err, "Episode list resolution failed");
                Some((err.failure_kind(), err.to_string()))
            }
        }
    }

    /// Hands the (clamped) episode URL to the bridge and the backend.
    fn hand_over_episode(&mut self, requested: usize, fx: &mut Effects) {
        let index = requested.min(self.episodes.len().saturating_sub(1));
        if index != requested {
            debug!(requested, clamped = index, "Episode index clamped");
        }
        let url = self.episodes[index].stream_url.clone();
        self.episode_index = Some(index);
        self.active_url = Some(url.clone());
        self.bridge.attach(&url);

        info!(url = %url, episode = index, "Handing stream to backend");
        fx.command(BackendCommand::Load(url.clone()));
        fx.command(BackendCommand::SetRate(self.playback_rate));
        fx.event(SessionEvent::EpisodeChanged { index, url });
    }

    /// Switches episode on the current source using the cached list.
    pub fn begin_episode(
        &mut self,
        index: usize,
        now: Instant,
        fx: &mut Effects,
    ) -> Result<(), SessionError> {
        let Some(source) = self.active_source.clone() else {
            return Ok(());
        };
        if self.episodes.is_empty() {
            return Ok(());
        }
        if index >= self.episodes.len() {
            return Err(SessionError::EpisodeOutOfRange {
                index,
                len: self.episodes.len(),
            });
        }

        self.fallback.reset_sweep();
        self.start_loading(source, index, None, LoadOrigin::User, now, fx);
        self.hand_over_episode(index, fx);
        Ok(())
    }

    /// Manual source switch keeping the episode index and position.
    pub fn begin_source_switch(
        &mut self,
        source_id: &str,
        now: Instant,
        fx: &mut Effects,
    ) -> Result<Option<LoadPlan>, SessionError> {
        if self.is_empty() {
            return Ok(None);
        }
        let candidate = self
            .fallback
            .candidate(source_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSource(source_id.to_string()))?;

        let position = self
            .status
            .as_ref()
            .map(|s| s.position_millis)
            .filter(|p| *p > 0)
            .or(self.resume_position);
        let episode_index = self.episode_index.unwrap_or_else(|| self.requested_episode());

        info!(source = source_id, episode = episode_index, position = ?position, "Switching source");
        self.fallback.reset_sweep();
        self.failure = None;
        self.episodes.clear();
        Ok(Some(self.start_loading(
            candidate,
            episode_index,
            position,
            LoadOrigin::User,
            now,
            fx,
        )))
    }

    /// Re-issues the last request on its original source with a fresh sweep.
    pub fn begin_retry(&mut self, now: Instant, fx: &mut Effects) -> Option<LoadPlan> {
        let request = self.request.clone()?;
        let source = self
            .fallback
            .candidate(&request.source)
            .cloned()
            .unwrap_or_else(|| {
                SourceCandidate::new(
                    request.source.clone(),
                    request.source.clone(),
                    request.id.clone(),
                )
            });
        let position = self
            .status
            .as_ref()
            .map(|s| s.position_millis)
            .filter(|p| *p > 0);
        let episode_index = self.episode_index.unwrap_or(request.episode_index);

        info!(source = %source.source_id, episode = episode_index, "Retrying playback");
        self.fallback.reset_sweep();
        self.failure = None;
        self.episodes.clear();
        Some(self.start_loading(
            source,
            episode_index,
            position,
            LoadOrigin::User,
            now,
            fx,
        ))
    }

    fn requested_episode(&self) -> usize {
        self.request.as_ref().map(|r| r.episode_index).unwrap_or(0)
    }

    // =========================================================================
    // Failures
    // =========================================================================

    fn guard_matches(&self, guard: &FailureGuard) -> bool {
        match guard {
            FailureGuard::Url(url) => self.active_url.as_deref() == Some(url.as_str()),
            FailureGuard::Generation(generation) => *generation == self.generation,
            FailureGuard::Active => self.active_source.is_some(),
        }
    }

    /// Feeds a classified failure to the fallback resolver.
    ///
    /// Returns the plan for the next source, or None when the failure was
    /// stale or the sweep is exhausted.
    pub fn record_failure(
        &mut self,
        guard: FailureGuard,
        kind: FailureKind,
        message: &str,
        fx: &mut Effects,
    ) -> Option<LoadPlan> {
        if self.is_empty() || !self.guard_matches(&guard) {
            debug!(guard = ?guard, kind = %kind, "Ignoring failure for a stale load");
            return None;
        }
        let failed = self.active_source.clone()?;
        warn!(source = %failed.source_id, kind = %kind, message, "Playback failure");

        match self.fallback.advance(&failed.source_id, kind, Utc::now()) {
            FallbackDecision::Switch(next) => {
                let failure = PlaybackFailure::LoadFailure(kind);
                if let Some(text) = failure.notice() {
                    fx.notice(text);
                }
                self.failure = Some(failure);
                self.phase = SessionPhase::Error;
                let episode_index = self
                    .episode_index
                    .unwrap_or_else(|| self.requested_episode());
                self.episodes.clear();
                self.bridge.detach();
                self.active_url = None;
                Some(LoadPlan {
                    generation: self.generation,
                    source: next,
                    episode_index,
                })
            }
            FallbackDecision::Exhausted(last_kind) => {
                self.enter_terminal(PlaybackFailure::TerminalFailure(last_kind), message, fx);
                None
            }
        }
    }

    /// Moves on to the next candidate picked by [`record_failure`](Self::record_failure).
    ///
    /// The position is not carried across an automatic fallback.
    pub fn begin_fallback(&mut self, plan: LoadPlan, now: Instant, fx: &mut Effects) -> Option<LoadPlan> {
        if plan.generation != self.generation {
            return None;
        }
        Some(self.start_loading(
            plan.source,
            plan.episode_index,
            None,
            LoadOrigin::Fallback,
            now,
            fx,
        ))
    }

    fn enter_terminal(&mut self, failure: PlaybackFailure, message: &str, fx: &mut Effects) {
        warn!(failure = %failure, "Playback stalled");
        if let Some(text) = failure.notice() {
            fx.notice(text);
        }
        let mut status = self.status.clone().unwrap_or_default();
        status.is_playing = false;
        status.error = Some(if message.is_empty() {
            failure.to_string()
        } else {
            message.to_string()
        });
        self.status = Some(status);
        self.failure = Some(failure);
        self.phase = SessionPhase::Terminal;
        self.is_loading = false;
        self.watchdog.cancel();
        self.pending_seek = None;
        self.bridge.detach();
        self.active_url = None;
    }

    // =========================================================================
    // Status ingestion
    // =========================================================================

    /// Runs one bridge observation for `url`.
    pub fn observe(&mut self, url: &str, raw: &RawStatus, now: Instant, fx: &mut Effects) -> Followup {
        let Some(BridgeTick { transition, status }) = self.bridge.observe(url, raw) else {
            return Followup::default();
        };

        let mut followup = Followup::default();
        match transition {
            Some(BridgeTransition::Loading) => {
                debug!(url, "Backend loading");
                let timed_out = matches!(self.failure, Some(PlaybackFailure::TimeoutFailure));
                if !self.is_loading && !timed_out {
                    self.is_loading = true;
                    self.watchdog.start(now);
                }
            }
            Some(BridgeTransition::Ready { first }) => {
                debug!(url, first, "Backend ready");
            }
            Some(BridgeTransition::Failed { kind, message }) => {
                followup.failure = Some((kind, message));
                return followup;
            }
            None => {}
        }

        if let Some(status) = status {
            followup.advance_from = self.apply_status(status, fx);
        }
        followup
    }

    /// Single ingestion point for normalized statuses.
    ///
    /// Returns the generation to auto-advance from, when the end of the
    /// episode (or the outro marker) was reached with auto-advance engaged.
    pub fn apply_status(&mut self, status: PlaybackStatus, fx: &mut Effects) -> Option<u64> {
        if self.is_empty() || self.active_url.is_none() {
            return None;
        }
        let mut status = status.normalized();

        if let Some(mut pending) = self.pending_seek {
            if status.position_millis.abs_diff(pending.target_millis) <= SEEK_TOLERANCE_MS {
                self.pending_seek = None;
            } else {
                pending.ticks += 1;
                if pending.ticks > SEEK_MAX_TICKS {
                    debug!(target = pending.target_millis, "Pending seek abandoned");
                    self.pending_seek = None;
                } else {
                    status.position_millis = pending.target_millis;
                    self.pending_seek = Some(pending);
                }
            }
        }

        if status.is_loaded && !self.initial_jump_done {
            self.initial_jump_done = true;
            let target = self
                .resume_position
                .take()
                .or(self.intro_end_time.filter(|t| *t > 0));
            if let Some(target) = target {
                info!(target, "Applying initial position");
                fx.command(BackendCommand::SeekTo {
                    position_millis: target,
                });
                status.position_millis = target;
                self.pending_seek = Some(PendingSeek {
                    target_millis: target,
                    ticks: 0,
                });
            }
            fx.command(BackendCommand::Play);
        }

        if status.is_loaded && !status.is_buffering {
            if self.is_loading {
                self.is_loading = false;
                self.watchdog.cancel();
            }
            // A late start recovers from a timeout or a fallback.
            if matches!(
                self.failure,
                Some(PlaybackFailure::LoadFailure(_)) | Some(PlaybackFailure::TimeoutFailure)
            ) {
                self.failure = None;
            }
        }

        let mut advance = None;
        if status.did_just_finish {
            if self.auto_advance && !self.advanced && self.has_next_episode() {
                self.advanced = true;
                advance = Some(self.generation);
            } else {
                self.phase = SessionPhase::Idle;
            }
        } else if self.auto_advance
            && !self.advanced
            && status.is_playing
            && self
                .outro_start_time
                .is_some_and(|outro| outro > 0 && status.position_millis >= outro)
            && self.has_next_episode()
        {
            debug!(position = status.position_millis, "Outro reached");
            self.advanced = true;
            advance = Some(self.generation);
        }

        if advance.is_none() && !status.did_just_finish {
            self.phase = next_phase(self.phase, &status, self.is_loading);
        }
        self.status = Some(status);
        advance
    }

    // =========================================================================
    // Transport
    // =========================================================================

    pub fn toggle_play_pause(&mut self, fx: &mut Effects) {
        if self.active_url.is_none() {
            return;
        }
        if self.is_playing() {
            fx.command(BackendCommand::Pause);
        } else {
            fx.command(BackendCommand::Play);
        }
    }

    pub fn pause(&mut self, fx: &mut Effects) {
        if self.is_playing() {
            fx.command(BackendCommand::Pause);
        }
    }

    /// Seeks and writes the optimistic position. With `play`, also resumes.
    pub fn seek(&mut self, position_millis: u64, play: bool, fx: &mut Effects) -> Option<u64> {
        self.active_url.as_ref()?;
        let status = self.status.as_mut()?;
        let target = if status.duration_millis > 0 {
            position_millis.min(status.duration_millis)
        } else {
            position_millis
        };

        fx.command(BackendCommand::SeekTo {
            position_millis: target,
        });
        status.position_millis = target;
        if play {
            fx.command(BackendCommand::Play);
            if status.is_loaded {
                status.is_playing = true;
            }
        }
        self.pending_seek = Some(PendingSeek {
            target_millis: target,
            ticks: 0,
        });
        debug!(target, play, "Seek committed");
        Some(target)
    }

    /// Commits the drag in progress.
    pub fn release_scrub(&mut self, fx: &mut Effects) -> Option<u64> {
        let ratio = self.scrub.release()?;
        let duration = self.status.as_ref().map(|s| s.duration_millis)?;
        let target = crate::scrub::commit_target(ratio, duration);
        self.seek(target, true, fx)
    }

    pub fn set_playback_rate(&mut self, rate: f32, fx: &mut Effects) -> Result<(), SessionError> {
        if !rate.is_finite() || rate <= 0.0 || rate > 4.0 {
            return Err(SessionError::InvalidRate(rate));
        }
        self.playback_rate = rate;
        if self.active_url.is_some() {
            fx.command(BackendCommand::SetRate(rate));
        }
        Ok(())
    }

    pub fn set_auto_advance(&mut self, enabled: bool) {
        self.auto_advance = enabled;
    }

    pub fn auto_advance(&self) -> bool {
        self.auto_advance
    }

    // =========================================================================
    // Markers
    // =========================================================================

    pub fn set_intro_end_time(&mut self) -> Option<u64> {
        let position = self.status.as_ref()?.position_millis;
        self.intro_end_time = Some(position);
        info!(position, "Intro end marker set");
        Some(position)
    }

    pub fn set_outro_start_time(&mut self) -> Option<u64> {
        let position = self.status.as_ref()?.position_millis;
        self.outro_start_time = Some(position);
        info!(position, "Outro start marker set");
        Some(position)
    }

    pub fn clear_intro_end_time(&mut self) {
        self.intro_end_time = None;
    }

    pub fn clear_outro_start_time(&mut self) {
        self.outro_start_time = None;
    }

    // =========================================================================
    // Picture-in-picture, timers, UI flags
    // =========================================================================

    pub fn set_in_pip(&mut self, in_pip: bool) {
        self.is_in_pip = in_pip;
    }

    /// Polls the one-shot timers.
    pub fn poll_timers(&mut self, now: Instant, fx: &mut Effects) {
        if self.watchdog.poll(now) && self.is_loading {
            let failure = PlaybackFailure::TimeoutFailure;
            let timeout = self.watchdog.timeout();
            warn!(timeout = ?timeout, "Loading timed out");
            if let Some(text) = failure.notice() {
                fx.notice(text);
            }
            self.failure = Some(failure);
            self.is_loading = false;
            self.phase = SessionPhase::Terminal;
        }

        if self.controls_timer.poll(now) && self.show_controls {
            self.show_controls = false;
        }
    }

    pub fn show_controls(&mut self, now: Instant) {
        self.show_controls = true;
        self.controls_timer.arm(now);
    }

    pub fn hide_controls(&mut self) {
        self.show_controls = false;
        self.controls_timer.cancel();
    }

    pub fn controls_visible(&self) -> bool {
        self.show_controls
    }

    pub fn modals_mut(&mut self) -> &mut ModalFlags {
        &mut self.modals
    }

    pub fn modals(&self) -> ModalFlags {
        self.modals
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    pub fn progress_snapshot(&self) -> Option<ProgressRecord> {
        let source = self.active_source.as_ref()?;
        let episode_index = self.episode_index?;
        let position_millis = self
            .status
            .as_ref()
            .filter(|s| s.is_loaded)
            .map(|s| s.position_millis)
            .or(self.resume_position)
            .unwrap_or(0);
        Some(ProgressRecord {
            source: source.source_id.clone(),
            id: source.title_id_at_source.clone(),
            episode_index,
            position_millis,
        })
    }

    /// Returns the session to empty. Reports whether there was anything to clear.
    pub fn reset(&mut self) -> bool {
        let was_empty = self.is_empty() && self.title.is_none();
        let generation = self.generation + 1;
        // Track geometry belongs to the screen, not to the session.
        let mut scrub = std::mem::take(&mut self.scrub);
        scrub.cancel();
        let config = self.config.clone();
        *self = SessionState::new(config);
        self.generation = generation;
        self.scrub = scrub;
        !was_empty
    }
}

/// Derives the phase from a fresh status.
fn next_phase(current: SessionPhase, status: &PlaybackStatus, is_loading: bool) -> SessionPhase {
    if !status.is_loaded {
        return if is_loading { SessionPhase::Loading } else { current };
    }
    if status.is_playing {
        return SessionPhase::Playing;
    }
    match current {
        SessionPhase::Playing => SessionPhase::Paused,
        SessionPhase::Paused => SessionPhase::Paused,
        _ => SessionPhase::Ready,
    }
}

/// Per-field change events between two snapshots.
pub(crate) fn diff_views(before: &SessionView, after: &SessionView, out: &mut Vec<SessionEvent>) {
    if before.phase != after.phase {
        out.push(SessionEvent::PhaseChanged(after.phase));
    }
    if before.is_loading != after.is_loading {
        out.push(SessionEvent::LoadingChanged(after.is_loading));
    }
    if before.status != after.status {
        out.push(SessionEvent::StatusChanged(after.status.clone()));
    }
    if before.progress_ratio != after.progress_ratio {
        out.push(SessionEvent::ProgressChanged(after.progress_ratio));
    }
    if before.is_in_pip != after.is_in_pip {
        out.push(SessionEvent::PipChanged(after.is_in_pip));
    }
    if before.intro_end_time != after.intro_end_time
        || before.outro_start_time != after.outro_start_time
    {
        out.push(SessionEvent::MarkersChanged {
            intro_end_time: after.intro_end_time,
            outro_start_time: after.outro_start_time,
        });
    }
    if before.playback_rate != after.playback_rate {
        out.push(SessionEvent::RateChanged(after.playback_rate));
    }
    if before.show_controls != after.show_controls {
        out.push(SessionEvent::ControlsChanged(after.show_controls));
    }
    if before.modals != after.modals {
        out.push(SessionEvent::ModalsChanged(after.modals));
    }
    if before.failure != after.failure {
        if let Some(failure) = &after.failure {
            out.push(SessionEvent::Failure(failure.clone()));
        }
    }
}

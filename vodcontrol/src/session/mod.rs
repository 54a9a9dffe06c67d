//! Playback session controller.
//!
//! A [`PlaybackSession`] owns one player backend and drives it from load
//! requests, backend status observations and user gestures. All mutation goes
//! through the session state lock; backend and resolver calls are made after
//! the lock is released, tagged with the load generation they belong to.
//!
//! ```text
//! load_video ─► begin (lock) ─► resolve episodes ─► hand over (lock) ─► backend
//!                                                        ▲
//! tick / on_backend_status ─► bridge (lock) ─────────────┘ seek, play, fallback
//! ```

mod state;
mod ui;
mod watcher;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::backend::{BackendCommand, PlayerBackend};
use crate::bridge::{RawStatus, WatchStrategy, read_polled_status};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::errors::{BackendError, FailureKind, SessionError};
use crate::events::SessionEventBus;
use crate::lifecycle::{AppState, Orientation, OrientationController, OrientationLock};
use crate::model::{
    LoadRequest, PlaybackStatus, ProgressRecord, SessionEvent, SessionView, SourceCandidate, Title,
};
use crate::resolver::EpisodeResolver;

use state::{Effects, FailureGuard, LoadPlan, SessionState, diff_views};

pub(crate) struct SessionShared {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn EpisodeResolver>,
    backend: Mutex<Box<dyn PlayerBackend>>,
    strategy: WatchStrategy,
    state: Mutex<SessionState>,
    /// Mirror of the state generation, readable without the state lock.
    generation: AtomicU64,
    event_bus: SessionEventBus,
    orientation: Option<OrientationController>,
    watcher_stop_flag: Arc<AtomicBool>,
    watcher_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        self.watcher_stop_flag.store(true, Ordering::SeqCst);
    }
}

/// Handle on one playback session. Clones share the same session.
#[derive(Clone)]
pub struct PlaybackSession {
    shared: Arc<SessionShared>,
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("config", &self.shared.config)
            .field("strategy", &self.shared.strategy)
            .field("generation", &self.shared.generation.load(Ordering::SeqCst))
            .field("is_watching", &self.is_watching())
            .finish()
    }
}

pub struct SessionBuilder {
    backend: Box<dyn PlayerBackend>,
    resolver: Arc<dyn EpisodeResolver>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    event_bus: SessionEventBus,
    orientation: Option<Arc<dyn OrientationLock>>,
}

impl SessionBuilder {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn event_bus(mut self, event_bus: SessionEventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Locks landscape on build and releases it on [`PlaybackSession::close`].
    pub fn orientation(mut self, lock: Arc<dyn OrientationLock>) -> Self {
        self.orientation = Some(lock);
        self
    }

    /// Builds the session. The watcher is not started; see
    /// [`PlaybackSession::start_watching`].
    pub fn build(self) -> PlaybackSession {
        let strategy = self
            .backend
            .watch_strategy()
            .with_configured_interval(self.config.poll_interval);
        debug!(
            backend = self.backend.name(),
            strategy = ?strategy,
            "Creating playback session"
        );

        let orientation = self.orientation.map(OrientationController::new);
        if let Some(controller) = &orientation {
            if let Err(err) = controller.mount() {
                warn!(error = %err, "Failed to lock orientation");
                self.event_bus.broadcast(SessionEvent::Notice(err.to_string()));
            }
        }

        let shared = SessionShared {
            state: Mutex::new(SessionState::new(self.config.clone())),
            config: self.config,
            clock: self.clock,
            resolver: self.resolver,
            backend: Mutex::new(self.backend),
            strategy,
            generation: AtomicU64::new(0),
            event_bus: self.event_bus,
            orientation,
            watcher_stop_flag: Arc::new(AtomicBool::new(false)),
            watcher_handle: Mutex::new(None),
        };

        PlaybackSession {
            shared: Arc::new(shared),
        }
    }
}

impl PlaybackSession {
    pub fn builder(
        backend: impl PlayerBackend + 'static,
        resolver: Arc<dyn EpisodeResolver>,
    ) -> SessionBuilder {
        SessionBuilder {
            backend: Box::new(backend),
            resolver,
            config: SessionConfig::default(),
            clock: Arc::new(SystemClock),
            event_bus: SessionEventBus::new(),
            orientation: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// How backend status is observed, after the configured poll cadence.
    pub fn watch_strategy(&self) -> &WatchStrategy {
        &self.shared.strategy
    }

    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.shared.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &SessionEventBus {
        &self.shared.event_bus
    }

    /// Snapshot of everything the UI renders.
    pub fn view(&self) -> SessionView {
        self.lock_state().view()
    }

    // =========================================================================
    // Internal plumbing
    // =========================================================================

    fn now(&self) -> Instant {
        self.shared.clock.now()
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.shared
            .state
            .lock()
            .expect("Session state mutex poisoned")
    }

    fn lock_backend(&self) -> MutexGuard<'_, Box<dyn PlayerBackend>> {
        self.shared
            .backend
            .lock()
            .expect("Backend mutex poisoned")
    }

    /// Runs `f` under the state lock, then publishes the resulting events and
    /// executes the backend commands with the lock released.
    fn update<R>(&self, f: impl FnOnce(&mut SessionState, &mut Effects) -> R) -> R {
        let (result, effects) = {
            let mut state = self.lock_state();
            let before = state.view();
            let mut fx = Effects::default();
            let result = f(&mut state, &mut fx);
            let after = state.view();

            let mut events = Vec::with_capacity(fx.events.len());
            diff_views(&before, &after, &mut events);
            events.append(&mut fx.events);
            fx.events = events;
            fx.generation = state.generation;
            self.shared
                .generation
                .store(state.generation, Ordering::SeqCst);
            (result, fx)
        };
        self.dispatch(effects);
        result
    }

    fn dispatch(&self, effects: Effects) {
        for event in effects.events {
            self.shared.event_bus.broadcast(event);
        }
        if effects.commands.is_empty() {
            return;
        }

        let mut load_failure = None;
        {
            let mut backend = self.lock_backend();
            for command in &effects.commands {
                if self.shared.generation.load(Ordering::SeqCst) != effects.generation {
                    debug!(command = ?command, "Skipping command of a superseded load");
                    break;
                }
                if let Err(err) = command.apply(&mut **backend) {
                    match command {
                        BackendCommand::Load(url) => {
                            load_failure = Some((url.clone(), err));
                            break;
                        }
                        _ => warn!(command = ?command, error = %err, "Backend command failed"),
                    }
                }
            }
        }

        if let Some((url, err)) = load_failure {
            self.fail(FailureGuard::Url(url), err.failure_kind(), &err.to_string());
        }
    }

    /// Fetches the episode list for `plan` and hands the episode over.
    fn resolve_and_hand_over(&self, plan: LoadPlan) {
        let result = self
            .shared
            .resolver
            .resolve_episodes(&plan.source.source_id, &plan.source.title_id_at_source);
        let failed = self.update(|state, fx| state.finish_resolve(&plan, result, fx));
        if let Some((kind, message)) = failed {
            self.fail(FailureGuard::Generation(plan.generation), kind, &message);
        }
    }

    /// Runs the fallback path for a failure of the active load.
    fn fail(&self, guard: FailureGuard, kind: FailureKind, message: &str) {
        let Some(plan) = self.update(|state, fx| state.record_failure(guard, kind, message, fx))
        else {
            return;
        };
        let now = self.now();
        if let Some(plan) = self.update(|state, fx| state.begin_fallback(plan, now, fx)) {
            self.resolve_and_hand_over(plan);
        }
    }

    fn observe(&self, url: &str, raw: RawStatus) {
        let now = self.now();
        let followup = self.update(|state, fx| state.observe(url, &raw, now, fx));
        if let Some((kind, message)) = followup.failure {
            self.fail(FailureGuard::Url(url.to_string()), kind, &message);
        }
        if let Some(generation) = followup.advance_from {
            self.advance_from(generation);
        }
    }

    fn advance_from(&self, generation: u64) {
        let now = self.now();
        let result = self.update(|state, fx| {
            if state.generation != generation || !state.has_next_episode() {
                return Ok(None);
            }
            let next = state.episode_index().map_or(0, |index| index + 1);
            state.begin_episode(next, now, fx).map(|_| Some(next))
        });
        match result {
            Ok(Some(index)) => info!(episode = index, "Auto-advanced to next episode"),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "Auto-advance failed"),
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Installs the ordered fallback candidates for a title.
    pub fn set_source_candidates(&self, title: Title, candidates: Vec<SourceCandidate>) {
        self.update(|state, _| state.set_source_candidates(title, candidates));
    }

    pub fn source_candidates(&self) -> Vec<SourceCandidate> {
        self.lock_state().candidates().to_vec()
    }

    /// Starts playing `request`, superseding whatever was loaded.
    ///
    /// Only a malformed request is reported as an error. Resolution and
    /// playback failures go through the source fallback.
    pub fn load_video(&self, request: LoadRequest) -> Result<(), SessionError> {
        if let Err(err) = request.validate() {
            warn!(error = %err, "Rejecting load request");
            return Err(err);
        }
        let now = self.now();
        let plan = self.update(|state, fx| state.begin_request(request, now, fx));
        self.resolve_and_hand_over(plan);
        Ok(())
    }

    /// Plays another episode of the current title on the current source.
    pub fn play_episode(&self, index: usize) -> Result<(), SessionError> {
        let now = self.now();
        self.update(|state, fx| state.begin_episode(index, now, fx))
    }

    pub fn has_next_episode(&self) -> bool {
        self.lock_state().has_next_episode()
    }

    /// Returns false when there is no next episode.
    pub fn play_next_episode(&self) -> Result<bool, SessionError> {
        let next = {
            let state = self.lock_state();
            if !state.has_next_episode() {
                return Ok(false);
            }
            state.episode_index().map_or(0, |index| index + 1)
        };
        self.play_episode(next)?;
        Ok(true)
    }

    /// Manual switch to another candidate, keeping the episode and position.
    pub fn switch_source(&self, source_id: &str) -> Result<(), SessionError> {
        let now = self.now();
        if let Some(plan) = self.update(|state, fx| state.begin_source_switch(source_id, now, fx))?
        {
            self.resolve_and_hand_over(plan);
        }
        Ok(())
    }

    /// Re-issues the last request with a fresh fallback sweep.
    pub fn retry(&self) {
        let now = self.now();
        if let Some(plan) = self.update(|state, fx| state.begin_retry(now, fx)) {
            self.resolve_and_hand_over(plan);
        }
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Asks the backend to toggle; the next status observation reconciles.
    pub fn toggle_play_pause(&self) {
        self.update(|state, fx| state.toggle_play_pause(fx));
    }

    pub fn seek_to(&self, position_millis: u64) -> Option<u64> {
        self.update(|state, fx| state.seek(position_millis, false, fx))
    }

    pub fn set_playback_rate(&self, rate: f32) -> Result<(), SessionError> {
        self.update(|state, fx| state.set_playback_rate(rate, fx))
    }

    pub fn set_auto_advance(&self, enabled: bool) {
        debug!(enabled, "Auto-advance");
        self.update(|state, _| state.set_auto_advance(enabled));
    }

    pub fn auto_advance(&self) -> bool {
        self.lock_state().auto_advance()
    }

    /// Marks the current position as the end of the intro.
    pub fn set_intro_end_time(&self) -> Option<u64> {
        self.update(|state, _| state.set_intro_end_time())
    }

    /// Marks the current position as the start of the outro.
    pub fn set_outro_start_time(&self) -> Option<u64> {
        self.update(|state, _| state.set_outro_start_time())
    }

    pub fn clear_intro_end_time(&self) {
        self.update(|state, _| state.clear_intro_end_time());
    }

    pub fn clear_outro_start_time(&self) {
        self.update(|state, _| state.clear_outro_start_time());
    }

    // =========================================================================
    // Status ingestion
    // =========================================================================

    /// Applies an already normalized status to the active load.
    pub fn handle_playback_status_update(&self, status: PlaybackStatus) {
        if let Some(generation) = self.update(|state, fx| state.apply_status(status, fx)) {
            self.advance_from(generation);
        }
    }

    /// Entry point for push engines; `url` is the stream the status is about.
    pub fn on_backend_status(&self, url: &str, raw: RawStatus) {
        self.observe(url, raw);
    }

    /// Reports a playback failure. With `failed_url`, the report is ignored
    /// unless it concerns the active stream.
    pub fn handle_video_error(&self, kind: FailureKind, failed_url: Option<&str>) {
        let guard = match failed_url {
            Some(url) => FailureGuard::Url(url.to_string()),
            None => FailureGuard::Active,
        };
        self.fail(guard, kind, kind.as_str());
    }

    /// One scheduler step: timers, then a status poll for polled engines.
    pub fn tick(&self) {
        let now = self.now();
        self.update(|state, fx| state.poll_timers(now, fx));

        if self.shared.strategy.polling_interval().is_none() {
            return;
        }
        let Some(url) = self.lock_state().bridge_url() else {
            return;
        };
        let sample = {
            let backend = self.lock_backend();
            read_polled_status(&**backend)
        };
        match sample {
            Ok(polled) => self.observe(&url, RawStatus::Polled(polled)),
            Err(err) => warn!(url = %url, error = %err, "Failed to read backend status"),
        }
    }

    // =========================================================================
    // Picture-in-picture and lifecycle
    // =========================================================================

    /// Asks the backend to enter picture-in-picture. The `is_in_pip` flag
    /// follows the backend callback ([`set_in_pip`](Self::set_in_pip)).
    pub fn enter_picture_in_picture(&self) -> Result<(), SessionError> {
        let mut backend = self.lock_backend();
        if !backend.supports_picture_in_picture() {
            return Err(BackendError::Unsupported("enter_picture_in_picture").into());
        }
        backend.enter_picture_in_picture()?;
        Ok(())
    }

    pub fn set_in_pip(&self, in_pip: bool) {
        self.update(|state, _| state.set_in_pip(in_pip));
    }

    /// Leaving the foreground enters picture-in-picture when configured and
    /// supported, otherwise pauses.
    pub fn handle_app_state(&self, app_state: AppState) {
        if app_state.is_foreground() {
            return;
        }
        if !self.lock_state().is_playing() {
            return;
        }
        if self.shared.config.pip_on_background {
            match self.enter_picture_in_picture() {
                Ok(()) => {
                    debug!(app_state = ?app_state, "Entered picture-in-picture");
                    return;
                }
                Err(err) => debug!(error = %err, "Picture-in-picture unavailable, pausing"),
            }
        }
        self.update(|state, fx| state.pause(fx));
    }

    /// Flips the screen orientation. Failures are also published as a notice.
    pub fn toggle_orientation(&self) -> Result<Option<Orientation>, SessionError> {
        let Some(controller) = &self.shared.orientation else {
            return Ok(None);
        };
        controller.toggle().map_err(|err| {
            self.shared
                .event_bus
                .broadcast(SessionEvent::Notice(err.to_string()));
            SessionError::from(err)
        })
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Resume record for the persistence collaborator.
    pub fn progress_snapshot(&self) -> Option<ProgressRecord> {
        self.lock_state().progress_snapshot()
    }

    /// Clears the session. Late reports about the previous load are ignored.
    pub fn reset(&self) {
        let cleared = self.update(|state, fx| {
            let cleared = state.reset();
            if cleared {
                fx.event(SessionEvent::Reset);
            }
            cleared
        });
        if cleared {
            info!("Playback session reset");
        }
    }

    /// Tears the session down and returns the resume record to persist.
    pub fn close(&self) -> Option<ProgressRecord> {
        let record = self.progress_snapshot();
        self.stop_watching();
        self.reset();
        if let Some(controller) = &self.shared.orientation {
            if let Err(err) = controller.unmount() {
                warn!(error = %err, "Failed to unlock orientation");
            }
        }
        record
    }
}

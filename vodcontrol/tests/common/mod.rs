#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use tracing_subscriber::EnvFilter;
use vodcontrol::{
    BackendError, EngineStatus, Episode, EpisodeResolver, ManualClock, PlaybackPosition,
    PlaybackSession, PlaybackStatusSource, PlayerBackend, RateControl, ResolveError,
    SessionConfig, SessionEvent, TransportControl, WatchStrategy,
};

/// Installs a test subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = vodconfig::Config::from_yaml_str("{}")
            .and_then(|config| config.get_log_min_level())
            .unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level.to_lowercase())
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// What the fake engine was asked to do.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Load(String),
    Play,
    Pause,
    Seek(f64),
    Rate(f32),
    Pip,
}

/// Scripted engine state, shared between the test and the backend.
#[derive(Debug)]
pub struct Engine {
    pub status: EngineStatus,
    pub current_time: f64,
    pub duration: f64,
    pub playing: bool,
    pub rate: f32,
    pub error: Option<String>,
    pub source: Option<String>,
    pub calls: Vec<Call>,
    pub failing_urls: HashSet<String>,
    pub pip_supported: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            status: EngineStatus::Idle,
            current_time: 0.0,
            duration: 0.0,
            playing: false,
            rate: 1.0,
            error: None,
            source: None,
            calls: Vec::new(),
            failing_urls: HashSet::new(),
            pip_supported: false,
        }
    }
}

impl Engine {
    pub fn ready(&mut self, duration_secs: f64) {
        self.status = EngineStatus::ReadyToPlay;
        self.duration = duration_secs;
        self.error = None;
    }

    pub fn fail(&mut self, message: &str) {
        self.status = EngineStatus::Error;
        self.error = Some(message.to_string());
        self.playing = false;
    }

    pub fn loads(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Load(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }
}

pub struct FakeBackend {
    engine: Arc<Mutex<Engine>>,
    strategy: WatchStrategy,
}

impl FakeBackend {
    pub fn new(engine: Arc<Mutex<Engine>>, strategy: WatchStrategy) -> Self {
        Self { engine, strategy }
    }
}

impl TransportControl for FakeBackend {
    fn play(&mut self) -> Result<(), BackendError> {
        let mut engine = self.engine.lock().unwrap();
        engine.calls.push(Call::Play);
        engine.playing = engine.status == EngineStatus::ReadyToPlay;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), BackendError> {
        let mut engine = self.engine.lock().unwrap();
        engine.calls.push(Call::Pause);
        engine.playing = false;
        Ok(())
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<(), BackendError> {
        let mut engine = self.engine.lock().unwrap();
        engine.calls.push(Call::Seek(seconds));
        engine.current_time = seconds;
        Ok(())
    }

    fn replace_source(&mut self, url: &str) -> Result<(), BackendError> {
        let mut engine = self.engine.lock().unwrap();
        if engine.failing_urls.contains(url) {
            return Err(BackendError::engine("Network request failed"));
        }
        engine.calls.push(Call::Load(url.to_string()));
        engine.source = Some(url.to_string());
        engine.status = EngineStatus::Loading;
        engine.current_time = 0.0;
        engine.duration = 0.0;
        engine.playing = false;
        engine.error = None;
        Ok(())
    }
}

impl PlaybackPosition for FakeBackend {
    fn current_time(&self) -> Result<f64, BackendError> {
        Ok(self.engine.lock().unwrap().current_time)
    }

    fn duration(&self) -> Result<f64, BackendError> {
        Ok(self.engine.lock().unwrap().duration)
    }

    fn playing(&self) -> Result<bool, BackendError> {
        Ok(self.engine.lock().unwrap().playing)
    }
}

impl RateControl for FakeBackend {
    fn playback_rate(&self) -> Result<f32, BackendError> {
        Ok(self.engine.lock().unwrap().rate)
    }

    fn set_playback_rate(&mut self, rate: f32) -> Result<(), BackendError> {
        let mut engine = self.engine.lock().unwrap();
        engine.calls.push(Call::Rate(rate));
        engine.rate = rate;
        Ok(())
    }
}

impl PlaybackStatusSource for FakeBackend {
    fn status(&self) -> Result<EngineStatus, BackendError> {
        Ok(self.engine.lock().unwrap().status)
    }

    fn last_error(&self) -> Option<String> {
        self.engine.lock().unwrap().error.clone()
    }
}

impl PlayerBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn watch_strategy(&self) -> WatchStrategy {
        self.strategy.clone()
    }

    fn supports_picture_in_picture(&self) -> bool {
        self.engine.lock().unwrap().pip_supported
    }

    fn enter_picture_in_picture(&mut self) -> Result<(), BackendError> {
        self.engine.lock().unwrap().calls.push(Call::Pip);
        Ok(())
    }
}

/// Metadata service stand-in: each source has three episodes unless told otherwise.
#[derive(Default)]
pub struct FakeResolver {
    catalog: Mutex<HashMap<String, Result<usize, String>>>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeResolver {
    pub fn with_source(self, source: &str, episodes: usize) -> Self {
        self.catalog
            .lock()
            .unwrap()
            .insert(source.to_string(), Ok(episodes));
        self
    }

    pub fn with_failure(self, source: &str, message: &str) -> Self {
        self.catalog
            .lock()
            .unwrap()
            .insert(source.to_string(), Err(message.to_string()));
        self
    }

    pub fn sources_called(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(source, _)| source.clone())
            .collect()
    }
}

impl EpisodeResolver for FakeResolver {
    fn resolve_episodes(&self, source: &str, id: &str) -> Result<Vec<Episode>, ResolveError> {
        self.calls
            .lock()
            .unwrap()
            .push((source.to_string(), id.to_string()));
        match self.catalog.lock().unwrap().get(source) {
            Some(Ok(count)) => Ok((0..*count)
                .map(|index| Episode {
                    index,
                    title: format!("Episode {}", index + 1),
                    stream_url: stream_url(source, index),
                })
                .collect()),
            Some(Err(message)) => Err(ResolveError::Other(message.clone())),
            None => Ok(Vec::new()),
        }
    }
}

pub fn stream_url(source: &str, index: usize) -> String {
    format!("http://{source}.cdn/{index}.m3u8")
}

pub struct Harness {
    pub session: PlaybackSession,
    pub engine: Arc<Mutex<Engine>>,
    pub resolver: Arc<FakeResolver>,
    pub clock: ManualClock,
    pub events: Receiver<SessionEvent>,
}

impl Harness {
    pub fn new(resolver: FakeResolver) -> Self {
        Self::with_strategy(resolver, WatchStrategy::default())
    }

    pub fn with_strategy(resolver: FakeResolver, strategy: WatchStrategy) -> Self {
        Self::build(resolver, strategy, SessionConfig::default())
    }

    pub fn build(resolver: FakeResolver, strategy: WatchStrategy, config: SessionConfig) -> Self {
        init_tracing();
        let engine = Arc::new(Mutex::new(Engine::default()));
        let resolver = Arc::new(resolver);
        let clock = ManualClock::new();
        let backend = FakeBackend::new(Arc::clone(&engine), strategy);
        let session = PlaybackSession::builder(backend, resolver.clone())
            .config(config)
            .clock(Arc::new(clock.clone()))
            .build();
        let events = session.subscribe();
        Self {
            session,
            engine,
            resolver,
            clock,
            events,
        }
    }

    pub fn engine(&self) -> std::sync::MutexGuard<'_, Engine> {
        self.engine.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.engine().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.engine().calls.clear();
    }

    pub fn drain_events(&self) -> Vec<SessionEvent> {
        self.events.try_iter().collect()
    }

    /// Engine reports ready. The first tick lets the session start playback,
    /// the second one observes it playing.
    pub fn make_ready(&self, duration_secs: f64) {
        self.engine().ready(duration_secs);
        self.session.tick();
        self.session.tick();
    }

    pub fn tick_n(&self, count: usize) {
        for _ in 0..count {
            self.session.tick();
        }
    }
}

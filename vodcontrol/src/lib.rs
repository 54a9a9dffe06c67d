mod events;

pub mod backend;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod lifecycle;
pub mod model;
pub mod resolver;
pub mod scrub;
pub mod session;
pub mod timers;

pub use backend::{
    BackendCommand, EngineStatus, PlaybackPosition, PlaybackStatusSource, PlayerBackend,
    RateControl, TransportControl,
};
pub use bridge::{
    BridgeTick, BridgeTransition, PolledStatus, PushedStatus, RawStatus, StatusBridge,
    WatchStrategy,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use errors::{
    BackendError, FailureKind, OrientationError, PlaybackFailure, ResolveError, SessionError,
};
pub use events::SessionEventBus;
pub use fallback::{FallbackAttempt, FallbackDecision, FallbackResolver};
pub use lifecycle::{AppState, Orientation, OrientationController, OrientationLock};
pub use model::{
    BackAction, Episode, LoadRequest, ModalFlags, PlaybackStatus, ProgressRecord, SessionEvent,
    SessionPhase, SessionView, SourceCandidate, Title,
};
pub use resolver::{EpisodeResolver, HttpEpisodeResolver};
pub use scrub::{GesturePoint, ScrubReconciler, format_time};
pub use session::{PlaybackSession, SessionBuilder};

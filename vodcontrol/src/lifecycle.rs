//! Host lifecycle: app foreground/background and screen orientation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::errors::OrientationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppState {
    Active,
    Inactive,
    Background,
}

impl AppState {
    pub fn is_foreground(&self) -> bool {
        matches!(self, AppState::Active)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// Screen orientation collaborator provided by the host.
pub trait OrientationLock: Send + Sync {
    fn lock(&self, orientation: Orientation) -> Result<(), OrientationError>;

    fn unlock(&self) -> Result<(), OrientationError>;
}

/// Drives the orientation lock for one player screen.
///
/// Uses its own atomics, so orientation changes never wait on the session lock.
pub struct OrientationController {
    lock: Arc<dyn OrientationLock>,
    is_landscape: AtomicBool,
    toggling: AtomicBool,
}

impl std::fmt::Debug for OrientationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrientationController")
            .field("is_landscape", &self.is_landscape())
            .field("toggling", &self.toggling.load(Ordering::SeqCst))
            .finish()
    }
}

impl OrientationController {
    pub fn new(lock: Arc<dyn OrientationLock>) -> Self {
        Self {
            lock,
            is_landscape: AtomicBool::new(false),
            toggling: AtomicBool::new(false),
        }
    }

    pub fn is_landscape(&self) -> bool {
        self.is_landscape.load(Ordering::SeqCst)
    }

    /// Locks landscape when the player screen mounts.
    pub fn mount(&self) -> Result<(), OrientationError> {
        self.lock.lock(Orientation::Landscape)?;
        self.is_landscape.store(true, Ordering::SeqCst);
        debug!("Orientation locked to landscape");
        Ok(())
    }

    /// Releases the lock when the player screen unmounts.
    pub fn unmount(&self) -> Result<(), OrientationError> {
        self.lock.unlock()?;
        self.is_landscape.store(false, Ordering::SeqCst);
        debug!("Orientation unlocked");
        Ok(())
    }

    /// Flips between landscape and portrait.
    ///
    /// Returns `Ok(None)` when a toggle is already in progress.
    pub fn toggle(&self) -> Result<Option<Orientation>, OrientationError> {
        if self.toggling.swap(true, Ordering::SeqCst) {
            debug!("Orientation toggle already in progress");
            return Ok(None);
        }

        let target = if self.is_landscape() {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        };
        let result = self.lock.lock(target);
        self.toggling.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                self.is_landscape
                    .store(target == Orientation::Landscape, Ordering::SeqCst);
                Ok(Some(target))
            }
            Err(err) => {
                warn!(error = %err, "Failed to toggle orientation");
                Err(err)
            }
        }
    }
}

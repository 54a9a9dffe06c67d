//! Watcher thread driving [`PlaybackSession::tick`].
//!
//! The thread only holds a weak reference to the session: dropping the last
//! handle stops it on its next iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use super::{PlaybackSession, SessionShared};

impl PlaybackSession {
    /// Starts the watcher thread. Idempotent.
    ///
    /// Push engines still get a watcher: the timers need it even when there
    /// is nothing to poll.
    pub fn start_watching(&self) {
        let mut handle_guard = self
            .shared
            .watcher_handle
            .lock()
            .expect("Watcher handle mutex poisoned");
        if handle_guard.is_some() {
            return;
        }

        self.shared.watcher_stop_flag.store(false, Ordering::SeqCst);

        let interval = self
            .shared
            .strategy
            .polling_interval()
            .unwrap_or(self.shared.config.poll_interval);
        debug!(
            strategy = ?self.shared.strategy,
            interval = ?interval,
            "Starting watcher thread"
        );

        *handle_guard = Some(self.spawn_watcher_thread(interval));
    }

    /// Stops the watcher thread and waits for it. Idempotent.
    pub fn stop_watching(&self) {
        self.shared.watcher_stop_flag.store(true, Ordering::SeqCst);

        let mut handle_guard = self
            .shared
            .watcher_handle
            .lock()
            .expect("Watcher handle mutex poisoned");
        if let Some(handle) = handle_guard.take() {
            debug!("Stopping watcher thread");
            let _ = handle.join();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.shared
            .watcher_handle
            .lock()
            .expect("Watcher handle mutex poisoned")
            .is_some()
    }

    fn spawn_watcher_thread(&self, interval: Duration) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        let stop_flag = Arc::clone(&self.shared.watcher_stop_flag);

        thread::Builder::new()
            .name("vodplay-watcher".to_string())
            .spawn(move || watcher_loop(shared, interval, stop_flag))
            .expect("Failed to spawn watcher thread")
    }
}

fn watcher_loop(shared: Weak<SessionShared>, interval: Duration, stop_flag: Arc<AtomicBool>) {
    while !stop_flag.load(Ordering::SeqCst) {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        PlaybackSession { shared }.tick();
        thread::sleep(interval);
    }
    debug!("Watcher thread exiting");
}

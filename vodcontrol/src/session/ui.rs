//! Controls, pickers and progress-bar gestures.

use tracing::debug;

use super::PlaybackSession;
use crate::model::{BackAction, ModalFlags};
use crate::scrub::GesturePoint;

impl PlaybackSession {
    /// Shows the controls and (re)starts the auto-hide timer.
    pub fn show_controls(&self) {
        let now = self.now();
        self.update(|state, _| state.show_controls(now));
    }

    pub fn hide_controls(&self) {
        self.update(|state, _| state.hide_controls());
    }

    pub fn toggle_controls(&self) {
        let now = self.now();
        self.update(|state, _| {
            if state.controls_visible() {
                state.hide_controls();
            } else {
                state.show_controls(now);
            }
        });
    }

    /// Any remote key or touch keeps the controls up.
    pub fn user_activity(&self) {
        self.show_controls();
    }

    pub fn set_show_episode_modal(&self, visible: bool) {
        self.update(|state, _| state.modals_mut().episodes = visible);
    }

    pub fn set_show_source_modal(&self, visible: bool) {
        self.update(|state, _| state.modals_mut().sources = visible);
    }

    pub fn set_show_speed_modal(&self, visible: bool) {
        self.update(|state, _| state.modals_mut().speed = visible);
    }

    pub fn modals(&self) -> ModalFlags {
        self.lock_state().modals()
    }

    /// Back press: closes the innermost overlay, or reports that the player
    /// screen should be left.
    pub fn handle_back(&self) -> BackAction {
        let action = self.update(|state, _| {
            let modals = state.modals_mut();
            if modals.episodes {
                modals.episodes = false;
                BackAction::ClosedEpisodeModal
            } else if modals.sources {
                modals.sources = false;
                BackAction::ClosedSourceModal
            } else if modals.speed {
                modals.speed = false;
                BackAction::ClosedSpeedModal
            } else if state.controls_visible() {
                state.hide_controls();
                BackAction::HidControls
            } else {
                BackAction::Exit
            }
        });
        debug!(action = ?action, "Back pressed");
        action
    }

    // =========================================================================
    // Scrubbing
    // =========================================================================

    pub fn set_progress_layout_width(&self, width: f64) {
        self.update(|state, _| state.scrub.set_layout_width(width));
    }

    /// Records the absolute placement of the progress track.
    pub fn set_progress_measurement(&self, origin_x: f64, width: f64) {
        self.update(|state, _| state.scrub.set_measurement(origin_x, width));
    }

    pub fn begin_scrub(&self, point: GesturePoint) -> f64 {
        self.update(|state, _| state.scrub.begin(point))
    }

    pub fn update_scrub(&self, point: GesturePoint) -> Option<f64> {
        self.update(|state, _| state.scrub.update(point))
    }

    /// Ends the drag: seeks to the ratio, resumes playback and shows the
    /// target position right away. Returns the seek target.
    pub fn release_scrub(&self) -> Option<u64> {
        self.update(|state, fx| state.release_scrub(fx))
    }

    /// The gesture was taken over by another responder; commits like a release.
    pub fn terminate_scrub(&self) -> Option<u64> {
        self.release_scrub()
    }

    pub fn cancel_scrub(&self) {
        self.update(|state, _| state.scrub.cancel());
    }
}

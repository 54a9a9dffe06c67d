//! Progress-bar scrubbing.
//!
//! While the user drags the progress bar, the displayed position follows the
//! finger rather than the engine. The reconciler owns the drag ratio and
//! hands back the ratio to commit when the gesture ends.

/// Horizontal coordinates of one gesture sample.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GesturePoint {
    /// Absolute x on screen, when the platform provides it.
    pub page_x: Option<f64>,
    /// x relative to the progress track.
    pub location_x: f64,
}

impl GesturePoint {
    pub fn absolute(page_x: f64, location_x: f64) -> Self {
        Self {
            page_x: Some(page_x),
            location_x,
        }
    }

    pub fn local(location_x: f64) -> Self {
        Self {
            page_x: None,
            location_x,
        }
    }
}

/// Measured on-screen placement of the progress track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackMeasurement {
    pub origin_x: f64,
    pub width: f64,
}

#[derive(Clone, Debug, Default)]
pub struct ScrubReconciler {
    layout_width: f64,
    measurement: Option<TrackMeasurement>,
    dragging: bool,
    ratio: f64,
}

impl ScrubReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Width reported by the layout pass.
    pub fn set_layout_width(&mut self, width: f64) {
        self.layout_width = width;
    }

    pub fn set_measurement(&mut self, origin_x: f64, width: f64) {
        self.measurement = Some(TrackMeasurement { origin_x, width });
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Maps a gesture sample onto `[0, 1]`.
    pub fn ratio_for(&self, point: GesturePoint) -> f64 {
        if let (Some(measurement), Some(page_x)) = (self.measurement, point.page_x) {
            if measurement.width > 0.0 {
                return clamp_ratio((page_x - measurement.origin_x) / measurement.width);
            }
        }
        if self.layout_width <= 0.0 {
            return 0.0;
        }
        clamp_ratio(point.location_x / self.layout_width)
    }

    pub fn begin(&mut self, point: GesturePoint) -> f64 {
        self.dragging = true;
        self.ratio = self.ratio_for(point);
        self.ratio
    }

    /// Moves the drag. Ignored when no drag is in progress.
    pub fn update(&mut self, point: GesturePoint) -> Option<f64> {
        if !self.dragging {
            return None;
        }
        self.ratio = self.ratio_for(point);
        Some(self.ratio)
    }

    /// Ends the drag and returns the ratio to commit.
    ///
    /// A terminated gesture (stolen by another responder) commits the same way.
    pub fn release(&mut self) -> Option<f64> {
        if !self.dragging {
            return None;
        }
        self.dragging = false;
        Some(self.ratio)
    }

    /// Abandons the drag without committing.
    pub fn cancel(&mut self) {
        self.dragging = false;
    }

    /// Position to render: the drag position while scrubbing, else the engine's.
    pub fn display_position(&self, authoritative_millis: u64, duration_millis: u64) -> u64 {
        if self.dragging {
            commit_target(self.ratio, duration_millis)
        } else {
            authoritative_millis
        }
    }
}

fn clamp_ratio(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Seek target for a committed ratio.
pub fn commit_target(ratio: f64, duration_millis: u64) -> u64 {
    (clamp_ratio(ratio) * duration_millis as f64).round() as u64
}

/// Formats a position as `MM:SS`; minutes keep growing past an hour.
pub fn format_time(millis: u64) -> String {
    let total_seconds = millis / 1000;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

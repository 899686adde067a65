use std::time::Duration;

use crate::processor::BackendPreference;

/// Per-target capture settings.
///
/// ```
/// use std::time::Duration;
/// use deskcapture::{Backend, BackendPreference, CaptureConfig};
///
/// let config = CaptureConfig::default()
///     .with_backend(BackendPreference::Pinned(Backend::Raster))
///     .with_frame_interval(Duration::from_millis(33));
/// assert_eq!(config.frame_interval, Duration::from_millis(33));
/// ```
#[derive(Debug, Clone, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct CaptureConfig {
    /// Try duplication first and fall back to raster copy, or use one
    /// backend only.
    pub backend: BackendPreference,

    /// Minimum time between the starts of two successful iterations.
    pub frame_interval: Duration,

    /// Upper bound of the wait for the next duplicated frame.
    pub duplication_timeout: Duration,

    /// First backoff after a recoverable transition. Doubles on each
    /// consecutive one.
    pub backoff_initial: Duration,

    pub backoff_max: Duration,

    /// Turn off the system-wide minimize/maximize animation before raster
    /// capture of a window. Some composited windows come out black through
    /// `BitBlt` while it is on.
    pub disable_window_animation: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            frame_interval: Duration::from_millis(100),
            duplication_timeout: Duration::from_millis(100),
            backoff_initial: Duration::from_millis(50),
            backoff_max: Duration::from_secs(1),
            disable_window_animation: false,
        }
    }
}

impl CaptureConfig {
    /// Backoff to apply after `consecutive` recoverable iterations in a row
    /// (starting at 1).
    pub fn backoff(&self, consecutive: u32) -> Duration {
        let shift = consecutive.saturating_sub(1).min(16);
        self.backoff_initial
            .saturating_mul(1u32 << shift)
            .min(self.backoff_max)
    }
}

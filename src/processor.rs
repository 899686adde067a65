use crate::error::CaptureError;
use crate::frame::FrameBuffer;
use crate::report::Reporter;
use crate::target::CaptureTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Driver-level desktop duplication. Monitors only.
    Duplication,

    /// Surface copy into a bitmap followed by a device-independent readback.
    Raster,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendPreference {
    /// Duplication first, raster copy if duplication cannot be set up.
    #[default]
    Auto,

    /// This backend only. Any failure while initializing it ends the
    /// capture.
    Pinned(Backend),
}

impl BackendPreference {
    pub fn is_pinned(&self) -> bool {
        matches!(self, BackendPreference::Pinned(_))
    }

    /// Backends to try, in order, for `target`.
    pub fn candidates(&self, target: &CaptureTarget) -> Vec<Backend> {
        match self {
            BackendPreference::Pinned(backend) => vec![*backend],
            BackendPreference::Auto if target.is_monitor() => {
                vec![Backend::Duplication, Backend::Raster]
            }
            BackendPreference::Auto => vec![Backend::Raster],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The frame buffer holds a new image.
    NewFrame,

    /// Nothing new arrived within the backend's wait bound.
    NoUpdate,
}

/// One capture backend for one incarnation of one target.
///
/// A processor never survives a geometry change: after any failure the loop
/// calls [`FrameProcessor::release`] and builds a fresh one.
pub trait FrameProcessor {
    fn backend(&self) -> Backend;

    /// Acquire everything needed to capture `target` at the geometry `frame`
    /// was sized for.
    fn init(
        &mut self,
        target: &CaptureTarget,
        frame: &FrameBuffer,
        reporter: &mut Reporter,
    ) -> Result<(), CaptureError>;

    /// One capture attempt into `frame`.
    fn capture(
        &mut self,
        target: &CaptureTarget,
        frame: &mut FrameBuffer,
        reporter: &mut Reporter,
    ) -> Result<CaptureOutcome, CaptureError>;

    /// Drop every platform resource. Called at most once.
    fn release(&mut self);
}

/// Builds processors and measures targets for a platform.
pub trait ProcessorFactory {
    /// Live geometry of `target`, or why it cannot be measured.
    fn locate(&mut self, target: &CaptureTarget) -> Result<CaptureTarget, CaptureError>;

    fn create(&mut self, backend: Backend) -> Box<dyn FrameProcessor>;
}

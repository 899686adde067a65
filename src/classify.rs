use crate::error::{CaptureError, FailureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Success,

    /// Tear the processor down and rebuild it before capturing again.
    RecoverableTransition,

    /// Stop capturing this target.
    Fatal,
}

impl CaptureStatus {
    pub fn is_success(&self) -> bool {
        *self == CaptureStatus::Success
    }
}

/// Where in a loop iteration an outcome was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Attaching to the input desktop.
    Attach,

    /// Measuring the target's live geometry before building a processor.
    Locate,

    /// Initializing the last candidate backend.
    Init,

    /// Initializing a pinned backend. There is nothing to fall back to.
    PinnedInit,

    /// Capturing one frame.
    Capture,
}

/// Map an outcome to a status.
///
/// Only an init-time failure to create a capture resource is fatal, as is
/// any failure to initialize a pinned backend. The same platform code
/// during a per-frame copy is recoverable.
pub fn classify<T>(phase: Phase, outcome: &Result<T, CaptureError>) -> CaptureStatus {
    match outcome {
        Ok(_) => CaptureStatus::Success,
        Err(err) => classify_error(phase, err),
    }
}

pub fn classify_error(phase: Phase, err: &CaptureError) -> CaptureStatus {
    match (phase, err.kind) {
        (Phase::PinnedInit, _) => CaptureStatus::Fatal,
        (Phase::Init, FailureKind::ResourceUnavailable) => CaptureStatus::Fatal,
        _ => CaptureStatus::RecoverableTransition,
    }
}

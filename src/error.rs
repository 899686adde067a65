use std::fmt;

/// What went wrong, independent of the platform error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The interactive desktop could not be opened or attached, or the
    /// session denied access (lock screen, secure desktop, UAC prompt).
    SessionUnavailable,

    /// The monitor or window handle no longer refers to anything.
    TargetInvalid,

    /// Live geometry no longer matches the frame buffer.
    GeometryChanged,

    /// A per-frame copy or readback failed.
    CopyFailed,

    /// The duplication channel was invalidated (mode change, GPU reset,
    /// desktop switch) and has to be recreated.
    ChannelLost,

    /// A device context, surface or duplication channel could not be
    /// created at all.
    ResourceUnavailable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureKind::SessionUnavailable => "desktop session unavailable",
            FailureKind::TargetInvalid => "target handle is no longer valid",
            FailureKind::GeometryChanged => "target geometry changed",
            FailureKind::CopyFailed => "frame copy failed",
            FailureKind::ChannelLost => "duplication channel lost",
            FailureKind::ResourceUnavailable => "capture resource unavailable",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed ({kind}), code {code:#x}")]
pub struct CaptureError {
    /// Name of the platform call or step that failed.
    pub operation: &'static str,

    /// Platform error code (`GetLastError` or `HRESULT`), 0 if none.
    pub code: u32,

    pub kind: FailureKind,
}

impl CaptureError {
    pub fn new(operation: &'static str, code: u32, kind: FailureKind) -> Self {
        Self {
            operation,
            code,
            kind,
        }
    }

    pub fn session(operation: &'static str, code: u32) -> Self {
        Self::new(operation, code, FailureKind::SessionUnavailable)
    }

    pub fn target_invalid(operation: &'static str) -> Self {
        Self::new(operation, 0, FailureKind::TargetInvalid)
    }

    pub fn geometry_changed(operation: &'static str) -> Self {
        Self::new(operation, 0, FailureKind::GeometryChanged)
    }

    pub fn copy_failed(operation: &'static str, code: u32) -> Self {
        Self::new(operation, code, FailureKind::CopyFailed)
    }

    pub fn channel_lost(operation: &'static str, code: u32) -> Self {
        Self::new(operation, code, FailureKind::ChannelLost)
    }

    pub fn resource(operation: &'static str, code: u32) -> Self {
        Self::new(operation, code, FailureKind::ResourceUnavailable)
    }
}

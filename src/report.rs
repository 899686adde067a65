use crate::classify::CaptureStatus;
use crate::error::CaptureError;

/// Forwards failures to the `log` facade and to an optional caller
/// callback taking `(operation, platform error code)`.
///
/// Reporting never blocks capture and never changes its outcome.
pub struct Reporter {
    callback: Option<Box<dyn FnMut(&str, u32)>>,
    label: String,
}

impl Reporter {
    pub fn new(callback: impl FnMut(&str, u32) + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            label: String::new(),
        }
    }

    /// Only the `log` facade receives reports.
    pub fn silent() -> Self {
        Self {
            callback: None,
            label: String::new(),
        }
    }

    /// Prefix for log lines, usually the target name.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// A failed platform call that did not decide the iteration's outcome,
    /// e.g. a `PrintWindow` failure covered by a `BitBlt` fallback.
    pub fn report(&mut self, operation: &str, code: u32) {
        log::debug!("[{}] {operation} failed, code {code:#x}", self.label);
        self.forward(operation, code);
    }

    /// A failure together with how it was classified.
    pub fn failure(&mut self, err: &CaptureError, status: CaptureStatus) {
        match status {
            CaptureStatus::Fatal => log::error!("[{}] fatal: {err}", self.label),
            _ => log::warn!("[{}] {err}", self.label),
        }
        self.forward(err.operation, err.code);
    }

    fn forward(&mut self, operation: &str, code: u32) {
        if let Some(callback) = self.callback.as_mut() {
            callback(operation, code);
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::silent()
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("label", &self.label)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Instant,
};

use spin_sleep::SpinSleeper;

use crate::{
    classify::{classify_error, CaptureStatus, Phase},
    config::CaptureConfig,
    error::CaptureError,
    frame::FrameBuffer,
    processor::{Backend, CaptureOutcome, FrameProcessor, ProcessorFactory},
    report::Reporter,
    session::SessionGate,
    target::CaptureTarget,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Attaching,
    Capturing,
    Terminated,
}

/// Outcome of one loop iteration.
#[derive(Debug)]
pub struct CaptureResult<'a> {
    pub status: CaptureStatus,

    /// Set when the iteration produced a new image.
    pub frame: Option<&'a FrameBuffer>,

    /// The target as measured for the current incarnation.
    pub target: &'a CaptureTarget,

    /// Why the iteration did not succeed.
    pub error: Option<CaptureError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    Failed(CaptureError),
}

struct Failure {
    status: CaptureStatus,
    error: CaptureError,

    /// Already handed to the reporter by whoever detected it.
    reported: bool,
}

impl Failure {
    fn classified(phase: Phase, error: CaptureError) -> Self {
        Self {
            status: classify_error(phase, &error),
            error,
            reported: false,
        }
    }
}

/// Sequential capture state machine for a single target.
///
/// Every iteration attaches to the input desktop, builds a processor if
/// none is alive, captures once and classifies the result. A recoverable
/// failure drops the processor so the next iteration starts a new
/// incarnation from fresh geometry. A fatal one terminates the loop.
pub struct CaptureLoop<F, G> {
    target: CaptureTarget,
    config: CaptureConfig,
    factory: F,
    gate: G,
    reporter: Reporter,
    processor: Option<Box<dyn FrameProcessor>>,
    frame: FrameBuffer,
    state: LoopState,
    consecutive_failures: u32,
    fatal: Option<CaptureError>,
}

impl<F: ProcessorFactory, G: SessionGate> CaptureLoop<F, G> {
    pub fn new(
        target: CaptureTarget,
        config: CaptureConfig,
        factory: F,
        gate: G,
        reporter: Reporter,
    ) -> Self {
        let frame = FrameBuffer::for_target(&target);
        Self {
            target,
            config,
            factory,
            gate,
            reporter,
            processor: None,
            frame,
            state: LoopState::Idle,
            consecutive_failures: 0,
            fatal: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn target(&self) -> &CaptureTarget {
        &self.target
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Backend of the live processor, if any.
    pub fn backend(&self) -> Option<Backend> {
        self.processor.as_ref().map(|processor| processor.backend())
    }

    /// Recoverable iterations since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Run one iteration.
    pub fn step(&mut self) -> CaptureResult<'_> {
        if self.state == LoopState::Terminated {
            return CaptureResult {
                status: CaptureStatus::Fatal,
                frame: None,
                target: &self.target,
                error: self.fatal.clone(),
            };
        }

        match self.advance() {
            Ok(outcome) => {
                self.consecutive_failures = 0;
                let frame = match outcome {
                    CaptureOutcome::NewFrame => Some(&self.frame),
                    CaptureOutcome::NoUpdate => None,
                };
                CaptureResult {
                    status: CaptureStatus::Success,
                    frame,
                    target: &self.target,
                    error: None,
                }
            }
            Err(failure) => {
                if failure.reported {
                    log::warn!("[{}] {}", self.reporter.label(), failure.error);
                } else {
                    self.reporter.failure(&failure.error, failure.status);
                }
                self.teardown();

                if failure.status == CaptureStatus::Fatal {
                    self.state = LoopState::Terminated;
                    self.fatal = Some(failure.error.clone());
                } else {
                    self.state = LoopState::Attaching;
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                }

                CaptureResult {
                    status: failure.status,
                    frame: None,
                    target: &self.target,
                    error: Some(failure.error),
                }
            }
        }
    }

    /// Iterate until `cancel` is set or a fatal failure occurs, handing each
    /// new frame to `on_frame` before the next iteration starts.
    pub fn run(
        mut self,
        cancel: &AtomicBool,
        mut on_frame: impl FnMut(&CaptureTarget, &FrameBuffer),
    ) -> LoopExit {
        let sleeper = SpinSleeper::default();
        log::info!("[{}] capture loop started", self.reporter.label());

        loop {
            if cancel.load(Ordering::Relaxed) {
                self.teardown();
                log::info!("[{}] capture loop cancelled", self.reporter.label());
                return LoopExit::Cancelled;
            }

            let started = Instant::now();
            let (status, error) = {
                let result = self.step();
                if let Some(frame) = result.frame {
                    on_frame(result.target, frame);
                }
                (result.status, result.error)
            };

            match status {
                CaptureStatus::Success => {
                    let deadline = started + self.config.frame_interval;
                    if let Some(rest) = deadline.checked_duration_since(Instant::now()) {
                        sleeper.sleep(rest);
                    }
                }
                CaptureStatus::RecoverableTransition => {
                    sleeper.sleep(self.config.backoff(self.consecutive_failures));
                }
                CaptureStatus::Fatal => {
                    log::error!("[{}] capture loop terminated", self.reporter.label());
                    let error = error
                        .unwrap_or_else(|| CaptureError::resource("CaptureLoop::run", 0));
                    return LoopExit::Failed(error);
                }
            }
        }
    }

    fn advance(&mut self) -> Result<CaptureOutcome, Failure> {
        if self.processor.is_none() {
            self.state = LoopState::Attaching;
        }

        if !self.gate.ensure_input_desktop(&mut self.reporter) {
            self.state = LoopState::Attaching;
            return Err(Failure {
                reported: true,
                ..Failure::classified(Phase::Attach, CaptureError::session("EnsureInputDesktop", 0))
            });
        }

        let mut processor = match self.processor.take() {
            Some(processor) => processor,
            None => self.incarnate()?,
        };
        self.state = LoopState::Capturing;

        let result = processor.capture(&self.target, &mut self.frame, &mut self.reporter);
        self.processor = Some(processor);

        result.map_err(|error| Failure::classified(Phase::Capture, error))
    }

    /// Measure the target and bring up the first backend that initializes.
    fn incarnate(&mut self) -> Result<Box<dyn FrameProcessor>, Failure> {
        let live = self
            .factory
            .locate(&self.target)
            .map_err(|error| Failure::classified(Phase::Locate, error))?;
        self.frame.reset(&live);
        self.target = live;

        let mut candidates = self.config.backend.candidates(&self.target).into_iter().peekable();
        while let Some(backend) = candidates.next() {
            let mut processor = self.factory.create(backend);
            match processor.init(&self.target, &self.frame, &mut self.reporter) {
                Ok(()) => {
                    log::info!(
                        "[{}] capturing {}x{} with {backend:?}",
                        self.reporter.label(),
                        self.frame.width(),
                        self.frame.height()
                    );
                    return Ok(processor);
                }
                Err(error) if candidates.peek().is_some() => {
                    processor.release();
                    log::info!(
                        "[{}] {backend:?} unavailable ({error}), falling back",
                        self.reporter.label()
                    );
                    self.reporter.report(error.operation, error.code);
                }
                Err(error) => {
                    processor.release();
                    let phase = if self.config.backend.is_pinned() {
                        Phase::PinnedInit
                    } else {
                        Phase::Init
                    };
                    return Err(Failure::classified(phase, error));
                }
            }
        }

        Err(Failure::classified(
            Phase::Init,
            CaptureError::resource("no capture backend", 0),
        ))
    }
}

impl<F, G> CaptureLoop<F, G> {
    fn teardown(&mut self) {
        if let Some(mut processor) = self.processor.take() {
            processor.release();
        }
    }
}

impl<F, G> Drop for CaptureLoop<F, G> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Run a [`CaptureLoop`] for `target` on a dedicated thread.
///
/// `make_platform` runs on the new thread, so platform objects that must
/// stay on the thread that created them never cross threads.
pub fn spawn_capture<F, G, P>(
    target: CaptureTarget,
    config: CaptureConfig,
    make_platform: P,
    on_frame: impl FnMut(&CaptureTarget, &FrameBuffer) + Send + 'static,
    on_log: impl FnMut(&str, u32) + Send + 'static,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<JoinHandle<LoopExit>>
where
    F: ProcessorFactory,
    G: SessionGate,
    P: FnOnce() -> (F, G) + Send + 'static,
{
    let name = format!("capture-{}", target.index);
    let handle = std::thread::Builder::new().name(name).spawn(move || {
        let (factory, gate) = make_platform();
        let reporter = Reporter::new(on_log).with_label(target.name.clone());
        CaptureLoop::new(target, config, factory, gate, reporter).run(&cancel, on_frame)
    })?;

    Ok(handle)
}

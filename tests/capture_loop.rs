use std::{
    cell::RefCell,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    time::Duration,
};

use deskcapture::{
    spawn_capture, Backend, BackendPreference, CaptureConfig, CaptureError, CaptureLoop,
    CaptureOutcome, CaptureStatus, CaptureTarget, FailureKind, FrameBuffer, FrameProcessor,
    Geometry, LoopExit, LoopState, Point, ProcessorFactory, Reporter,
};

const COLOR: [u8; 4] = [0x10, 0x20, 0x30, 0xff];

/// What the fake desktop looks like right now.
struct Screen {
    geometry: Geometry,
    color: [u8; 4],
    alive: bool,
    duplication_failure: Option<CaptureError>,
    raster_failure: Option<CaptureError>,
    copy_failures: u32,
    idle_frames: u32,
    inits: Vec<Backend>,
    releases: u32,
}

impl Screen {
    fn new(width: i32, height: i32) -> Rc<RefCell<Screen>> {
        Rc::new(RefCell::new(Screen {
            geometry: Geometry::from_edges(0, 0, width, height),
            color: COLOR,
            alive: true,
            duplication_failure: None,
            raster_failure: None,
            copy_failures: 0,
            idle_frames: 0,
            inits: Vec::new(),
            releases: 0,
        }))
    }
}

struct FakeProcessor {
    backend: Backend,
    screen: Rc<RefCell<Screen>>,
}

impl FrameProcessor for FakeProcessor {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn init(
        &mut self,
        _target: &CaptureTarget,
        frame: &FrameBuffer,
        _reporter: &mut Reporter,
    ) -> Result<(), CaptureError> {
        let mut screen = self.screen.borrow_mut();
        let failure = match self.backend {
            Backend::Duplication => screen.duplication_failure.clone(),
            Backend::Raster => screen.raster_failure.clone(),
        };
        if let Some(err) = failure {
            return Err(err);
        }
        if !frame.matches(&screen.geometry) {
            return Err(CaptureError::geometry_changed("init"));
        }
        screen.inits.push(self.backend);
        Ok(())
    }

    fn capture(
        &mut self,
        _target: &CaptureTarget,
        frame: &mut FrameBuffer,
        _reporter: &mut Reporter,
    ) -> Result<CaptureOutcome, CaptureError> {
        let mut screen = self.screen.borrow_mut();
        if !screen.alive {
            return Err(CaptureError::target_invalid("IsWindow"));
        }
        if !frame.matches(&screen.geometry) {
            return Err(CaptureError::geometry_changed("capture"));
        }
        if screen.copy_failures > 0 {
            screen.copy_failures -= 1;
            return Err(CaptureError::copy_failed("BitBlt", 5));
        }
        if screen.idle_frames > 0 {
            screen.idle_frames -= 1;
            return Ok(CaptureOutcome::NoUpdate);
        }

        for pixel in frame.pixels_mut().chunks_exact_mut(4) {
            pixel.copy_from_slice(&screen.color);
        }
        Ok(CaptureOutcome::NewFrame)
    }

    fn release(&mut self) {
        self.screen.borrow_mut().releases += 1;
    }
}

struct FakePlatform {
    screen: Rc<RefCell<Screen>>,
}

impl ProcessorFactory for FakePlatform {
    fn locate(&mut self, target: &CaptureTarget) -> Result<CaptureTarget, CaptureError> {
        let screen = self.screen.borrow();
        if !screen.alive {
            return Err(CaptureError::target_invalid("GetMonitorInfoW"));
        }
        Ok(target.with_geometry(screen.geometry))
    }

    fn create(&mut self, backend: Backend) -> Box<dyn FrameProcessor> {
        Box::new(FakeProcessor {
            backend,
            screen: self.screen.clone(),
        })
    }
}

fn no_duplication() -> CaptureError {
    CaptureError::resource("DuplicateOutput", 0x887A_0004)
}

fn fast_config() -> CaptureConfig {
    CaptureConfig::default()
        .with_frame_interval(Duration::ZERO)
        .with_backoff_initial(Duration::ZERO)
        .with_backoff_max(Duration::ZERO)
}

fn monitor() -> CaptureTarget {
    // stale geometry on purpose: the loop has to measure before capturing
    CaptureTarget::monitor(0x1001, 0, r"\\.\DISPLAY1", Geometry::from_edges(0, 0, 1, 1))
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

type Gate = Box<dyn FnMut() -> bool>;

fn always_attached() -> Gate {
    Box::new(|| true)
}

fn capture_loop(
    screen: &Rc<RefCell<Screen>>,
    config: CaptureConfig,
    gate: Gate,
) -> CaptureLoop<FakePlatform, Gate> {
    init_logger();
    CaptureLoop::new(
        monitor(),
        config,
        FakePlatform {
            screen: screen.clone(),
        },
        gate,
        Reporter::silent(),
    )
}

fn assert_frame_invariants(frame: &FrameBuffer) {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    assert_eq!(frame.stride(), width * 4);
    assert!(frame.capacity() >= width * height * 4);
    assert_eq!(frame.pixels().len(), width * height * 4);
}

#[test]
fn uniform_4x4_monitor_is_delivered_as_bgra() {
    let screen = Screen::new(4, 4);
    let mut capture = capture_loop(&screen, fast_config(), always_attached());

    let result = capture.step();
    assert_eq!(result.status, CaptureStatus::Success);
    let frame = result.frame.expect("a new frame");

    assert_eq!(frame.stride(), 16);
    assert_eq!(frame.height(), 4);
    assert_eq!(frame.width(), 4);
    for y in 0..4 {
        assert_eq!(frame.row(y).len(), 16);
        for x in 0..4 {
            assert_eq!(frame.pixel(x, y), COLOR);
        }
    }
}

#[test]
fn loop_starts_idle_and_reaches_capturing() {
    let screen = Screen::new(4, 4);
    let mut capture = capture_loop(&screen, fast_config(), always_attached());
    assert_eq!(capture.state(), LoopState::Idle);

    assert!(capture.step().status.is_success());
    assert_eq!(capture.state(), LoopState::Capturing);
    assert_eq!(capture.backend(), Some(Backend::Duplication));
}

#[test]
fn resize_causes_exactly_one_transition() {
    let screen = Screen::new(4, 4);
    let mut capture = capture_loop(&screen, fast_config(), always_attached());
    assert!(capture.step().status.is_success());

    screen.borrow_mut().geometry = Geometry::from_edges(0, 0, 8, 6);

    let mut statuses = Vec::new();
    for _ in 0..5 {
        let result = capture.step();
        statuses.push(result.status);
        if let Some(frame) = result.frame {
            assert_eq!((frame.width(), frame.height()), (8, 6));
            assert_frame_invariants(frame);
        }
    }

    assert_eq!(statuses[0], CaptureStatus::RecoverableTransition);
    assert!(statuses[1..].iter().all(|status| status.is_success()));
    assert_eq!(capture.target().size.width, 8);
    // one processor per incarnation
    assert_eq!(screen.borrow().inits.len(), 2);
    assert_eq!(screen.borrow().releases, 1);
}

#[test]
fn move_without_resize_is_also_a_transition() {
    let screen = Screen::new(4, 4);
    let mut capture = capture_loop(&screen, fast_config(), always_attached());
    assert!(capture.step().status.is_success());

    screen.borrow_mut().geometry = Geometry::from_edges(100, 50, 104, 54);

    let result = capture.step();
    assert_eq!(result.status, CaptureStatus::RecoverableTransition);
    assert_eq!(result.error.map(|e| e.kind), Some(FailureKind::GeometryChanged));

    assert!(capture.step().status.is_success());
    assert_eq!(capture.target().position, Point::new(100, 50));
}

#[test]
fn buffer_invariants_hold_across_resizes() {
    let screen = Screen::new(16, 16);
    let mut capture = capture_loop(&screen, fast_config(), always_attached());

    for (width, height) in [(16, 16), (2, 3), (32, 8), (1, 1), (20, 20)] {
        screen.borrow_mut().geometry = Geometry::from_edges(0, 0, width, height);
        let mut delivered = false;
        for _ in 0..3 {
            let result = capture.step();
            if let Some(frame) = result.frame {
                assert_eq!((frame.width(), frame.height()), (width as u32, height as u32));
                assert_frame_invariants(frame);
                delivered = true;
            }
        }
        assert!(delivered, "no frame at {width}x{height}");
    }
}

#[test]
fn failing_gate_keeps_retrying() {
    let screen = Screen::new(4, 4);
    let failures_left = Rc::new(RefCell::new(25u32));
    let gate: Gate = Box::new({
        let failures_left = failures_left.clone();
        move || {
            let mut left = failures_left.borrow_mut();
            if *left == 0 {
                return true;
            }
            *left -= 1;
            false
        }
    });
    let mut capture = capture_loop(&screen, fast_config(), gate);

    for _ in 0..25 {
        let result = capture.step();
        assert_eq!(result.status, CaptureStatus::RecoverableTransition);
        assert_eq!(result.error.map(|e| e.kind), Some(FailureKind::SessionUnavailable));
        assert_eq!(capture.state(), LoopState::Attaching);
    }
    assert_eq!(capture.consecutive_failures(), 25);
    assert!(screen.borrow().inits.is_empty());

    assert!(capture.step().status.is_success());
    assert_eq!(capture.consecutive_failures(), 0);
}

#[test]
fn gate_failure_mid_capture_drops_the_processor() {
    let screen = Screen::new(4, 4);
    let attached = Rc::new(RefCell::new(true));
    let gate: Gate = Box::new({
        let attached = attached.clone();
        move || *attached.borrow()
    });
    let mut capture = capture_loop(&screen, fast_config(), gate);
    assert!(capture.step().status.is_success());

    *attached.borrow_mut() = false;
    assert_eq!(capture.step().status, CaptureStatus::RecoverableTransition);
    assert_eq!(capture.backend(), None);
    assert_eq!(screen.borrow().releases, 1);

    *attached.borrow_mut() = true;
    assert!(capture.step().status.is_success());
}

#[test]
fn repeated_copy_failures_never_become_fatal() {
    let screen = Screen::new(4, 4);
    let mut capture = capture_loop(&screen, fast_config(), always_attached());
    assert!(capture.step().status.is_success());

    screen.borrow_mut().copy_failures = 100;
    for _ in 0..100 {
        let result = capture.step();
        assert_eq!(result.status, CaptureStatus::RecoverableTransition);
        assert_eq!(result.error.map(|e| e.kind), Some(FailureKind::CopyFailed));
    }
    assert_ne!(capture.state(), LoopState::Terminated);
    assert!(capture.step().status.is_success());
}

#[test]
fn vanished_target_is_recoverable() {
    let screen = Screen::new(4, 4);
    let mut capture = capture_loop(&screen, fast_config(), always_attached());
    assert!(capture.step().status.is_success());

    screen.borrow_mut().alive = false;
    for _ in 0..3 {
        let result = capture.step();
        assert_eq!(result.status, CaptureStatus::RecoverableTransition);
        assert_eq!(result.error.map(|e| e.kind), Some(FailureKind::TargetInvalid));
    }

    screen.borrow_mut().alive = true;
    assert!(capture.step().status.is_success());
}

#[test]
fn no_update_is_success_without_delivery() {
    let screen = Screen::new(4, 4);
    screen.borrow_mut().idle_frames = 1;
    let mut capture = capture_loop(&screen, fast_config(), always_attached());

    let result = capture.step();
    assert_eq!(result.status, CaptureStatus::Success);
    assert!(result.frame.is_none());

    assert!(capture.step().frame.is_some());
}

#[test]
fn duplication_failure_falls_back_to_raster() {
    let screen = Screen::new(4, 4);
    screen.borrow_mut().duplication_failure = Some(no_duplication());

    let (mut capture, logged) = recording_loop(&screen, fast_config());

    let result = capture.step();
    assert_eq!(result.status, CaptureStatus::Success);
    assert_eq!(result.frame.map(|frame| frame.pixel(3, 3)), Some(COLOR));
    assert_eq!(capture.backend(), Some(Backend::Raster));
    assert_eq!(screen.borrow().inits, vec![Backend::Raster]);
    assert_eq!(
        *logged.borrow(),
        vec![("DuplicateOutput".to_string(), 0x887A_0004)]
    );
}

#[test]
fn pinned_duplication_failure_is_fatal() {
    let screen = Screen::new(4, 4);
    screen.borrow_mut().duplication_failure = Some(no_duplication());
    let config = fast_config().with_backend(BackendPreference::Pinned(Backend::Duplication));
    let mut capture = capture_loop(&screen, config, always_attached());

    let result = capture.step();
    assert_eq!(result.status, CaptureStatus::Fatal);
    assert_eq!(result.error.map(|e| e.kind), Some(FailureKind::ResourceUnavailable));
    assert_eq!(capture.state(), LoopState::Terminated);

    // terminal: no more init attempts
    assert_eq!(capture.step().status, CaptureStatus::Fatal);
    assert!(screen.borrow().inits.is_empty());
}

#[test]
fn pinned_raster_never_tries_duplication() {
    let screen = Screen::new(4, 4);
    let config = fast_config().with_backend(BackendPreference::Pinned(Backend::Raster));
    let mut capture = capture_loop(&screen, config, always_attached());

    assert!(capture.step().status.is_success());
    assert_eq!(screen.borrow().inits, vec![Backend::Raster]);
}

type CallLog = Rc<RefCell<Vec<(String, u32)>>>;

fn recording_loop(
    screen: &Rc<RefCell<Screen>>,
    config: CaptureConfig,
) -> (CaptureLoop<FakePlatform, Gate>, CallLog) {
    init_logger();
    let logged = CallLog::default();
    let reporter = Reporter::new({
        let logged = logged.clone();
        move |operation: &str, code| logged.borrow_mut().push((operation.to_string(), code))
    });
    let capture = CaptureLoop::new(
        monitor(),
        config,
        FakePlatform {
            screen: screen.clone(),
        },
        always_attached(),
        reporter,
    );
    (capture, logged)
}

#[test]
fn pinned_init_failure_of_any_kind_is_fatal() {
    let screen = Screen::new(4, 4);
    screen.borrow_mut().duplication_failure = Some(CaptureError::target_invalid("EnumOutputs"));
    let config = fast_config().with_backend(BackendPreference::Pinned(Backend::Duplication));
    let mut capture = capture_loop(&screen, config, always_attached());

    let result = capture.step();
    assert_eq!(result.status, CaptureStatus::Fatal);
    assert_eq!(result.error.map(|e| e.kind), Some(FailureKind::TargetInvalid));
    assert_eq!(capture.state(), LoopState::Terminated);

    for _ in 0..10 {
        assert_eq!(capture.step().status, CaptureStatus::Fatal);
    }
    assert_eq!(capture.state(), LoopState::Terminated);
}

#[test]
fn pinned_raster_allocation_failure_is_fatal() {
    let screen = Screen::new(4, 4);
    screen.borrow_mut().raster_failure = Some(CaptureError::resource("CreateCompatibleBitmap", 8));
    let config = fast_config().with_backend(BackendPreference::Pinned(Backend::Raster));
    let mut capture = capture_loop(&screen, config, always_attached());

    let result = capture.step();
    assert_eq!(result.status, CaptureStatus::Fatal);
    assert_eq!(result.error.map(|e| e.operation), Some("CreateCompatibleBitmap"));
    assert_eq!(capture.state(), LoopState::Terminated);
}

#[test]
fn auto_is_fatal_when_no_backend_can_allocate() {
    let screen = Screen::new(4, 4);
    {
        let mut screen = screen.borrow_mut();
        screen.duplication_failure = Some(no_duplication());
        screen.raster_failure = Some(CaptureError::resource("CreateCompatibleDC", 8));
    }
    let mut capture = capture_loop(&screen, fast_config(), always_attached());

    let result = capture.step();
    assert_eq!(result.status, CaptureStatus::Fatal);
    assert_eq!(result.error.map(|e| e.operation), Some("CreateCompatibleDC"));
    assert_eq!(capture.state(), LoopState::Terminated);
    assert!(screen.borrow().inits.is_empty());
}

#[test]
fn auto_with_transient_fallback_failure_keeps_retrying() {
    let screen = Screen::new(4, 4);
    {
        let mut screen = screen.borrow_mut();
        screen.duplication_failure = Some(no_duplication());
        screen.raster_failure = Some(CaptureError::target_invalid("GetWindowDC"));
    }
    let mut capture = capture_loop(&screen, fast_config(), always_attached());

    for _ in 0..5 {
        assert_eq!(capture.step().status, CaptureStatus::RecoverableTransition);
    }
    assert_eq!(capture.state(), LoopState::Attaching);

    screen.borrow_mut().raster_failure = None;
    assert!(capture.step().status.is_success());
    assert_eq!(capture.backend(), Some(Backend::Raster));
}

#[test]
fn fatal_failure_reaches_the_callback_once() {
    let screen = Screen::new(4, 4);
    screen.borrow_mut().duplication_failure = Some(no_duplication());
    let config = fast_config().with_backend(BackendPreference::Pinned(Backend::Duplication));
    let (mut capture, logged) = recording_loop(&screen, config);

    for _ in 0..3 {
        assert_eq!(capture.step().status, CaptureStatus::Fatal);
    }

    assert_eq!(
        *logged.borrow(),
        vec![("DuplicateOutput".to_string(), 0x887A_0004)]
    );
}

#[test]
fn run_logs_fatal_exit_through_the_callback() {
    let screen = Screen::new(4, 4);
    screen.borrow_mut().raster_failure = Some(CaptureError::resource("CreateDCW", 1801));
    let config = fast_config().with_backend(BackendPreference::Pinned(Backend::Raster));
    let (capture, logged) = recording_loop(&screen, config);

    let cancel = AtomicBool::new(false);
    let exit = capture.run(&cancel, |_, _| panic!("no frame expected"));

    assert_eq!(exit, LoopExit::Failed(CaptureError::resource("CreateDCW", 1801)));
    assert_eq!(*logged.borrow(), vec![("CreateDCW".to_string(), 1801)]);
}

#[test]
fn run_reports_fatal_exit() {
    let screen = Screen::new(4, 4);
    screen.borrow_mut().duplication_failure = Some(no_duplication());
    let config = fast_config().with_backend(BackendPreference::Pinned(Backend::Duplication));
    let capture = capture_loop(&screen, config, always_attached());

    let cancel = AtomicBool::new(false);
    let exit = capture.run(&cancel, |_, _| panic!("no frame expected"));
    match exit {
        LoopExit::Failed(err) => assert_eq!(err.operation, "DuplicateOutput"),
        other => panic!("unexpected exit {other:?}"),
    }
}

#[test]
fn run_stops_at_the_next_iteration_after_cancel() {
    let screen = Screen::new(4, 4);
    let capture = capture_loop(&screen, fast_config(), always_attached());

    let cancel = AtomicBool::new(false);
    let mut delivered = 0;
    let exit = capture.run(&cancel, |target, frame| {
        assert_eq!(target.size.width, 4);
        assert_eq!(frame.pixel(0, 0), COLOR);
        delivered += 1;
        if delivered == 3 {
            cancel.store(true, Ordering::Relaxed);
        }
    });

    assert_eq!(exit, LoopExit::Cancelled);
    assert_eq!(delivered, 3);
    assert_eq!(screen.borrow().releases, 1);
}

#[test]
fn run_never_starts_when_already_cancelled() {
    let screen = Screen::new(4, 4);
    let capture = capture_loop(&screen, fast_config(), always_attached());

    let cancel = AtomicBool::new(true);
    let exit = capture.run(&cancel, |_, _| panic!("no frame expected"));

    assert_eq!(exit, LoopExit::Cancelled);
    assert!(screen.borrow().inits.is_empty());
}

#[test]
fn spawned_loop_delivers_and_cancels() {
    init_logger();
    let cancel = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = mpsc::channel();

    let handle = spawn_capture(
        monitor(),
        fast_config().with_frame_interval(Duration::from_millis(1)),
        || {
            let screen = Screen::new(2, 2);
            (FakePlatform { screen }, || true)
        },
        move |_target, frame| {
            let _ = sender.send((frame.width(), frame.height(), frame.pixels().to_vec()));
        },
        |_, _| {},
        cancel.clone(),
    )
    .expect("spawn capture thread");

    let (width, height, pixels) = receiver
        .recv_timeout(Duration::from_secs(5))
        .expect("a frame from the capture thread");
    cancel.store(true, Ordering::Relaxed);

    assert_eq!((width, height), (2, 2));
    assert_eq!(pixels, COLOR.repeat(4));
    assert_eq!(handle.join().expect("capture thread"), LoopExit::Cancelled);
}

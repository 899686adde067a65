use std::{
    sync::{atomic::AtomicBool, Arc},
    thread::JoinHandle,
};

use winapi::shared::windef::{HMONITOR, HWND};

use crate::{
    capture_loop::{spawn_capture, LoopExit},
    config::CaptureConfig,
    d3d::DuplicationProcessor,
    displays::monitor_info,
    error::CaptureError,
    frame::FrameBuffer,
    gdi::RasterBlitProcessor,
    processor::{Backend, FrameProcessor, ProcessorFactory},
    session::InputDesktop,
    target::{CaptureTarget, TargetKind},
    window_finder::window_geometry,
};

/// Measure `target` as it is right now.
pub(crate) fn measure(target: &CaptureTarget) -> Result<CaptureTarget, CaptureError> {
    match target.kind {
        TargetKind::Monitor => {
            let (geometry, device_name) = monitor_info(target.handle as HMONITOR)
                .ok_or_else(|| CaptureError::target_invalid("GetMonitorInfoW"))?;
            let mut live = target.with_geometry(geometry);
            live.name = device_name;
            Ok(live)
        }
        TargetKind::Window { .. } => {
            let (geometry, border) = window_geometry(target.handle as HWND)
                .ok_or_else(|| CaptureError::target_invalid("IsWindow"))?;
            let mut live = target.with_geometry(geometry);
            live.kind = TargetKind::Window { border };
            Ok(live)
        }
    }
}

/// DXGI duplication and GDI processors for the Win32 desktop.
#[derive(Debug, Clone, Default)]
pub struct Win32Platform {
    config: CaptureConfig,
}

impl Win32Platform {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

impl ProcessorFactory for Win32Platform {
    fn locate(&mut self, target: &CaptureTarget) -> Result<CaptureTarget, CaptureError> {
        let live = measure(target)?;
        if live.size.is_empty() {
            // minimized windows report an empty client area
            return Err(CaptureError::geometry_changed("GetClientRect"));
        }
        Ok(live)
    }

    fn create(&mut self, backend: Backend) -> Box<dyn FrameProcessor> {
        match backend {
            Backend::Duplication => {
                Box::new(DuplicationProcessor::new(self.config.duplication_timeout))
            }
            Backend::Raster => Box::new(
                RasterBlitProcessor::new()
                    .with_disable_window_animation(self.config.disable_window_animation),
            ),
        }
    }
}

/// Capture `target` on its own thread with the Win32 backends.
///
/// # Examples
/// ```no_run
/// use std::sync::{atomic::{AtomicBool, Ordering}, Arc};
///
/// let displays = deskcapture::enumerate_displays().unwrap();
/// let cancel = Arc::new(AtomicBool::new(false));
///
/// let handle = deskcapture::start_capture(
///     displays[0].clone(),
///     deskcapture::CaptureConfig::default(),
///     |target, frame| println!("{}: {}x{}", target.name, frame.width(), frame.height()),
///     |operation, code| eprintln!("{operation} failed: {code:#x}"),
///     cancel.clone(),
/// )
/// .unwrap();
///
/// std::thread::sleep(std::time::Duration::from_secs(1));
/// cancel.store(true, Ordering::Relaxed);
/// let _exit = handle.join().unwrap();
/// ```
pub fn start_capture(
    target: CaptureTarget,
    config: CaptureConfig,
    on_frame: impl FnMut(&CaptureTarget, &FrameBuffer) + Send + 'static,
    on_log: impl FnMut(&str, u32) + Send + 'static,
    cancel: Arc<AtomicBool>,
) -> anyhow::Result<JoinHandle<LoopExit>> {
    let platform_config = config.clone();
    spawn_capture(
        target,
        config,
        move || (Win32Platform::new(platform_config), InputDesktop),
        on_frame,
        on_log,
        cancel,
    )
}

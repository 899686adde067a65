/* 
 * author: Humi@bass_clef_ <bassclef.nico@gmail.com>
 */

//! # deskcapture
//! `deskcapture` captures monitors and windows on Windows, frame by frame,
//! into tightly packed 32bpp BGRA buffers.
//!
//! Each target runs its own sequential [`CaptureLoop`]. The loop attaches to
//! the interactive desktop, prefers DXGI desktop duplication and falls back
//! to a GDI copy, and tells transient trouble (resize, lock screen, lost
//! duplication channel) apart from failures that end the capture.
//!
//! # Examples
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() -> anyhow::Result<()> {
//! use std::sync::{atomic::{AtomicBool, Ordering}, Arc};
//!
//! let display = deskcapture::enumerate_displays()?.remove(0);
//! let cancel = Arc::new(AtomicBool::new(false));
//!
//! let handle = deskcapture::start_capture(
//!     display,
//!     deskcapture::CaptureConfig::default(),
//!     |_target, frame| {
//!         // rows are top-down, stride == width * 4
//!         let _first_pixel = frame.pixel(0, 0);
//!     },
//!     |operation, code| eprintln!("{operation}: {code:#x}"),
//!     cancel.clone(),
//! )?;
//!
//! std::thread::sleep(std::time::Duration::from_secs(2));
//! cancel.store(true, Ordering::Relaxed);
//! let _ = handle.join();
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```

pub mod capture_loop;
pub mod classify;
pub mod config;
pub mod error;
pub mod frame;
pub mod processor;
pub mod report;
pub mod session;
pub mod target;

pub use capture_loop::*;
pub use classify::*;
pub use config::*;
pub use error::*;
pub use frame::*;
pub use processor::*;
pub use report::*;
pub use session::*;
pub use target::*;

#[cfg(windows)]
pub mod d3d;
#[cfg(windows)]
pub mod gdi;
#[cfg(windows)]
mod platform;

#[cfg(windows)]
mod displays;
#[cfg(windows)]
mod window_finder;

#[cfg(windows)]
pub use d3d::DuplicationProcessor;
#[cfg(windows)]
pub use gdi::RasterBlitProcessor;
#[cfg(windows)]
pub use platform::{start_capture, Win32Platform};

#[cfg(windows)]
pub use displays::enumerate_displays;
#[cfg(windows)]
pub use window_finder::{enumerate_windows, find_window};

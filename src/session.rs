use crate::report::Reporter;

/// Attaches the calling thread to the interactive desktop.
///
/// Called at the start of every loop iteration. Implementations must be
/// cheap, idempotent and must only touch thread-local state. `false` is a
/// retry signal, never a reason to stop.
pub trait SessionGate {
    fn ensure_input_desktop(&mut self, reporter: &mut Reporter) -> bool;
}

impl<F: FnMut() -> bool> SessionGate for F {
    fn ensure_input_desktop(&mut self, reporter: &mut Reporter) -> bool {
        let attached = self();
        if !attached {
            reporter.report("EnsureInputDesktop", 0);
        }
        attached
    }
}

#[cfg(windows)]
pub use self::win32::InputDesktop;

#[cfg(windows)]
mod win32 {
    use winapi::{
        shared::{minwindef::FALSE, windef::HDESK},
        um::{
            errhandlingapi::GetLastError,
            winnt::GENERIC_ALL,
            winuser::{CloseDesktop, OpenInputDesktop, SetThreadDesktop},
        },
    };

    use super::SessionGate;
    use crate::report::Reporter;

    /// Gate backed by `OpenInputDesktop` and `SetThreadDesktop`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct InputDesktop;

    struct DesktopHandle(HDESK);

    impl Drop for DesktopHandle {
        fn drop(&mut self) {
            unsafe {
                CloseDesktop(self.0);
            }
        }
    }

    impl SessionGate for InputDesktop {
        fn ensure_input_desktop(&mut self, reporter: &mut Reporter) -> bool {
            let desktop = unsafe { OpenInputDesktop(0, FALSE, GENERIC_ALL) };
            if desktop.is_null() {
                reporter.report("OpenInputDesktop", unsafe { GetLastError() });
                return false;
            }
            let desktop = DesktopHandle(desktop);

            if unsafe { SetThreadDesktop(desktop.0) } == 0 {
                let code = unsafe { GetLastError() };
                drop(desktop);
                reporter.report("SetThreadDesktop", code);
                return false;
            }

            true
        }
    }
}

/// author: Robert Mikhayelyan <rob.mikh@outlook.com>

use winapi::{
    shared::{
        minwindef::{BOOL, LPARAM, TRUE},
        windef::{HDC, HMONITOR, LPRECT},
    },
    um::winuser::{EnumDisplayMonitors, GetMonitorInfoW, MONITORINFOEXW},
};

use crate::target::{CaptureTarget, Geometry};

/// Monitor rectangle and GDI device name, or `None` if the handle is stale.
pub(crate) fn monitor_info(handle: HMONITOR) -> Option<(Geometry, String)> {
    let mut monitor_info = MONITORINFOEXW::default();
    monitor_info.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;

    let result = unsafe { GetMonitorInfoW(handle, &mut monitor_info as *mut _ as *mut _) };
    if result == 0 {
        return None;
    }

    let rect = monitor_info.rcMonitor;
    let device_name = String::from_utf16_lossy(&monitor_info.szDevice)
        .trim_matches(char::from(0))
        .to_string();

    Some((
        Geometry::from_edges(rect.left, rect.top, rect.right, rect.bottom),
        device_name,
    ))
}

unsafe extern "system" fn enum_monitor(handle: HMONITOR, _: HDC, _: LPRECT, lparam: LPARAM) -> BOOL {
    let list = &mut *(lparam as *mut Vec<HMONITOR>);
    list.push(handle);

    TRUE
}

/// Get all displays in enumeration order.
pub fn enumerate_displays() -> anyhow::Result<Vec<CaptureTarget>> {
    let mut handles: Vec<HMONITOR> = Vec::new();
    let result = unsafe {
        EnumDisplayMonitors(
            std::ptr::null_mut(),
            std::ptr::null(),
            Some(enum_monitor),
            &mut handles as *mut _ as LPARAM,
        )
    };
    if result == 0 {
        anyhow::bail!("EnumDisplayMonitors failed, code {:#x}", unsafe {
            winapi::um::errhandlingapi::GetLastError()
        });
    }

    let displays = handles
        .into_iter()
        .enumerate()
        .filter_map(|(index, handle)| {
            let (geometry, name) = monitor_info(handle)?;
            Some(CaptureTarget::monitor(handle as isize, index, name, geometry))
        })
        .collect();

    Ok(displays)
}

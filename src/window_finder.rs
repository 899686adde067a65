/// author: Robert Mikhayelyan <rob.mikh@outlook.com>

use winapi::{
    shared::{
        minwindef::{BOOL, DWORD, LPARAM, TRUE},
        windef::{HWND, POINT, RECT},
    },
    um::{
        dwmapi::{DwmGetWindowAttribute, DWMWA_CLOAKED, DWM_CLOAKED_SHELL},
        errhandlingapi::GetLastError,
        wincon::{GetConsoleTitleW, SetConsoleTitleW},
        winuser::{
            ClientToScreen, EnumWindows, GetAncestor, GetClassNameW, GetClientRect,
            GetShellWindow, GetWindowLongW, GetWindowRect, GetWindowTextLengthW, GetWindowTextW,
            IsWindow, IsWindowVisible, GA_ROOT, GWL_EXSTYLE, GWL_STYLE, WS_DISABLED,
            WS_EX_TOOLWINDOW,
        },
    },
};

use crate::target::{CaptureTarget, Geometry, Point};

#[derive(Debug, Clone)]
struct WindowInfo {
    handle: HWND,
    title: String,
    class_name: String,
}

/// Client area in screen coordinates and its offset inside the outer
/// window rectangle, or `None` if `window` is gone.
pub(crate) fn window_geometry(window: HWND) -> Option<(Geometry, Point)> {
    unsafe {
        if IsWindow(window) == 0 {
            return None;
        }

        let mut client = RECT::default();
        let mut outer = RECT::default();
        if GetClientRect(window, &mut client) == 0 || GetWindowRect(window, &mut outer) == 0 {
            return None;
        }

        let mut origin = POINT { x: 0, y: 0 };
        if ClientToScreen(window, &mut origin) == 0 {
            return None;
        }

        let geometry = Geometry::from_edges(
            origin.x,
            origin.y,
            origin.x + client.right - client.left,
            origin.y + client.bottom - client.top,
        );
        let border = Point::new(origin.x - outer.left, origin.y - outer.top);

        Some((geometry, border))
    }
}

fn get_shell_window() -> HWND {
    unsafe { GetShellWindow() }
}

fn is_window_visible(window: HWND) -> bool {
    unsafe { IsWindowVisible(window) != 0 }
}

fn is_root_window(window: HWND) -> bool {
    unsafe { GetAncestor(window, GA_ROOT) == window }
}

fn match_title_and_class_name(window: &WindowInfo, title: &str, class_name: &str) -> bool {
    window.title == title && window.class_name == class_name
}

fn is_known_blocked_window(window: &WindowInfo) -> bool {
    match_title_and_class_name(window, "Task View", "Windows.UI.Core.CoreWindow")
        || match_title_and_class_name(
            window,
            "DesktopWindowXamlSource",
            "Windows.UI.Core.CoreWindow",
        )
        || match_title_and_class_name(window, "PopupHost", "Xaml_WindowedPopupClass")
}

fn is_cloaked_by_shell(window: HWND) -> bool {
    let mut cloaked: DWORD = 0;
    let hr = unsafe {
        DwmGetWindowAttribute(
            window,
            DWMWA_CLOAKED,
            &mut cloaked as *mut _ as *mut _,
            std::mem::size_of::<DWORD>() as u32,
        )
    };
    hr >= 0 && cloaked == DWM_CLOAKED_SHELL
}

fn is_capturable_window(window: &WindowInfo) -> bool {
    if window.title.is_empty()
        || window.handle == get_shell_window()
        || !is_window_visible(window.handle)
        || !is_root_window(window.handle)
    {
        return false;
    }

    let style = unsafe { GetWindowLongW(window.handle, GWL_STYLE) as u32 };
    if style & WS_DISABLED > 0 {
        return false;
    }

    let ex_style = unsafe { GetWindowLongW(window.handle, GWL_EXSTYLE) as u32 };
    if ex_style & WS_EX_TOOLWINDOW > 0 {
        return false;
    }

    if (window.class_name == "Windows.UI.Core.CoreWindow"
        || window.class_name == "ApplicationFrameWindow")
        && is_cloaked_by_shell(window.handle)
    {
        return false;
    }

    !is_known_blocked_window(window)
}

fn read_wide(mut fill: impl FnMut(&mut [u16]) -> i32, capacity: usize) -> String {
    let mut text = vec![0u16; capacity];
    let len = fill(&mut text).clamp(0, capacity as i32) as usize;
    String::from_utf16_lossy(&text[..len])
        .trim_matches(char::from(0))
        .to_string()
}

unsafe extern "system" fn enum_window(handle: HWND, lparam: LPARAM) -> BOOL {
    let window_text_length = GetWindowTextLengthW(handle);
    if window_text_length <= 0 {
        return TRUE;
    }

    let capacity = window_text_length as usize + 1;
    let title = read_wide(
        |text| GetWindowTextW(handle, text.as_mut_ptr(), text.len() as i32),
        capacity,
    );
    let class_name = read_wide(
        |text| GetClassNameW(handle, text.as_mut_ptr(), text.len() as i32),
        256,
    );
    let info = WindowInfo {
        handle,
        title,
        class_name,
    };

    if is_capturable_window(&info) {
        let list = &mut *(lparam as *mut Vec<WindowInfo>);
        list.push(info);
    }

    TRUE
}

fn console_title() -> String {
    let mut text = vec![0u16; 256];
    let len = unsafe { GetConsoleTitleW(text.as_mut_ptr(), text.len() as u32) } as usize;
    String::from_utf16_lossy(&text[..len.min(text.len())])
        .trim_matches(char::from(0))
        .to_string()
}

fn set_console_title(title: &str) {
    let mut wide: Vec<u16> = title.encode_utf16().collect();
    wide.push(0);
    unsafe {
        SetConsoleTitleW(wide.as_ptr());
    }
}

/// Get every top-level window that can be captured.
///
/// The console hosting this process is hidden from the result by giving
/// it a unique title for the duration of the enumeration.
pub fn enumerate_windows() -> anyhow::Result<Vec<CaptureTarget>> {
    // https://support.microsoft.com/en-us/help/124103/how-to-obtain-a-console-window-handle-hwnd
    let current_console_title = console_title();
    let probe_title = uuid::Uuid::new_v4().to_string();
    set_console_title(&probe_title);
    std::thread::sleep(std::time::Duration::from_millis(40));

    let mut window_list = Vec::<WindowInfo>::new();
    let result = unsafe { EnumWindows(Some(enum_window), &mut window_list as *mut _ as LPARAM) };
    let code = unsafe { GetLastError() };

    set_console_title(&current_console_title);

    if result == 0 {
        anyhow::bail!("EnumWindows failed, code {code:#x}");
    }

    let windows = window_list
        .into_iter()
        .filter(|window| window.title != probe_title)
        .enumerate()
        .filter_map(|(index, window)| {
            let (geometry, border) = window_geometry(window.handle)?;
            if geometry.size.is_empty() {
                return None;
            }
            Some(CaptureTarget::window(
                window.handle as isize,
                index,
                window.title,
                geometry,
                border,
            ))
        })
        .collect();

    Ok(windows)
}

/// Capturable windows whose title contains `window_name`, ignoring case.
pub fn find_window(window_name: &str) -> anyhow::Result<Vec<CaptureTarget>> {
    let needle = window_name.to_lowercase();
    Ok(enumerate_windows()?
        .into_iter()
        .filter(|window| window.name.to_lowercase().contains(&needle))
        .collect())
}

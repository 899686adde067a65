use std::ptr;

use winapi::{
    shared::{
        minwindef::UINT,
        windef::{HBITMAP, HDC, HGDIOBJ, HWND},
    },
    um::{
        errhandlingapi::GetLastError,
        wingdi::{
            BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, CreateDCW, DeleteDC,
            DeleteObject, GetDIBits, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
            CAPTUREBLT, DIB_RGB_COLORS, SRCCOPY,
        },
        winuser::{
            GetWindowDC, IsWindow, PrintWindow, ReleaseDC, SystemParametersInfoW,
            ANIMATIONINFO, SPIF_SENDCHANGE, SPIF_UPDATEINIFILE, SPI_SETANIMATION,
        },
    },
};

use crate::{
    error::CaptureError,
    frame::{FrameBuffer, BYTES_PER_PIXEL},
    platform::measure,
    processor::{Backend, CaptureOutcome, FrameProcessor},
    report::Reporter,
    target::{CaptureTarget, TargetKind},
};

const PW_CLIENTONLY: UINT = 0x0000_0001;
const PW_RENDERFULLCONTENT: UINT = 0x0000_0002;

fn last_error() -> u32 {
    unsafe { GetLastError() }
}

enum SourceDc {
    /// From `CreateDCW` on a monitor device.
    Display(HDC),

    /// From `GetWindowDC`.
    Window { window: HWND, dc: HDC },
}

impl SourceDc {
    fn raw(&self) -> HDC {
        match self {
            SourceDc::Display(dc) => *dc,
            SourceDc::Window { dc, .. } => *dc,
        }
    }
}

impl Drop for SourceDc {
    fn drop(&mut self) {
        unsafe {
            match self {
                SourceDc::Display(dc) => {
                    DeleteDC(*dc);
                }
                SourceDc::Window { window, dc } => {
                    ReleaseDC(*window, *dc);
                }
            }
        }
    }
}

struct MemoryDc(HDC);

impl Drop for MemoryDc {
    fn drop(&mut self) {
        unsafe {
            DeleteDC(self.0);
        }
    }
}

struct Bitmap(HBITMAP);

impl Drop for Bitmap {
    fn drop(&mut self) {
        unsafe {
            DeleteObject(self.0 as HGDIOBJ);
        }
    }
}

/// Keeps `bitmap` selected into `dc` until dropped.
struct Selection {
    dc: HDC,
    previous: HGDIOBJ,
}

impl Selection {
    fn new(dc: &MemoryDc, bitmap: &Bitmap) -> Self {
        let previous = unsafe { SelectObject(dc.0, bitmap.0 as HGDIOBJ) };
        Self { dc: dc.0, previous }
    }
}

impl Drop for Selection {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.dc, self.previous);
        }
    }
}

// Declaration order is drop order: the bitmap is released before the DCs.
struct Surfaces {
    bitmap: Bitmap,
    memory: MemoryDc,
    source: SourceDc,
}

/// GDI fallback: copy into a compatible bitmap, then read it back with
/// `GetDIBits` as top-down 32bpp BGRA.
pub struct RasterBlitProcessor {
    surfaces: Option<Surfaces>,
    disable_window_animation: bool,
}

impl RasterBlitProcessor {
    pub fn new() -> Self {
        Self {
            surfaces: None,
            disable_window_animation: false,
        }
    }

    pub fn with_disable_window_animation(mut self, disable: bool) -> Self {
        self.disable_window_animation = disable;
        self
    }

    fn open_source(target: &CaptureTarget) -> Result<SourceDc, CaptureError> {
        match target.kind {
            TargetKind::Monitor => {
                let mut device: Vec<u16> = target.name.encode_utf16().collect();
                device.push(0);
                let dc = unsafe { CreateDCW(ptr::null(), device.as_ptr(), ptr::null(), ptr::null()) };
                if dc.is_null() {
                    return Err(CaptureError::resource("CreateDCW", last_error()));
                }
                Ok(SourceDc::Display(dc))
            }
            TargetKind::Window { .. } => {
                let window = target.handle as HWND;
                if unsafe { IsWindow(window) } == 0 {
                    return Err(CaptureError::target_invalid("IsWindow"));
                }
                let dc = unsafe { GetWindowDC(window) };
                if dc.is_null() {
                    return Err(CaptureError::resource("GetWindowDC", last_error()));
                }
                Ok(SourceDc::Window { window, dc })
            }
        }
    }
}

impl Default for RasterBlitProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn disable_animation(reporter: &mut Reporter) {
    let mut info = ANIMATIONINFO {
        cbSize: std::mem::size_of::<ANIMATIONINFO>() as UINT,
        iMinAnimate: 0,
    };
    let ok = unsafe {
        SystemParametersInfoW(
            SPI_SETANIMATION,
            info.cbSize,
            &mut info as *mut _ as *mut _,
            SPIF_UPDATEINIFILE | SPIF_SENDCHANGE,
        )
    };
    if ok == 0 {
        reporter.report("SystemParametersInfoW", last_error());
    }
}

impl FrameProcessor for RasterBlitProcessor {
    fn backend(&self) -> Backend {
        Backend::Raster
    }

    fn init(
        &mut self,
        target: &CaptureTarget,
        frame: &FrameBuffer,
        reporter: &mut Reporter,
    ) -> Result<(), CaptureError> {
        let size = frame.geometry().size;
        if size.is_empty() {
            return Err(CaptureError::geometry_changed("CreateCompatibleBitmap"));
        }

        if target.is_window() && self.disable_window_animation {
            disable_animation(reporter);
        }

        let source = Self::open_source(target)?;

        let memory = unsafe { CreateCompatibleDC(source.raw()) };
        if memory.is_null() {
            return Err(CaptureError::resource("CreateCompatibleDC", last_error()));
        }
        let memory = MemoryDc(memory);

        let bitmap = unsafe { CreateCompatibleBitmap(source.raw(), size.width, size.height) };
        if bitmap.is_null() {
            return Err(CaptureError::resource("CreateCompatibleBitmap", last_error()));
        }

        self.surfaces = Some(Surfaces {
            bitmap: Bitmap(bitmap),
            memory,
            source,
        });
        Ok(())
    }

    fn capture(
        &mut self,
        target: &CaptureTarget,
        frame: &mut FrameBuffer,
        reporter: &mut Reporter,
    ) -> Result<CaptureOutcome, CaptureError> {
        let surfaces = self
            .surfaces
            .as_ref()
            .ok_or_else(|| CaptureError::resource("RasterBlitProcessor::capture", 0))?;

        let live = measure(target)?;
        if !frame.matches(&live.geometry()) {
            return Err(CaptureError::geometry_changed("RasterBlitProcessor::capture"));
        }

        let width = frame.width() as i32;
        let height = frame.height() as i32;

        {
            let _selection = Selection::new(&surfaces.memory, &surfaces.bitmap);
            let memory = surfaces.memory.0;
            let source = surfaces.source.raw();

            let copied = match live.kind {
                TargetKind::Monitor => unsafe {
                    BitBlt(memory, 0, 0, width, height, source, 0, 0, SRCCOPY | CAPTUREBLT) != 0
                },
                TargetKind::Window { border } => {
                    let window = live.handle as HWND;
                    let printed = unsafe {
                        PrintWindow(window, memory, PW_CLIENTONLY | PW_RENDERFULLCONTENT) != 0
                    };
                    if printed {
                        true
                    } else {
                        reporter.report("PrintWindow", last_error());
                        unsafe {
                            BitBlt(
                                memory,
                                0,
                                0,
                                width,
                                height,
                                source,
                                border.x,
                                border.y,
                                SRCCOPY | CAPTUREBLT,
                            ) != 0
                        }
                    }
                }
            };

            if !copied {
                // usually a locked workstation or a lost permission
                return Err(CaptureError::copy_failed("BitBlt", last_error()));
            }
        }

        let mut info = BITMAPINFO::default();
        info.bmiHeader = BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            // negative height asks for top-down rows
            biHeight: -height,
            biPlanes: 1,
            biBitCount: (BYTES_PER_PIXEL * 8) as u16,
            biCompression: BI_RGB,
            biSizeImage: frame.pixels().len() as u32,
            ..Default::default()
        };

        let lines = unsafe {
            GetDIBits(
                surfaces.memory.0,
                surfaces.bitmap.0,
                0,
                height as UINT,
                frame.pixels_mut().as_mut_ptr() as *mut _,
                &mut info,
                DIB_RGB_COLORS,
            )
        };
        if lines != height {
            return Err(CaptureError::copy_failed("GetDIBits", last_error()));
        }

        Ok(CaptureOutcome::NewFrame)
    }

    fn release(&mut self) {
        self.surfaces = None;
    }
}

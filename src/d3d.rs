use std::{
    mem::zeroed,
    ptr,
    time::Duration,
};

use winapi::{
    shared::{
        dxgi::{
            CreateDXGIFactory1, IDXGIAdapter, IDXGIAdapter1, IDXGIFactory1, IDXGIOutput,
            IDXGIResource, DXGI_OUTPUT_DESC, IID_IDXGIFactory1,
        },
        dxgi1_2::{IDXGIOutput1, IDXGIOutputDuplication, DXGI_OUTDUPL_FRAME_INFO},
        dxgiformat::DXGI_FORMAT_B8G8R8A8_UNORM,
        dxgitype::{DXGI_MODE_ROTATION_ROTATE270, DXGI_MODE_ROTATION_ROTATE90},
        windef::HMONITOR,
        winerror::{
            DXGI_ERROR_NOT_FOUND, DXGI_ERROR_UNSUPPORTED, DXGI_ERROR_WAIT_TIMEOUT,
            E_ACCESSDENIED, HRESULT,
        },
    },
    um::{
        d3d11::{
            D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Resource,
            ID3D11Texture2D, D3D11_CPU_ACCESS_READ, D3D11_MAP_READ, D3D11_SDK_VERSION,
            D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
        },
        d3dcommon::D3D_DRIVER_TYPE_UNKNOWN,
        unknwnbase::IUnknown,
    },
};
use wio::com::ComPtr;

use crate::{
    error::CaptureError,
    frame::FrameBuffer,
    processor::{Backend, CaptureOutcome, FrameProcessor},
    report::Reporter,
    target::{CaptureTarget, Geometry},
};

fn hr_failed(hr: HRESULT) -> bool {
    hr < 0
}

fn create_dxgi_factory_1() -> Result<ComPtr<IDXGIFactory1>, CaptureError> {
    unsafe {
        let mut factory = ptr::null_mut();
        let hr = CreateDXGIFactory1(&IID_IDXGIFactory1, &mut factory);
        if hr_failed(hr) {
            return Err(CaptureError::resource("CreateDXGIFactory1", hr as u32));
        }
        Ok(ComPtr::from_raw(factory as *mut IDXGIFactory1))
    }
}

fn d3d11_create_device(
    adapter: &ComPtr<IDXGIAdapter1>,
) -> Result<(ComPtr<ID3D11Device>, ComPtr<ID3D11DeviceContext>), CaptureError> {
    unsafe {
        let (mut device, mut context) = (ptr::null_mut(), ptr::null_mut());
        let hr = D3D11CreateDevice(
            adapter.as_raw() as *mut IDXGIAdapter,
            D3D_DRIVER_TYPE_UNKNOWN,
            ptr::null_mut(),
            0,
            ptr::null(),
            0,
            D3D11_SDK_VERSION,
            &mut device,
            ptr::null_mut(),
            &mut context,
        );
        if hr_failed(hr) {
            return Err(CaptureError::resource("D3D11CreateDevice", hr as u32));
        }
        Ok((ComPtr::from_raw(device), ComPtr::from_raw(context)))
    }
}

fn output_desc(output: &IDXGIOutput) -> DXGI_OUTPUT_DESC {
    unsafe {
        let mut desc = zeroed();
        output.GetDesc(&mut desc);
        desc
    }
}

fn desktop_geometry(desc: &DXGI_OUTPUT_DESC) -> Geometry {
    let rect = desc.DesktopCoordinates;
    Geometry::from_edges(rect.left, rect.top, rect.right, rect.bottom)
}

/// The adapter and output that drive `monitor`.
fn find_output(
    factory: &ComPtr<IDXGIFactory1>,
    monitor: HMONITOR,
) -> Result<Option<(ComPtr<IDXGIAdapter1>, ComPtr<IDXGIOutput>)>, CaptureError> {
    for adapter_index in 0.. {
        let adapter = unsafe {
            let mut adapter = ptr::null_mut();
            let hr = factory.EnumAdapters1(adapter_index, &mut adapter);
            if hr == DXGI_ERROR_NOT_FOUND {
                return Ok(None);
            }
            if hr_failed(hr) {
                return Err(CaptureError::resource("EnumAdapters1", hr as u32));
            }
            ComPtr::from_raw(adapter)
        };

        for output_index in 0.. {
            let output = unsafe {
                let mut output = ptr::null_mut();
                if hr_failed(adapter.EnumOutputs(output_index, &mut output)) {
                    break;
                }
                ComPtr::<IDXGIOutput>::from_raw(output)
            };

            if output_desc(&output).Monitor == monitor {
                return Ok(Some((adapter, output)));
            }
        }
    }

    Ok(None)
}

/// Releases an acquired duplication frame when dropped.
struct AcquiredFrame<'a>(&'a IDXGIOutputDuplication);

impl Drop for AcquiredFrame<'_> {
    fn drop(&mut self) {
        unsafe {
            self.0.ReleaseFrame();
        }
    }
}

struct Channel {
    device: ComPtr<ID3D11Device>,
    context: ComPtr<ID3D11DeviceContext>,
    output: ComPtr<IDXGIOutput1>,
    duplication: ComPtr<IDXGIOutputDuplication>,
    staging: Option<ComPtr<ID3D11Texture2D>>,
}

impl Channel {
    /// A CPU-readable texture shaped like `source`, created once per size.
    fn staging_texture(
        &mut self,
        source: &D3D11_TEXTURE2D_DESC,
    ) -> Result<ComPtr<ID3D11Texture2D>, CaptureError> {
        if let Some(staging) = &self.staging {
            let mut desc: D3D11_TEXTURE2D_DESC = unsafe { zeroed() };
            unsafe { staging.GetDesc(&mut desc) };
            if desc.Width == source.Width && desc.Height == source.Height {
                return Ok(staging.clone());
            }
        }

        // Make this a staging texture
        let mut desc = *source;
        desc.Usage = D3D11_USAGE_STAGING;
        desc.BindFlags = 0;
        desc.CPUAccessFlags = D3D11_CPU_ACCESS_READ;
        desc.MiscFlags = 0;

        let staging = unsafe {
            let mut texture = ptr::null_mut();
            let hr = self.device.CreateTexture2D(&desc, ptr::null(), &mut texture);
            if hr_failed(hr) {
                return Err(CaptureError::copy_failed("CreateTexture2D", hr as u32));
            }
            ComPtr::from_raw(texture)
        };

        self.staging = Some(staging.clone());
        Ok(staging)
    }
}

/// DXGI desktop duplication of one monitor.
pub struct DuplicationProcessor {
    channel: Option<Channel>,
    timeout: Duration,
}

impl DuplicationProcessor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            channel: None,
            timeout,
        }
    }

    fn timeout_ms(&self) -> u32 {
        self.timeout.as_millis().min(u32::MAX as u128) as u32
    }
}

impl FrameProcessor for DuplicationProcessor {
    fn backend(&self) -> Backend {
        Backend::Duplication
    }

    fn init(
        &mut self,
        target: &CaptureTarget,
        frame: &FrameBuffer,
        _reporter: &mut Reporter,
    ) -> Result<(), CaptureError> {
        if !target.is_monitor() {
            return Err(CaptureError::resource(
                "DuplicateOutput",
                DXGI_ERROR_UNSUPPORTED as u32,
            ));
        }

        let factory = create_dxgi_factory_1()?;
        let (adapter, output) = find_output(&factory, target.handle as HMONITOR)?
            .ok_or_else(|| {
                // the monitor is live but no adapter drives it
                CaptureError::resource("EnumOutputs", DXGI_ERROR_NOT_FOUND as u32)
            })?;

        let desc = output_desc(&output);
        if desc.Rotation == DXGI_MODE_ROTATION_ROTATE90
            || desc.Rotation == DXGI_MODE_ROTATION_ROTATE270
        {
            // duplicated textures are not rotated, leave these to raster copy
            return Err(CaptureError::resource(
                "DuplicateOutput",
                DXGI_ERROR_UNSUPPORTED as u32,
            ));
        }
        if !frame.matches(&desktop_geometry(&desc)) {
            return Err(CaptureError::geometry_changed("IDXGIOutput::GetDesc"));
        }

        let (device, context) = d3d11_create_device(&adapter)?;
        let output = output
            .cast::<IDXGIOutput1>()
            .map_err(|hr| CaptureError::resource("IDXGIOutput1", hr as u32))?;

        let duplication = unsafe {
            let mut duplication = ptr::null_mut();
            let hr = output.DuplicateOutput(device.as_raw() as *mut IUnknown, &mut duplication);
            if hr == E_ACCESSDENIED {
                // secure desktop or lock screen
                return Err(CaptureError::session("DuplicateOutput", hr as u32));
            }
            if hr_failed(hr) {
                return Err(CaptureError::resource("DuplicateOutput", hr as u32));
            }
            ComPtr::from_raw(duplication)
        };

        self.channel = Some(Channel {
            device,
            context,
            output,
            duplication,
            staging: None,
        });
        Ok(())
    }

    fn capture(
        &mut self,
        _target: &CaptureTarget,
        frame: &mut FrameBuffer,
        _reporter: &mut Reporter,
    ) -> Result<CaptureOutcome, CaptureError> {
        let timeout_ms = self.timeout_ms();
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| CaptureError::resource("DuplicationProcessor::capture", 0))?;

        if !frame.matches(&desktop_geometry(&output_desc(&channel.output))) {
            return Err(CaptureError::geometry_changed("IDXGIOutput::GetDesc"));
        }

        let duplication = channel.duplication.clone();
        let mut frame_info: DXGI_OUTDUPL_FRAME_INFO = unsafe { zeroed() };
        let resource = unsafe {
            let mut resource: *mut IDXGIResource = ptr::null_mut();
            let hr = duplication.AcquireNextFrame(timeout_ms, &mut frame_info, &mut resource);
            if hr == DXGI_ERROR_WAIT_TIMEOUT {
                return Ok(CaptureOutcome::NoUpdate);
            }
            if hr == E_ACCESSDENIED {
                return Err(CaptureError::session("AcquireNextFrame", hr as u32));
            }
            if hr_failed(hr) {
                // access lost: mode change, desktop switch or device reset
                return Err(CaptureError::channel_lost("AcquireNextFrame", hr as u32));
            }
            ComPtr::from_raw(resource)
        };
        let acquired = AcquiredFrame(&*duplication);

        // only the pointer moved
        if frame_info.AccumulatedFrames == 0 {
            return Ok(CaptureOutcome::NoUpdate);
        }

        let texture = resource
            .cast::<ID3D11Texture2D>()
            .map_err(|hr| CaptureError::channel_lost("IDXGIResource", hr as u32))?;
        let desc = unsafe {
            let mut desc: D3D11_TEXTURE2D_DESC = zeroed();
            texture.GetDesc(&mut desc);
            desc
        };
        if desc.Width != frame.width() || desc.Height != frame.height() {
            return Err(CaptureError::geometry_changed("ID3D11Texture2D::GetDesc"));
        }
        if desc.Format != DXGI_FORMAT_B8G8R8A8_UNORM {
            return Err(CaptureError::copy_failed("ID3D11Texture2D::GetDesc", desc.Format));
        }

        let staging = channel.staging_texture(&desc)?;
        unsafe {
            channel.context.CopyResource(
                staging.as_raw() as *mut ID3D11Resource,
                texture.as_raw() as *mut ID3D11Resource,
            );
        }
        drop(acquired);

        let staging_resource = staging.as_raw() as *mut ID3D11Resource;
        let mapped = unsafe {
            let mut mapped = zeroed();
            let hr = channel
                .context
                .Map(staging_resource, 0, D3D11_MAP_READ, 0, &mut mapped);
            if hr_failed(hr) {
                return Err(CaptureError::copy_failed("ID3D11DeviceContext::Map", hr as u32));
            }
            mapped
        };

        let pitch = mapped.RowPitch as usize;
        let copied = {
            let slice: &[u8] = unsafe {
                std::slice::from_raw_parts(
                    mapped.pData as *const u8,
                    pitch * frame.height() as usize,
                )
            };
            frame.copy_rows_from(slice, pitch)
        };

        unsafe {
            channel.context.Unmap(staging_resource, 0);
        }

        if !copied {
            return Err(CaptureError::copy_failed("ID3D11DeviceContext::Map", 0));
        }

        Ok(CaptureOutcome::NewFrame)
    }

    fn release(&mut self) {
        self.channel = None;
    }
}

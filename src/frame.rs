use crate::target::{CaptureTarget, Geometry};

/// Bytes per pixel of every delivered frame (B, G, R, A).
pub const BYTES_PER_PIXEL: usize = 4;

/// Pixel store for one capture target.
///
/// Pixels are always 32bpp BGRA with rows top-down and no row padding, so
/// `stride() == width() * 4`. The backing store only grows while the same
/// target is captured; switching to another target rebuilds it at the exact
/// size.
#[derive(Clone, Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
    geometry: Geometry,
    owner: Option<CaptureTarget>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_target(target: &CaptureTarget) -> Self {
        let mut frame = Self::new();
        frame.reset(target);
        frame
    }

    /// Adopt the geometry of a new incarnation of `target`.
    pub fn reset(&mut self, target: &CaptureTarget) {
        let geometry = target.geometry();
        let required = required_len(&geometry);

        let same_owner = self
            .owner
            .as_ref()
            .map_or(false, |owner| owner.same_identity(target));

        if !same_owner {
            self.data = vec![0u8; required];
        } else if self.data.len() < required {
            self.data.resize(required, 0);
        }

        self.geometry = geometry;
        self.owner = Some(target.clone());
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Whether `live` is exactly the geometry this buffer was sized for.
    pub fn matches(&self, live: &Geometry) -> bool {
        self.geometry == *live
    }

    pub fn width(&self) -> u32 {
        self.geometry.size.width.max(0) as u32
    }

    pub fn height(&self) -> u32 {
        self.geometry.size.height.max(0) as u32
    }

    pub fn stride(&self) -> usize {
        self.width() as usize * BYTES_PER_PIXEL
    }

    /// Allocated bytes, which may exceed the current frame.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.data[..len]
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        let begin = y as usize * stride;
        &self.pixels()[begin..begin + stride]
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = x as usize * BYTES_PER_PIXEL;
        let row = self.row(y);
        [row[offset], row[offset + 1], row[offset + 2], row[offset + 3]]
    }

    /// Copy rows of `src` laid out with `src_pitch` bytes per row into the
    /// tightly packed buffer. Returns `false` if `src` is too short.
    pub fn copy_rows_from(&mut self, src: &[u8], src_pitch: usize) -> bool {
        let stride = self.stride();
        let rows = self.height() as usize;
        if src_pitch < stride || rows == 0 {
            return rows == 0;
        }
        if src.len() < (rows - 1) * src_pitch + stride {
            return false;
        }

        for (row, dst) in self.pixels_mut().chunks_exact_mut(stride).enumerate() {
            let begin = row * src_pitch;
            dst.copy_from_slice(&src[begin..begin + stride]);
        }
        true
    }

    fn len(&self) -> usize {
        required_len(&self.geometry)
    }
}

fn required_len(geometry: &Geometry) -> usize {
    let width = geometry.size.width.max(0) as usize;
    let height = geometry.size.height.max(0) as usize;
    width * height * BYTES_PER_PIXEL
}

#[cfg(feature = "img")]
pub mod img;

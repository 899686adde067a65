use image::RgbaImage;

use super::*;

impl FrameBuffer {
    /// Copy the frame into an [image] buffer, swapping B and R.
    ///
    /// Required features: *`"img"`*
    /// # Examples
    /// ```no_run
    /// # fn save(frame: &deskcapture::FrameBuffer) {
    /// let image = frame.to_rgba_image().expect("empty frame");
    /// image.save("frame.png").expect("Failed to save");
    /// # }
    /// ```
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        let mut rgba = self.pixels().to_vec();
        for pixel in rgba.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.swap(0, 2);
        }

        RgbaImage::from_raw(self.width(), self.height(), rgba)
    }
}

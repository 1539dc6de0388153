//! Image preprocessing for YOLOv8 ONNX models.

use anyhow::{bail, Result};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;
use tracing::debug;

/// Gray used by Ultralytics for letterbox padding
const PAD_VALUE: u8 = 114;

/// A letterboxed input tensor plus the transform needed to map model
/// coordinates back onto the original image
#[derive(Debug, Clone)]
pub struct Letterbox {
    /// Shape [1, 3, size, size], values in [0, 1]
    pub tensor: Array4<f32>,
    pub size: u32,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Map a point from model input space to original image space
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }

    /// Map a point from original image space to model input space
    pub fn to_model(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale + self.pad_x, y * self.scale + self.pad_y)
    }
}

/// Resize preserving aspect ratio, pad to `size` x `size` and convert to NCHW
///
/// # Arguments
///
/// * `image` - Input DynamicImage
/// * `size` - Square model input size (640 for the stock YOLOv8 export)
pub fn letterbox(image: &DynamicImage, size: u32) -> Result<Letterbox> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 || size == 0 {
        bail!("Cannot letterbox an empty image ({}x{})", width, height);
    }

    debug!("Letterboxing {}x{} image to {}x{}", width, height, size, size);

    let scale = size as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);

    let resized = image
        .resize_exact(new_width, new_height, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let pad_x = (size - new_width) / 2;
    let pad_y = (size - new_height) / 2;

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    image::imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
    }

    Ok(Letterbox {
        tensor,
        size,
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
    })
}

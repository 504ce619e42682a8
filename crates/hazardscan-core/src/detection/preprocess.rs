//! Letterbox preprocessing for YOLOv8 detectors.
//!
//! The image is scaled to fit `size × size` with its aspect ratio kept, padded
//! with gray (114) on both sides, scaled to [0, 1], and laid out as NCHW RGB.

use image::{imageops, DynamicImage, Rgb, RgbImage};
use ndarray::Array4;

const CHANNELS: usize = 3;
const PAD_VALUE: u8 = 114;

/// Letterbox `image` into a `[1, 3, size, size]` tensor.
pub fn letterbox(image: &DynamicImage, size: u32) -> Array4<f32> {
    let (width, height) = (image.width().max(1), image.height().max(1));
    let ratio = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * ratio).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * ratio).round() as u32).clamp(1, size);

    let resized = image
        .resize_exact(new_w, new_h, imageops::FilterType::Triangle)
        .to_rgb8();

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    let side = size as usize;
    let plane = side * side;
    let mut tensor = Array4::<f32>::zeros((1, CHANNELS, side, side));
    if let Some(data) = tensor.as_slice_mut() {
        for (i, pixel) in canvas.as_raw().chunks_exact(CHANNELS).enumerate() {
            for (c, &val) in pixel.iter().enumerate() {
                data[c * plane + i] = val as f32 / 255.0;
            }
        }
    }
    tensor
}

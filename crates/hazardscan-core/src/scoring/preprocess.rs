//! Image preprocessing for the CLIP vision encoder.
//!
//! CLIP ViT-B/32 expects:
//! - Input size: 224×224 pixels, shortest side resized then center-cropped
//! - Normalization: per-channel (pixel/255 - mean) / std with the OpenAI constants
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::DynamicImage;
use ndarray::Array4;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// CLIP normalization mean (per-channel, RGB).
const NORM_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std (per-channel, RGB).
const NORM_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_1];

/// Preprocess an image for CLIP inference.
///
/// Resizes the shortest side to `image_size` (bicubic), center-crops to a
/// square, normalizes, and returns an NCHW tensor suitable for ONNX Runtime.
pub fn preprocess(image: &DynamicImage, image_size: u32) -> Array4<f32> {
    let cropped = image.resize_to_fill(
        image_size,
        image_size,
        image::imageops::FilterType::CatmullRom,
    );
    let rgb = cropped.to_rgb8();

    let size = image_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, CHANNELS, size, size));

    // A freshly allocated Array4 is in standard layout, so the slice is always present.
    let plane = size * size;
    if let Some(data) = tensor.as_slice_mut() {
        for (i, pixel) in rgb.as_raw().chunks_exact(CHANNELS).enumerate() {
            for (c, &val) in pixel.iter().enumerate() {
                // NCHW layout: offset = c * size * size + y * size + x
                data[c * plane + i] = (val as f32 / 255.0 - NORM_MEAN[c]) / NORM_STD[c];
            }
        }
    }

    tensor
}

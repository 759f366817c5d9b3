//! Image preprocessing
//!
//! bytes -> decode -> RGB -> 256x256 bilinear -> /255 -> CHW -> batch of 1.
//! Every step is a pure function of its input, so the same bytes always give
//! a bit-identical tensor.

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{DynamicImage, Rgb, RgbImage};

use crate::utils::error::{ClassifierError, Result};

/// Side length the model expects
pub const IMAGE_SIZE: usize = 256;

/// Number of color channels after conversion
pub const CHANNELS: usize = 3;

/// Decode raw bytes in any format the `image` crate understands
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(ClassifierError::Decode("empty input".to_string()));
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Bilinear (triangle filter) resize with anti-aliasing.
///
/// Same filter shape as PIL's `BILINEAR`, but evaluated in a single 2D pass
/// in f32 with one rounding at the end. PIL runs two separable fixed-point
/// passes and rounds to u8 in between, so outputs can differ by a level.
///
/// Converts to RGB first: alpha is dropped, grayscale is replicated into all
/// three channels. When downscaling the triangle kernel is stretched by the
/// scale factor so every source pixel contributes.
pub fn bilinear_resize(img: &DynamicImage, target_width: u32, target_height: u32) -> RgbImage {
    let src = img.to_rgb8();
    let src_width = src.width() as usize;
    let src_height = src.height() as usize;
    let target_width = target_width as usize;
    let target_height = target_height as usize;

    let mut dst = RgbImage::new(target_width as u32, target_height as u32);

    let x_scale = src_width as f32 / target_width as f32;
    let y_scale = src_height as f32 / target_height as f32;

    let support_x = x_scale.max(1.0);
    let support_y = y_scale.max(1.0);

    for dy in 0..target_height {
        let src_cy = (dy as f32 + 0.5) * y_scale;
        let y_min = (src_cy - support_y).floor().max(0.0) as usize;
        let y_max = (src_cy + support_y).ceil().min(src_height as f32 - 1.0) as usize;

        for dx in 0..target_width {
            let src_cx = (dx as f32 + 0.5) * x_scale;
            let x_min = (src_cx - support_x).floor().max(0.0) as usize;
            let x_max = (src_cx + support_x).ceil().min(src_width as f32 - 1.0) as usize;

            let mut total_weight = 0.0f32;
            let mut weighted_sum = [0.0f32; 3];

            for sy in y_min..=y_max {
                let dist_y = ((sy as f32 + 0.5) - src_cy).abs() / support_y;
                if dist_y >= 1.0 {
                    continue;
                }
                let weight_y = 1.0 - dist_y;

                for sx in x_min..=x_max {
                    let dist_x = ((sx as f32 + 0.5) - src_cx).abs() / support_x;
                    if dist_x >= 1.0 {
                        continue;
                    }
                    let weight = (1.0 - dist_x) * weight_y;

                    let pixel = src.get_pixel(sx as u32, sy as u32);
                    weighted_sum[0] += pixel[0] as f32 * weight;
                    weighted_sum[1] += pixel[1] as f32 * weight;
                    weighted_sum[2] += pixel[2] as f32 * weight;
                    total_weight += weight;
                }
            }

            if total_weight > 0.0 {
                dst.put_pixel(
                    dx as u32,
                    dy as u32,
                    Rgb([
                        (weighted_sum[0] / total_weight).round().clamp(0.0, 255.0) as u8,
                        (weighted_sum[1] / total_weight).round().clamp(0.0, 255.0) as u8,
                        (weighted_sum[2] / total_weight).round().clamp(0.0, 255.0) as u8,
                    ]),
                );
            }
        }
    }

    dst
}

/// Scale to [0, 1] and lay out channel-first: all R, then all G, then all B
pub fn to_chw(image: &RgbImage) -> Vec<f32> {
    let num_pixels = (image.width() * image.height()) as usize;
    let mut chw = vec![0.0f32; CHANNELS * num_pixels];

    for (i, pixel) in image.pixels().enumerate() {
        chw[i] = pixel[0] as f32 / 255.0;
        chw[num_pixels + i] = pixel[1] as f32 / 255.0;
        chw[2 * num_pixels + i] = pixel[2] as f32 / 255.0;
    }

    chw
}

/// A `[1, 3, size, size]` float buffer ready to become a tensor
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedImage {
    data: Vec<f32>,
    size: usize,
}

impl PreprocessedImage {
    /// Tensor shape: batch, channels, height, width
    pub fn shape(&self) -> [usize; 4] {
        [1, CHANNELS, self.size, self.size]
    }

    /// Flat CHW values
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Move the buffer onto a device
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::from_data(TensorData::new(self.data.clone(), self.shape()), device)
    }
}

/// Resize and normalize an already-decoded image
pub fn preprocess(image: &DynamicImage, size: usize) -> PreprocessedImage {
    let resized = bilinear_resize(image, size as u32, size as u32);
    PreprocessedImage {
        data: to_chw(&resized),
        size,
    }
}

/// Decode and preprocess in one step
pub fn preprocess_bytes(bytes: &[u8], size: usize) -> Result<PreprocessedImage> {
    let image = decode_image(bytes)?;
    Ok(preprocess(&image, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_any_size_yields_fixed_shape() {
        for (w, h) in [(64, 64), (1024, 768), (300, 97), (1, 1)] {
            let pre = preprocess(&gradient(w, h), IMAGE_SIZE);
            assert_eq!(pre.shape(), [1, 3, 256, 256]);
            assert_eq!(pre.data().len(), 3 * 256 * 256);
        }
    }

    #[test]
    fn test_values_in_unit_range() {
        let pre = preprocess(&gradient(500, 400), IMAGE_SIZE);
        assert!(pre.data().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_solid_color_survives_resize() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 90, Rgb([255, 0, 51])));
        let pre = preprocess(&img, IMAGE_SIZE);
        let plane = 256 * 256;
        assert!(pre.data()[..plane].iter().all(|&v| v == 1.0));
        assert!(pre.data()[plane..2 * plane].iter().all(|&v| v == 0.0));
        assert!(pre.data()[2 * plane..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_chw_layout() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        assert_eq!(to_chw(&img), vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_preprocessing_is_deterministic() {
        let bytes = encode(&gradient(333, 222), ImageFormat::Png);
        let a = preprocess_bytes(&bytes, IMAGE_SIZE).unwrap();
        let b = preprocess_bytes(&bytes, IMAGE_SIZE).unwrap();
        let a_bits: Vec<u32> = a.data().iter().map(|v| v.to_bits()).collect();
        let b_bits: Vec<u32> = b.data().iter().map(|v| v.to_bits()).collect();
        assert_eq!(a_bits, b_bits);
    }

    #[test]
    fn test_grayscale_expands_to_three_channels() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(50, 50, Luma([128])));
        let bytes = encode(&gray, ImageFormat::Png);
        let pre = preprocess_bytes(&bytes, IMAGE_SIZE).unwrap();
        let plane = 256 * 256;
        let expected = 128.0 / 255.0;
        for c in 0..3 {
            assert!((pre.data()[c * plane] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rgba_drops_alpha() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([10, 20, 30, 0])));
        let bytes = encode(&rgba, ImageFormat::Png);
        let pre = preprocess_bytes(&bytes, IMAGE_SIZE).unwrap();
        assert_eq!(pre.shape(), [1, 3, 256, 256]);
        assert!((pre.data()[0] - 10.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_corrupt_bytes_are_decode_errors() {
        assert!(decode_image(&[]).unwrap_err().is_decode());
        assert!(decode_image(b"not an image at all").unwrap_err().is_decode());

        let mut truncated = encode(&gradient(64, 64), ImageFormat::Png);
        truncated.truncate(40);
        assert!(preprocess_bytes(&truncated, IMAGE_SIZE).unwrap_err().is_decode());
    }

    #[test]
    fn test_to_tensor_shape() {
        let device = Default::default();
        let pre = preprocess(&gradient(10, 10), 32);
        let tensor = pre.to_tensor::<burn_ndarray::NdArray<f32>>(&device);
        assert_eq!(tensor.dims(), [1, 3, 32, 32]);
    }
}

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

use crate::error::{Result, SaveError};

/// A single image of a batch: `height × width × channels` samples in `[0, 1]`,
/// row-major and channel-interleaved.
///
/// Supported channel counts are 1 (greyscale), 3 (RGB) and 4 (RGBA).
/// Values outside `[0, 1]` are clipped when the image is quantised for encoding.
///
/// # Example
///
/// ```rust
/// use image_save_meta::tensor::ImageTensor;
///
/// let black = ImageTensor::new(2, 2, 3, vec![0.0; 12]).unwrap();
/// assert_eq!(black.dimensions(), (2, 2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<f32>,
}

impl ImageTensor {
    /// Build a tensor, checking the shape against the sample buffer.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SaveError::InvalidTensor(format!(
                "dimensions must be non-zero, got {width}x{height}"
            )));
        }
        if !matches!(channels, 1 | 3 | 4) {
            return Err(SaveError::InvalidTensor(format!(
                "expected 1, 3 or 4 channels, got {channels}"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(SaveError::InvalidTensor(format!(
                "{width}x{height}x{channels} needs {expected} samples, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// A tensor with every sample set to `value`.
    pub fn filled(width: u32, height: u32, channels: u8, value: f32) -> Result<Self> {
        let len = width as usize * height as usize * channels as usize;
        Self::new(width, height, channels, vec![value; len])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    fn sample(&self, x: u32, y: u32, c: u8) -> u8 {
        let idx = (y as usize * self.width as usize + x as usize) * self.channels as usize
            + c as usize;
        quantize(self.data[idx])
    }

    /// Quantise to an 8-bit pixel buffer the encoders accept.
    pub fn to_dynamic_image(&self) -> DynamicImage {
        match self.channels {
            1 => DynamicImage::ImageLuma8(GrayImage::from_fn(self.width, self.height, |x, y| {
                Luma([self.sample(x, y, 0)])
            })),
            3 => DynamicImage::ImageRgb8(RgbImage::from_fn(self.width, self.height, |x, y| {
                Rgb([self.sample(x, y, 0), self.sample(x, y, 1), self.sample(x, y, 2)])
            })),
            _ => DynamicImage::ImageRgba8(RgbaImage::from_fn(self.width, self.height, |x, y| {
                Rgba([
                    self.sample(x, y, 0),
                    self.sample(x, y, 1),
                    self.sample(x, y, 2),
                    self.sample(x, y, 3),
                ])
            })),
        }
    }
}

impl From<&DynamicImage> for ImageTensor {
    fn from(img: &DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        let color = img.color();
        let (channels, data) = if color.has_color() || color.has_alpha() {
            if color.has_alpha() {
                (4, img.to_rgba32f().into_raw())
            } else {
                (3, img.to_rgb32f().into_raw())
            }
        } else {
            let data = img
                .to_luma8()
                .into_raw()
                .into_iter()
                .map(|v| v as f32 / 255.0)
                .collect();
            (1, data)
        };
        Self {
            width,
            height,
            channels,
            data,
        }
    }
}

/// `[0, 1]` → `0..=255`, clipped and truncated.
fn quantize(v: f32) -> u8 {
    (v * 255.0).clamp(0.0, 255.0) as u8
}

//! Decoded pixel frames

use image::DynamicImage;

use crate::{sample_len, PrepError};

/// Decoded 8-bit interleaved pixels, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFrame {
    /// Pixel data (width * height * channels)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Interleaved channels per pixel (1, 3 or 4)
    pub channels: u32,
}

impl PixelFrame {
    /// Create a frame from raw interleaved data
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u32) -> Result<Self, PrepError> {
        let expected = sample_len(&[width, height, channels]).ok_or_else(|| {
            PrepError::InvalidShape(format!("{}x{}x{} frame is too large", width, height, channels))
        })?;
        if data.len() != expected {
            return Err(PrepError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Convert a decoded image to `channels` (gray, RGB or RGBA)
    pub fn from_image(img: &DynamicImage, channels: u32) -> Result<Self, PrepError> {
        let (width, height) = (img.width(), img.height());
        let data = match channels {
            1 => img.to_luma8().into_raw(),
            3 => img.to_rgb8().into_raw(),
            4 => img.to_rgba8().into_raw(),
            other => return Err(PrepError::UnsupportedChannels(other)),
        };
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let c = self.channels as usize;
        let idx = (y as usize * self.width as usize + x as usize) * c;
        Some(&self.data[idx..idx + c])
    }

    /// Resize using nearest-neighbour sampling
    pub fn resize(&self, new_width: u32, new_height: u32) -> PixelFrame {
        if new_width == self.width && new_height == self.height {
            return self.clone();
        }

        let c = self.channels as usize;
        let mut resized = Vec::with_capacity(new_width as usize * new_height as usize * c);

        let x_ratio = self.width as f32 / new_width as f32;
        let y_ratio = self.height as f32 / new_height as f32;

        for y in 0..new_height {
            for x in 0..new_width {
                let src_x = ((x as f32 * x_ratio).floor() as u32).min(self.width.saturating_sub(1));
                let src_y = ((y as f32 * y_ratio).floor() as u32).min(self.height.saturating_sub(1));

                match self.get_pixel(src_x, src_y) {
                    Some(pixel) => resized.extend_from_slice(pixel),
                    None => resized.extend(std::iter::repeat(0).take(c)),
                }
            }
        }

        PixelFrame {
            data: resized,
            width: new_width,
            height: new_height,
            channels: self.channels,
        }
    }
}

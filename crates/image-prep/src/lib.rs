//! Image Preprocessing
//!
//! Turns decoded images into the input bytes a classifier consumes:
//! - decoding from files or encoded bytes
//! - channel conversion and resizing to the model's declared `[h, w, c]`
//! - normalisation to NHWC f32 values in native byte order
//! - an explicit size check before anything reaches the model

pub mod frame;

pub use frame::PixelFrame;

use std::path::Path;

use ndarray::Array4;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Size of one f32 element in bytes
const FLOAT_BYTES: usize = 4;

/// Preprocessing error types
#[derive(Error, Debug)]
pub enum PrepError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u32),

    #[error("Invalid input shape: {0}")]
    InvalidShape(String),

    #[error("Shape mismatch: expected {expected} bytes, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Channel mismatch: model expects {expected}, frame has {actual}")]
    ChannelMismatch { expected: u32, actual: u32 },
}

/// Per-byte normalisation: `value = byte * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Normalization {
    pub scale: f32,
    pub offset: f32,
}

impl Default for Normalization {
    fn default() -> Self {
        Self::unit()
    }
}

impl Normalization {
    /// 0..255 to 0..1
    pub fn unit() -> Self {
        Self {
            scale: 1.0 / 255.0,
            offset: 0.0,
        }
    }

    /// 0..255 to -1..1
    pub fn symmetric() -> Self {
        Self {
            scale: 1.0 / 127.5,
            offset: -1.0,
        }
    }

    /// Bytes as-is
    pub fn raw() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub fn apply(&self, byte: u8) -> f32 {
        byte as f32 * self.scale + self.offset
    }
}

/// Model input geometry (NHWC, batch of one)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl InputSpec {
    /// Build from an NHWC tensor shape
    pub fn from_nhwc(dims: &[i64]) -> Result<Self, PrepError> {
        let invalid = || PrepError::InvalidShape(format!("{:?} is not a positive NHWC shape", dims));
        let positive = |d: i64| u32::try_from(d).ok().filter(|&d| d > 0).ok_or_else(invalid);

        let spec = match dims {
            [_, h, w, c] => Self {
                height: positive(*h)?,
                width: positive(*w)?,
                channels: positive(*c)?,
            },
            _ => return Err(invalid()),
        };
        sample_len(&[spec.height, spec.width, spec.channels, FLOAT_BYTES as u32]).ok_or_else(|| {
            PrepError::InvalidShape(format!("{:?} is too large to address", dims))
        })?;
        Ok(spec)
    }

    /// Byte length of one f32 sample
    pub fn byte_len(&self) -> usize {
        self.height as usize * self.width as usize * self.channels as usize * FLOAT_BYTES
    }
}

/// Product of `dims` in `usize`, `None` on overflow
pub(crate) fn sample_len(dims: &[u32]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
}

/// Decode an image file
pub fn decode_file(path: impl AsRef<Path>, channels: u32) -> Result<PixelFrame, PrepError> {
    let path = path.as_ref();
    let img = image::open(path)?;
    debug!("Decoded {} ({}x{})", path.display(), img.width(), img.height());
    PixelFrame::from_image(&img, channels)
}

/// Decode an encoded image (PNG, JPEG, ...) held in memory
pub fn decode_bytes(bytes: &[u8], channels: u32) -> Result<PixelFrame, PrepError> {
    let img = image::load_from_memory(bytes)?;
    PixelFrame::from_image(&img, channels)
}

/// Resize and normalise `frame` into NHWC f32 bytes matching `spec`
pub fn preprocess(frame: &PixelFrame, spec: &InputSpec, norm: &Normalization) -> Result<Vec<u8>, PrepError> {
    if frame.channels != spec.channels {
        return Err(PrepError::ChannelMismatch {
            expected: spec.channels,
            actual: frame.channels,
        });
    }

    let resized = frame.resize(spec.width, spec.height);
    let (h, w, c) = (spec.height as usize, spec.width as usize, spec.channels as usize);

    let tensor = Array4::<f32>::from_shape_fn((1, h, w, c), |(_, y, x, ch)| {
        norm.apply(resized.data[(y * w + x) * c + ch])
    });

    let mut bytes = Vec::with_capacity(spec.byte_len());
    for value in tensor.iter() {
        bytes.extend_from_slice(&value.to_ne_bytes());
    }

    debug!(
        "Preprocessed {}x{} frame into {}x{}x{} input ({} bytes)",
        frame.width,
        frame.height,
        spec.height,
        spec.width,
        spec.channels,
        bytes.len()
    );
    Ok(bytes)
}

/// Precondition check: `bytes` must be exactly one input sample
pub fn check_input(bytes: &[u8], spec: &InputSpec) -> Result<(), PrepError> {
    if bytes.len() != spec.byte_len() {
        return Err(PrepError::ShapeMismatch {
            expected: spec.byte_len(),
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// The frame's pixel bytes copied as-is, without resizing or conversion
pub fn raw_pixel_bytes(frame: &PixelFrame) -> Vec<u8> {
    frame.data.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_input_spec_from_shape() {
        let spec = InputSpec::from_nhwc(&[1, 224, 224, 3]).unwrap();
        assert_eq!(spec.byte_len(), 224 * 224 * 3 * 4);
        assert!(InputSpec::from_nhwc(&[1, 10]).is_err());
        assert!(InputSpec::from_nhwc(&[1, 0, 4, 3]).is_err());
    }

    #[test]
    fn test_input_spec_large_dims() {
        let spec = InputSpec::from_nhwc(&[1, 70000, 70000, 3]).unwrap();
        assert_eq!(spec.byte_len(), 70000usize * 70000 * 3 * 4);

        assert!(matches!(
            InputSpec::from_nhwc(&[1, 5_000_000_000, 2, 3]),
            Err(PrepError::InvalidShape(_))
        ));
        assert!(matches!(
            InputSpec::from_nhwc(&[1, u32::MAX as i64, u32::MAX as i64, 4]),
            Err(PrepError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_preprocess_layout_and_norm() {
        let frame = PixelFrame::new(vec![0, 255, 51, 102, 153, 204], 2, 1, 3).unwrap();
        let spec = InputSpec { height: 1, width: 2, channels: 3 };

        let bytes = preprocess(&frame, &spec, &Normalization::raw()).unwrap();
        assert_eq!(floats(&bytes), vec![0.0, 255.0, 51.0, 102.0, 153.0, 204.0]);

        let bytes = preprocess(&frame, &spec, &Normalization::unit()).unwrap();
        let values = floats(&bytes);
        assert!((values[1] - 1.0).abs() < 1e-6);
        assert!((values[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_resizes() {
        let frame = PixelFrame::new(vec![7; 8 * 8], 8, 8, 1).unwrap();
        let spec = InputSpec { height: 4, width: 2, channels: 1 };
        let bytes = preprocess(&frame, &spec, &Normalization::symmetric()).unwrap();
        assert!(check_input(&bytes, &spec).is_ok());
    }

    #[test]
    fn test_channel_mismatch() {
        let frame = PixelFrame::new(vec![0; 4], 2, 2, 1).unwrap();
        let spec = InputSpec { height: 2, width: 2, channels: 3 };
        assert!(matches!(
            preprocess(&frame, &spec, &Normalization::unit()),
            Err(PrepError::ChannelMismatch { expected: 3, actual: 1 })
        ));
    }

    #[test]
    fn test_raw_bytes_fail_precondition() {
        let frame = PixelFrame::new(vec![1; 2 * 2 * 4], 2, 2, 4).unwrap();
        let spec = InputSpec { height: 2, width: 2, channels: 4 };
        let raw = raw_pixel_bytes(&frame);
        assert_eq!(raw.len(), 16);
        assert!(matches!(
            check_input(&raw, &spec),
            Err(PrepError::ShapeMismatch { expected: 64, actual: 16 })
        ));
    }

    #[test]
    fn test_decode_bytes_png() {
        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let mut encoded = std::io::Cursor::new(Vec::new());
        img.write_to(&mut encoded, image::ImageFormat::Png).unwrap();

        let frame = decode_bytes(encoded.get_ref(), 3).unwrap();
        assert_eq!((frame.width, frame.height), (3, 2));
        assert_eq!(frame.get_pixel(2, 1), Some(&[10u8, 20, 30][..]));

        assert!(matches!(decode_bytes(b"garbage", 3), Err(PrepError::Decode(_))));
    }

    proptest! {
        #[test]
        fn prop_preprocess_always_matches_spec(
            fw in 1u32..16, fh in 1u32..16,
            w in 1u32..16, h in 1u32..16,
        ) {
            let frame = PixelFrame::new(vec![128; (fw * fh * 3) as usize], fw, fh, 3).unwrap();
            let spec = InputSpec { height: h, width: w, channels: 3 };
            let bytes = preprocess(&frame, &spec, &Normalization::unit()).unwrap();
            prop_assert_eq!(bytes.len(), spec.byte_len());
        }
    }
}

//! Output image encoder.
//!
//! Renders any logical [`Image`] into an encoded response body:
//!
//! - **PNG**: lossless, 1 to 4 channels
//! - **JPEG**: gray or RGB, quality 1..=100 (alpha is dropped)
//! - **BIL**: raw little-endian float32 samples, interleaved
//!
//! 8-bit outputs round and clamp samples to `0..=255`.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, RgbImage, RgbaImage};

use crate::error::EncodeError;
use crate::raster::{read_all, Image};

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Encoded output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Bil,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Bil => "bil",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Bil => "image/x-bil;bits=32",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" | "image/png" => Ok(OutputFormat::Png),
            "jpeg" | "jpg" | "image/jpeg" => Ok(OutputFormat::Jpeg),
            "bil" | "image/x-bil;bits=32" => Ok(OutputFormat::Bil),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Output Encoder
// =============================================================================

/// Encoder turning logical images into response bodies.
#[derive(Debug, Clone)]
pub struct OutputEncoder {
    quality: u8,
}

impl OutputEncoder {
    pub fn new() -> Self {
        Self::with_quality(DEFAULT_JPEG_QUALITY)
    }

    /// JPEG quality, clamped to 1..=100.
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: clamp_quality(quality),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode the whole image.
    pub fn encode(&self, image: &dyn Image, format: OutputFormat) -> Result<Bytes, EncodeError> {
        let samples = read_all(image);

        match format {
            OutputFormat::Bil => Ok(Bytes::from(
                samples
                    .iter()
                    .flat_map(|v| v.to_le_bytes())
                    .collect::<Vec<u8>>(),
            )),
            OutputFormat::Png => {
                let img = to_dynamic(image, &samples, format)?;
                let mut output = Vec::new();
                img.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
                    .map_err(|e| EncodeError::Image {
                        format: format.as_str(),
                        message: e.to_string(),
                    })?;
                Ok(Bytes::from(output))
            }
            OutputFormat::Jpeg => {
                let img = match to_dynamic(image, &samples, format)? {
                    DynamicImage::ImageLumaA8(gray_alpha) => {
                        DynamicImage::ImageLuma8(DynamicImage::ImageLumaA8(gray_alpha).to_luma8())
                    }
                    DynamicImage::ImageRgba8(rgba) => {
                        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
                    }
                    other => other,
                };

                let mut output = Vec::new();
                JpegEncoder::new_with_quality(&mut output, self.quality)
                    .encode_image(&img)
                    .map_err(|e| EncodeError::Image {
                        format: format.as_str(),
                        message: e.to_string(),
                    })?;
                Ok(Bytes::from(output))
            }
        }
    }
}

impl Default for OutputEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn to_dynamic(image: &dyn Image, samples: &[f32], format: OutputFormat) -> Result<DynamicImage, EncodeError> {
    let (width, height) = (image.width(), image.height());
    let bytes: Vec<u8> = samples.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect();

    let unsupported = || EncodeError::UnsupportedChannels {
        format: format.as_str(),
        channels: image.channels(),
    };

    let img = match image.channels() {
        1 => GrayImage::from_raw(width, height, bytes).map(DynamicImage::ImageLuma8),
        2 => GrayAlphaImage::from_raw(width, height, bytes).map(DynamicImage::ImageLumaA8),
        3 => RgbImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgba8),
        _ => None,
    };
    img.ok_or_else(unsupported)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

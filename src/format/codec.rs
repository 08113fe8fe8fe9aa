//! Stored tile formats and their decoders.
//!
//! Tiles are stored as TIFF strips inside slabs: raw samples, or compressed
//! with JPEG, PNG, LZW, Deflate or PackBits. Vector pyramids store Mapbox
//! vector tiles that are served as is and never decoded.

use std::fmt;
use std::io::{Cursor, Read};
use std::str::FromStr;

use image::{DynamicImage, ImageFormat, ImageReader};

use crate::error::DecodeError;
use crate::raster::{PixelBuffer, PixelData, SampleFormat};

/// Compression of a stored tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Jpeg,
    Png,
    Lzw,
    Deflate,
    PackBits,
    /// Protobuf vector tile
    Pbf,
}

/// Storage format of a pyramid's tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileFormat {
    TiffRawU8,
    TiffJpgU8,
    TiffJpg90U8,
    TiffPngU8,
    TiffLzwU8,
    TiffZipU8,
    TiffPkbU8,
    TiffRawF32,
    TiffLzwF32,
    TiffZipF32,
    TiffPkbF32,
    TiffPbfMvt,
}

impl TileFormat {
    pub const ALL: [TileFormat; 12] = [
        TileFormat::TiffRawU8,
        TileFormat::TiffJpgU8,
        TileFormat::TiffJpg90U8,
        TileFormat::TiffPngU8,
        TileFormat::TiffLzwU8,
        TileFormat::TiffZipU8,
        TileFormat::TiffPkbU8,
        TileFormat::TiffRawF32,
        TileFormat::TiffLzwF32,
        TileFormat::TiffZipF32,
        TileFormat::TiffPkbF32,
        TileFormat::TiffPbfMvt,
    ];

    /// Descriptor name of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            TileFormat::TiffRawU8 => "TIFF_RAW_UINT8",
            TileFormat::TiffJpgU8 => "TIFF_JPG_UINT8",
            TileFormat::TiffJpg90U8 => "TIFF_JPG90_UINT8",
            TileFormat::TiffPngU8 => "TIFF_PNG_UINT8",
            TileFormat::TiffLzwU8 => "TIFF_LZW_UINT8",
            TileFormat::TiffZipU8 => "TIFF_ZIP_UINT8",
            TileFormat::TiffPkbU8 => "TIFF_PKB_UINT8",
            TileFormat::TiffRawF32 => "TIFF_RAW_FLOAT32",
            TileFormat::TiffLzwF32 => "TIFF_LZW_FLOAT32",
            TileFormat::TiffZipF32 => "TIFF_ZIP_FLOAT32",
            TileFormat::TiffPkbF32 => "TIFF_PKB_FLOAT32",
            TileFormat::TiffPbfMvt => "TIFF_PBF_MVT",
        }
    }

    /// MIME type of the stored tile bytes.
    pub fn mime_type(&self) -> &'static str {
        match self.compression() {
            Compression::Jpeg => "image/jpeg",
            Compression::Png => "image/png",
            Compression::Pbf => "application/x-protobuf",
            Compression::None if *self == TileFormat::TiffRawF32 => "image/x-bil;bits=32",
            _ => "image/tiff",
        }
    }

    pub fn compression(&self) -> Compression {
        match self {
            TileFormat::TiffRawU8 | TileFormat::TiffRawF32 => Compression::None,
            TileFormat::TiffJpgU8 | TileFormat::TiffJpg90U8 => Compression::Jpeg,
            TileFormat::TiffPngU8 => Compression::Png,
            TileFormat::TiffLzwU8 | TileFormat::TiffLzwF32 => Compression::Lzw,
            TileFormat::TiffZipU8 | TileFormat::TiffZipF32 => Compression::Deflate,
            TileFormat::TiffPkbU8 | TileFormat::TiffPkbF32 => Compression::PackBits,
            TileFormat::TiffPbfMvt => Compression::Pbf,
        }
    }

    /// Sample type of decoded pixels, `None` for vector formats.
    pub fn sample_format(&self) -> Option<SampleFormat> {
        match self {
            TileFormat::TiffPbfMvt => None,
            TileFormat::TiffRawF32
            | TileFormat::TiffLzwF32
            | TileFormat::TiffZipF32
            | TileFormat::TiffPkbF32 => Some(SampleFormat::F32),
            _ => Some(SampleFormat::U8),
        }
    }

    pub fn is_raster(&self) -> bool {
        self.sample_format().is_some()
    }
}

impl FromStr for TileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Older descriptors spell the 8-bit formats with INT8
        let normalized = s.trim().to_uppercase().replace("_INT8", "_UINT8");
        TileFormat::ALL
            .iter()
            .find(|f| f.as_str() == normalized)
            .copied()
            .ok_or_else(|| format!("unknown tile format '{}'", s))
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Color interpretation of raster samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Photometric {
    Gray,
    Rgb,
    Mask,
}

impl Photometric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Photometric::Gray => "gray",
            Photometric::Rgb => "rgb",
            Photometric::Mask => "mask",
        }
    }
}

impl FromStr for Photometric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gray" => Ok(Photometric::Gray),
            "rgb" => Ok(Photometric::Rgb),
            "mask" => Ok(Photometric::Mask),
            other => Err(format!("unknown photometric '{}'", other)),
        }
    }
}

impl fmt::Display for Photometric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one stored tile into `width x height x channels` samples.
pub fn decode_tile(
    data: &[u8],
    format: TileFormat,
    width: u32,
    height: u32,
    channels: usize,
) -> Result<PixelBuffer, DecodeError> {
    let sample_format = format
        .sample_format()
        .ok_or(DecodeError::NotRaster(format.as_str()))?;
    let codec_error = |message: String| DecodeError::Codec {
        format: format.as_str(),
        message,
    };

    let samples = width as usize * height as usize * channels;

    let raw = match format.compression() {
        Compression::None => data.to_vec(),
        Compression::Jpeg => decode_image(data, ImageFormat::Jpeg, channels).map_err(codec_error)?,
        Compression::Png => decode_image(data, ImageFormat::Png, channels).map_err(codec_error)?,
        Compression::Lzw => weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .decode(data)
            .map_err(|e| codec_error(e.to_string()))?,
        Compression::Deflate => {
            let mut decoder = flate2::read::ZlibDecoder::new(data);
            let mut out = Vec::with_capacity(samples * 4);
            decoder
                .read_to_end(&mut out)
                .map_err(|e| codec_error(e.to_string()))?;
            out
        }
        Compression::PackBits => unpack_bits(data).map_err(codec_error)?,
        Compression::Pbf => return Err(DecodeError::NotRaster(format.as_str())),
    };

    let data = match sample_format {
        SampleFormat::U8 => {
            check_length(samples, raw.len())?;
            PixelData::U8(raw)
        }
        SampleFormat::F32 => {
            check_length(samples * 4, raw.len())?;
            PixelData::F32(
                raw.chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            )
        }
    };

    Ok(PixelBuffer {
        width,
        height,
        channels,
        data,
    })
}

fn check_length(expected: usize, actual: usize) -> Result<(), DecodeError> {
    if expected != actual {
        return Err(DecodeError::SizeMismatch { expected, actual });
    }
    Ok(())
}

fn decode_image(data: &[u8], format: ImageFormat, channels: usize) -> Result<Vec<u8>, String> {
    let img = ImageReader::with_format(Cursor::new(data), format)
        .decode()
        .map_err(|e| e.to_string())?;

    let raw = match (channels, img) {
        (1, DynamicImage::ImageLuma8(gray)) => gray.into_raw(),
        (1, other) => other.to_luma8().into_raw(),
        (2, other) => other.to_luma_alpha8().into_raw(),
        (3, DynamicImage::ImageRgb8(rgb)) => rgb.into_raw(),
        (3, other) => other.to_rgb8().into_raw(),
        (4, other) => other.to_rgba8().into_raw(),
        (n, _) => return Err(format!("cannot decode to {} channels", n)),
    };
    Ok(raw)
}

/// Decompress a PackBits stream.
fn unpack_bits(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut i = 0;

    while i < data.len() {
        let n = data[i] as i8;
        i += 1;
        match n {
            0..=127 => {
                let count = n as usize + 1;
                let literal = data
                    .get(i..i + count)
                    .ok_or_else(|| "truncated literal run".to_string())?;
                out.extend_from_slice(literal);
                i += count;
            }
            -127..=-1 => {
                let count = (1 - n as isize) as usize;
                let value = *data.get(i).ok_or_else(|| "truncated repeat run".to_string())?;
                out.extend(std::iter::repeat(value).take(count));
                i += 1;
            }
            // -128 is a no-op
            _ => {}
        }
    }

    Ok(out)
}

//! Stored tile formats, slab reading and output encoding.

mod codec;
mod encoder;
mod slab;

pub use codec::{decode_tile, Compression, Photometric, TileFormat};
pub use encoder::{
    clamp_quality, OutputEncoder, OutputFormat, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use slab::{read_slab_tile, SLAB_HEADER_SIZE, SYMLINK_SIGNATURE};

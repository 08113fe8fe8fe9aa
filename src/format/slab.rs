//! Slab reading.
//!
//! A slab packs `n` tiles after a fixed 2048-byte TIFF header, followed by
//! the tile index: `n` little-endian u32 offsets, then `n` little-endian u32
//! sizes. On object storage, a slab shared between pyramids may be replaced
//! by a small object starting with `SYMLINK#` and naming the real key.

use bytes::Bytes;
use tracing::debug;

use crate::error::DecodeError;
use crate::io::{read_u32_le, RangeReader};
use crate::storage::StorageContext;

/// Size of the TIFF header preceding the tile index.
pub const SLAB_HEADER_SIZE: u64 = 2048;

/// Prefix of objects redirecting to another slab.
pub const SYMLINK_SIGNATURE: &[u8] = b"SYMLINK#";

/// Read tile `index` out of the slab stored at `key`, which holds
/// `tile_count` tiles.
///
/// Returns `Ok(None)` when the index marks the tile as absent (size 0).
pub async fn read_slab_tile(
    context: &dyn StorageContext,
    key: &str,
    index: u32,
    tile_count: u32,
) -> Result<Option<Bytes>, DecodeError> {
    if index >= tile_count {
        return Err(DecodeError::TileOutOfSlab {
            index,
            count: tile_count,
        });
    }

    let index_end = SLAB_HEADER_SIZE + 8 * u64::from(tile_count);
    let mut reader = context.open(key).await?;

    if reader.size() < index_end {
        let target = symlink_target(reader.as_ref()).await?.ok_or_else(|| DecodeError::InvalidSlab {
            key: key.to_string(),
            message: format!("{} bytes, index needs {}", reader.size(), index_end),
        })?;

        debug!(from = key, to = %target, "Following slab symlink");
        reader = context.open(&target).await?;

        if reader.size() < index_end {
            return Err(DecodeError::InvalidSlab {
                key: target,
                message: format!("{} bytes, index needs {}", reader.size(), index_end),
            });
        }
    }

    let offset_at = SLAB_HEADER_SIZE + 4 * u64::from(index);
    let size_at = SLAB_HEADER_SIZE + 4 * u64::from(tile_count) + 4 * u64::from(index);

    let offset = read_u32_le(&reader.read_exact_at(offset_at, 4).await?);
    let size = read_u32_le(&reader.read_exact_at(size_at, 4).await?);

    if size == 0 {
        return Ok(None);
    }

    let data = reader.read_exact_at(u64::from(offset), size as usize).await?;
    Ok(Some(data))
}

/// Target key of a symbolic slab, `None` if the object is not one.
async fn symlink_target(reader: &dyn RangeReader) -> Result<Option<String>, DecodeError> {
    if reader.size() < SYMLINK_SIGNATURE.len() as u64 {
        return Ok(None);
    }

    let content = reader.read_all().await?;
    let Some(target) = content.strip_prefix(SYMLINK_SIGNATURE) else {
        return Ok(None);
    };

    let target = String::from_utf8_lossy(target)
        .trim_end_matches(['\0', '\n', ' '])
        .to_string();
    if target.is_empty() {
        return Ok(None);
    }
    Ok(Some(target))
}

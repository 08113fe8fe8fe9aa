use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Trait for reading byte ranges from a stored object.
///
/// Slabs are read through this abstraction: the index first, then one tile,
/// without ever downloading the whole slab. Implementations must be
/// thread-safe.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Get the total size of the object in bytes.
    fn size(&self) -> u64;

    /// Get a unique identifier for this object (for logging and cache keys).
    ///
    /// For S3, this is `s3://bucket/key`; for files, the path.
    fn identifier(&self) -> &str;

    /// Read the whole object.
    async fn read_all(&self) -> Result<Bytes, IoError> {
        self.read_exact_at(0, self.size() as usize).await
    }
}

/// Read a little-endian u32 from a byte slice.
///
/// # Panics
/// Panics if the slice has fewer than 4 bytes.
#[inline]
pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

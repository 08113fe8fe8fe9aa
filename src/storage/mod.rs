//! Storage contexts: where slabs and descriptors are read from.
//!
//! A context abstracts one storage tray (the filesystem, one S3 bucket) and
//! opens range readers on keys inside it. Contexts are shared by every level
//! reading from the same tray.

mod book;
mod cache;
mod file_context;
mod path;
mod s3_context;

pub use book::{ContextBook, S3Settings};
pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use file_context::FileContext;
pub use path::{slab_address, slab_file_path, slab_key, slab_object_key, SlabAddress};
pub use s3_context::S3Context;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;
use crate::io::RangeReader;

/// Kind of storage backing a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    File,
    S3,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::File => f.write_str("FILE"),
            ContextKind::S3 => f.write_str("S3"),
        }
    }
}

/// A storage tray objects can be read from.
#[async_trait]
pub trait StorageContext: Send + Sync {
    fn kind(&self) -> ContextKind;

    /// Tray name: the bucket for object storage, empty for files.
    fn tray(&self) -> &str;

    /// Open a range reader on `key`.
    async fn open(&self, key: &str) -> Result<Box<dyn RangeReader>, IoError>;

    /// Read the whole object stored at `key`.
    async fn read_full(&self, key: &str) -> Result<Bytes, IoError> {
        let reader = self.open(key).await?;
        reader.read_all().await
    }
}

impl fmt::Debug for dyn StorageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageContext({}:{})", self.kind(), self.tray())
    }
}

use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::RangeReader;
use crate::error::IoError;

/// Local filesystem implementation of RangeReader.
///
/// The file size is read once on creation; every range read reopens the
/// file so the reader stays `Sync` without a lock.
#[derive(Debug, Clone)]
pub struct FileRangeReader {
    path: String,
    size: u64,
}

impl FileRangeReader {
    /// Open `path`, failing with `NotFound` if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().display().to_string();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io_error(&path, e))?;

        if !metadata.is_file() {
            return Err(IoError::File {
                path,
                message: "not a regular file".to_string(),
            });
        }

        Ok(Self {
            size: metadata.len(),
            path,
        })
    }
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if offset + len as u64 > self.size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.size,
            });
        }

        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| map_io_error(&self.path, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| map_io_error(&self.path, e))?;

        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)
            .await
            .map_err(|e| map_io_error(&self.path, e))?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.path
    }
}

fn map_io_error(path: &str, e: std::io::Error) -> IoError {
    if e.kind() == std::io::ErrorKind::NotFound {
        IoError::NotFound(path.to_string())
    } else {
        IoError::File {
            path: path.to_string(),
            message: e.to_string(),
        }
    }
}

use async_trait::async_trait;

use super::{ContextKind, StorageContext};
use crate::error::IoError;
use crate::io::{FileRangeReader, RangeReader};

/// Local filesystem context; keys are file paths.
#[derive(Debug, Clone, Default)]
pub struct FileContext;

impl FileContext {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageContext for FileContext {
    fn kind(&self) -> ContextKind {
        ContextKind::File
    }

    fn tray(&self) -> &str {
        ""
    }

    async fn open(&self, key: &str) -> Result<Box<dyn RangeReader>, IoError> {
        let reader = FileRangeReader::open(key).await?;
        Ok(Box::new(reader))
    }
}

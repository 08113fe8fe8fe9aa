//! S3-backed storage context.
//!
//! Creates `S3RangeReader` instances for slabs and descriptors stored in one
//! bucket of S3 or an S3-compatible service.

use async_trait::async_trait;
use aws_sdk_s3::Client;

use super::{ContextKind, StorageContext};
use crate::error::IoError;
use crate::io::{RangeReader, S3RangeReader};

/// One S3 bucket; keys are object names.
#[derive(Clone)]
pub struct S3Context {
    client: Client,
    bucket: String,
}

impl S3Context {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl StorageContext for S3Context {
    fn kind(&self) -> ContextKind {
        ContextKind::S3
    }

    fn tray(&self) -> &str {
        &self.bucket
    }

    async fn open(&self, key: &str) -> Result<Box<dyn RangeReader>, IoError> {
        let reader =
            S3RangeReader::new(self.client.clone(), self.bucket.clone(), key.to_string()).await?;
        Ok(Box::new(reader))
    }
}

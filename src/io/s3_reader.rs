use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use bytes::Bytes;

use super::RangeReader;
use crate::error::IoError;

/// Ranged reads of one slab object in an S3 bucket.
///
/// The object length is known from a HEAD request when the reader is
/// opened; tile index entries and tiles are then fetched with `GET` and a
/// `Range` header.
#[derive(Clone)]
pub struct S3RangeReader {
    client: Client,
    bucket: String,
    key: String,
    size: u64,
    uri: String,
}

impl S3RangeReader {
    /// Open `bucket/key`, failing with `NotFound` if the object is missing.
    pub async fn new(client: Client, bucket: String, key: String) -> Result<Self, IoError> {
        let uri = format!("s3://{}/{}", bucket, key);
        let size = object_length(&client, &bucket, &key, &uri).await?;

        Ok(Self {
            client,
            bucket,
            key,
            size,
            uri,
        })
    }
}

async fn object_length(client: &Client, bucket: &str, key: &str, uri: &str) -> Result<u64, IoError> {
    let head = client
        .head_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| {
            let missing = e.as_service_error().is_some_and(|se| se.is_not_found())
                || e.raw_response().is_some_and(|r| r.status().as_u16() == 404);
            classify_s3_error(uri, missing, e.to_string())
        })?;

    Ok(head.content_length().map_or(0, |len| len.max(0) as u64))
}

/// `Range` header value for `len > 0` bytes at `offset`.
fn byte_range(offset: u64, len: usize) -> String {
    format!("bytes={}-{}", offset, offset + len as u64 - 1)
}

#[async_trait]
impl RangeReader for S3RangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let end = offset.checked_add(len as u64).filter(|end| *end <= self.size);
        if end.is_none() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Bytes::new());
        }

        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .range(byte_range(offset, len))
            .send()
            .await
            .map_err(|e| {
                let missing = e.as_service_error().is_some_and(|se| se.is_no_such_key());
                classify_s3_error(&self.uri, missing, e.to_string())
            })?;

        let body = object
            .body
            .collect()
            .await
            .map_err(|e| IoError::Connection(e.to_string()))?;
        Ok(body.into_bytes())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.uri
    }
}

/// Map an SDK failure onto `NotFound` or `S3`.
///
/// Some S3-compatible services only report a missing object through the
/// error text.
fn classify_s3_error(uri: &str, missing: bool, message: String) -> IoError {
    const MISSING_MARKERS: [&str; 3] = ["NotFound", "NoSuchKey", "404"];

    if missing || MISSING_MARKERS.iter().any(|marker| message.contains(marker)) {
        IoError::NotFound(uri.to_string())
    } else {
        IoError::S3(message)
    }
}

/// Build the S3 client shared by every bucket context.
///
/// With a custom endpoint, buckets are addressed path-style.
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    if let Some(endpoint) = endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    let shared = loader.load().await;

    let config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(endpoint_url.is_some())
        .build();
    Client::from_conf(config)
}

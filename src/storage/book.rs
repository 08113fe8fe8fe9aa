use std::collections::HashMap;
use std::sync::Arc;

use aws_sdk_s3::Client;
use tracing::{debug, info};

use super::{ContextKind, FileContext, S3Context, StorageContext, TileCache};
use crate::io::create_s3_client;

/// Default region when none is configured.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Connection settings shared by every S3 context.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,
    pub region: String,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_S3_REGION.to_string(),
        }
    }
}

/// Registry of storage contexts, one per `(kind, tray)`.
///
/// Filled while descriptors are loaded; levels keep `Arc` handles on the
/// contexts they read from. The S3 client is created on first use.
pub struct ContextBook {
    contexts: HashMap<(ContextKind, String), Arc<dyn StorageContext>>,
    s3_settings: S3Settings,
    s3_client: Option<Client>,
    tile_cache: Option<Arc<TileCache>>,
}

impl ContextBook {
    pub fn new(s3_settings: S3Settings) -> Self {
        Self {
            contexts: HashMap::new(),
            s3_settings,
            s3_client: None,
            tile_cache: None,
        }
    }

    /// Share an encoded tile cache between every level loaded with this book.
    pub fn with_tile_cache(mut self, cache: Arc<TileCache>) -> Self {
        self.tile_cache = Some(cache);
        self
    }

    pub fn tile_cache(&self) -> Option<Arc<TileCache>> {
        self.tile_cache.clone()
    }

    /// Register a context, replacing any previous one for the same tray.
    pub fn insert(&mut self, context: Arc<dyn StorageContext>) {
        let key = (context.kind(), context.tray().to_string());
        self.contexts.insert(key, context);
    }

    /// Return the context for `(kind, tray)`, creating it if needed.
    pub async fn get_or_create(&mut self, kind: ContextKind, tray: &str) -> Arc<dyn StorageContext> {
        let tray = match kind {
            ContextKind::File => "",
            ContextKind::S3 => tray,
        };
        let key = (kind, tray.to_string());

        if let Some(context) = self.contexts.get(&key) {
            debug!(kind = %kind, tray = tray, "Reusing storage context");
            return context.clone();
        }

        let context: Arc<dyn StorageContext> = match kind {
            ContextKind::File => Arc::new(FileContext::new()),
            ContextKind::S3 => {
                let client = self.s3_client().await;
                Arc::new(S3Context::new(client, tray.to_string()))
            }
        };

        info!(kind = %kind, tray = tray, "Created storage context");
        self.contexts.insert(key, context.clone());
        context
    }

    /// Resolve a location into a context and a key.
    ///
    /// `s3://bucket/key` designates an object; anything else is a file path.
    pub async fn resolve(&mut self, location: &str) -> Option<(Arc<dyn StorageContext>, String)> {
        match location.strip_prefix("s3://") {
            Some(rest) => {
                let (bucket, key) = rest.split_once('/')?;
                if bucket.is_empty() || key.is_empty() {
                    return None;
                }
                let context = self.get_or_create(ContextKind::S3, bucket).await;
                Some((context, key.to_string()))
            }
            None => {
                let context = self.get_or_create(ContextKind::File, "").await;
                Some((context, location.to_string()))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    async fn s3_client(&mut self) -> Client {
        if let Some(client) = &self.s3_client {
            return client.clone();
        }
        let client =
            create_s3_client(self.s3_settings.endpoint.as_deref(), &self.s3_settings.region).await;
        self.s3_client = Some(client.clone());
        client
    }
}

impl Default for ContextBook {
    fn default() -> Self {
        Self::new(S3Settings::default())
    }
}

//! Object storage shared by every endpoint.
//!
//! Routes only see [`ObjectStore`]. Two backends exist:
//! - **GCS** ([`GcsStore`]): the production bucket
//! - **Local disk** ([`LocalStore`]): a directory, used for development
//!
//! Keys are `/`-separated relative paths and go through [`sanitize_key`]
//! before they reach a backend.

mod gcs;
mod local;

pub use gcs::{GcsStore, connect_clients};
pub use local::LocalStore;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Object body as it comes off the backend.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
}

/// Inclusive byte window of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata for a single object, `None` if it does not exist.
    async fn stat(&self, key: &str) -> Result<Option<ObjectInfo>, StoreError>;

    /// Every object whose name starts with `prefix`, sorted by name.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError>;

    /// Stream an object, or only `range` of it.
    async fn read(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream, StoreError>;

    /// Store `data` under `key`, replacing any existing object.
    async fn write(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StoreError>;
}

/// Validate a client-supplied key.
///
/// Rejects empty keys, NUL bytes, absolute paths and `..` segments.
/// Empty segments (`a//b`) are collapsed.
pub fn sanitize_key(raw: &str) -> Result<String, StoreError> {
    if raw.contains('\0') || raw.starts_with('/') || raw.starts_with('\\') {
        return Err(StoreError::InvalidKey(raw.to_string()));
    }

    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() || segments.iter().any(|s| *s == ".." || *s == ".") {
        return Err(StoreError::InvalidKey(raw.to_string()));
    }

    Ok(segments.join("/"))
}

/// Turn a folder parameter into a listing prefix: NFC, sanitized, trailing `/`.
pub fn folder_prefix(raw: &str) -> Result<String, StoreError> {
    let normalized: String = raw.nfc().collect();
    let mut prefix = sanitize_key(&normalized)?;
    prefix.push('/');
    Ok(prefix)
}

/// Read a whole object into memory. Only for small objects (config blobs,
/// manifests).
pub async fn download_object(store: &dyn ObjectStore, key: &str) -> Result<Bytes, StoreError> {
    let mut stream = store.read(key, None).await?;
    let mut data = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data.freeze())
}

/// Best guess at a content type from the key's extension.
pub fn guess_content_type(key: &str) -> String {
    mime_guess::from_path(key)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

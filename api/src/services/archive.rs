//! Folder downloads as zip archives, built while the objects are read.
//!
//! A background task writes the archive into one end of an in-memory pipe
//! and the response body reads the other end, so nothing is buffered whole.
//! Once headers are out there is no way to send a 500; a failure instead
//! ends the body with an error and the client sees a truncated download.

use async_zip::base::write::ZipFileWriter;
use async_zip::{Compression, DeflateOption, ZipEntryBuilder};
use bytes::Bytes;
use futures::{AsyncWriteExt, Stream, StreamExt};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::DuplexStream;
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};

use crate::constants::ZIP_BUFFER_SIZE;
use crate::storage::{ObjectInfo, ObjectStore, StoreError};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] async_zip::error::ZipError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Entry name inside the archive, relative to the folder. `None` for the
/// folder itself and for folder placeholder objects.
pub fn entry_name<'a>(prefix: &str, object_name: &'a str) -> Option<&'a str> {
    object_name
        .strip_prefix(prefix)
        .filter(|relative| !relative.is_empty() && !relative.ends_with('/'))
}

/// `<last folder segment>.zip`, or `folder.zip` when there is none.
pub fn zip_file_name(prefix: &str) -> String {
    let name = prefix
        .split('/')
        .filter(|s| !s.is_empty())
        .next_back()
        .unwrap_or("folder");
    format!("{}.zip", name)
}

/// Stream a zip of `objects` (all under `prefix`).
pub fn zip_stream(
    store: Arc<dyn ObjectStore>,
    prefix: String,
    objects: Vec<ObjectInfo>,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let (reader, writer) = tokio::io::duplex(ZIP_BUFFER_SIZE);
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let result = write_archive(store.as_ref(), &prefix, &objects, writer).await;
        match &result {
            Ok(count) => info!(prefix, entries = count, "Zip archive complete"),
            Err(e) => error!(prefix, "Zip archive failed: {}", e),
        }
        let _ = done_tx.send(result.map(|_| ()));
    });

    // The writer is dropped when the task ends, so the body reaches EOF and
    // then reports how the task finished.
    let outcome = futures::stream::once(async move {
        match done_rx.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(Err(io::Error::other(e.to_string()))),
            Err(_) => Some(Err(io::Error::other("zip task ended unexpectedly"))),
        }
    })
    .filter_map(|item| async move { item });

    ReaderStream::new(reader).chain(outcome)
}

async fn write_archive(
    store: &dyn ObjectStore,
    prefix: &str,
    objects: &[ObjectInfo],
    writer: DuplexStream,
) -> Result<usize, ArchiveError> {
    let mut zip = ZipFileWriter::with_tokio(writer);
    let mut count = 0;

    for object in objects {
        let Some(relative) = entry_name(prefix, &object.name) else {
            continue;
        };

        let builder = ZipEntryBuilder::new(relative.to_string().into(), Compression::Deflate)
            .deflate_option(DeflateOption::Maximum);
        let mut entry = zip.write_entry_stream(builder).await?;

        let mut data = store.read(&object.name, None).await?;
        while let Some(chunk) = data.next().await {
            entry.write_all(&chunk?).await?;
        }
        entry.close().await?;

        debug!(entry = relative, bytes = object.size, "Added zip entry");
        count += 1;
    }

    zip.close().await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;

    #[test]
    fn test_entry_names() {
        assert_eq!(entry_name("Concerts/", "Concerts/a.mp3"), Some("a.mp3"));
        assert_eq!(entry_name("Concerts/", "Concerts/sub/b.mp3"), Some("sub/b.mp3"));
        assert_eq!(entry_name("Concerts/", "Concerts/"), None);
        assert_eq!(entry_name("Concerts/", "Concerts/sub/"), None);
        assert_eq!(entry_name("Concerts/", "Other/a.mp3"), None);
    }

    #[test]
    fn test_zip_file_name() {
        assert_eq!(zip_file_name("Concerts/2024/"), "2024.zip");
        assert_eq!(zip_file_name("Répertoire/"), "Répertoire.zip");
        assert_eq!(zip_file_name("/"), "folder.zip");
    }

    #[tokio::test]
    async fn test_zip_stream_contains_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Tenor/sub")).unwrap();
        std::fs::write(dir.path().join("Tenor/part1.mp3"), vec![7u8; 4096]).unwrap();
        std::fs::write(dir.path().join("Tenor/sub/part2.mp3"), b"second").unwrap();
        let store = Arc::new(LocalStore::new(dir.path()).unwrap());

        let objects = store.list("Tenor/").await.unwrap();
        let mut stream = Box::pin(zip_stream(store, "Tenor/".to_string(), objects));
        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            archive.extend_from_slice(&chunk.unwrap());
        }

        assert!(archive.starts_with(b"PK\x03\x04"));
        let contains = |needle: &[u8]| archive.windows(needle.len()).any(|w| w == needle);
        assert!(contains(b"part1.mp3"));
        assert!(contains(b"sub/part2.mp3"));
        // End of central directory record
        assert!(contains(b"PK\x05\x06"));
    }

    #[tokio::test]
    async fn test_zip_stream_reports_missing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::new(dir.path()).unwrap());
        let objects = vec![ObjectInfo {
            name: "Gone/ghost.mp3".into(),
            size: 3,
            content_type: None,
        }];

        let mut stream = Box::pin(zip_stream(store, "Gone/".to_string(), objects));
        let mut saw_error = false;
        while let Some(chunk) = stream.next().await {
            if chunk.is_err() {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}

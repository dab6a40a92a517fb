use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::io::{self, ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;
use walkdir::WalkDir;

use super::{ByteRange, ByteStream, ObjectInfo, ObjectStore, StoreError, guess_content_type, sanitize_key};

/// Objects stored as plain files under `root`. Hidden files and folders
/// (leading `.`) are left out of listings.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<(String, PathBuf), StoreError> {
        let key = sanitize_key(key)?;
        let path = self.root.join(&key);
        Ok((key, path))
    }

    /// Symlinks may point anywhere; the resolved file must stay under root.
    async fn ensure_within_root(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        let canonical = fs::canonicalize(path)
            .await
            .map_err(|e| missing_or_io(key, e))?;
        let root = fs::canonicalize(&self.root).await?;
        if canonical.starts_with(&root) {
            Ok(())
        } else {
            Err(StoreError::InvalidKey(key.to_string()))
        }
    }

    /// Checked before anything is created: the deepest existing ancestor of
    /// `path`, and `path` itself if it already exists, must resolve under root.
    async fn ensure_writable_within_root(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        let root = fs::canonicalize(&self.root).await?;

        if fs::symlink_metadata(path).await.is_ok() {
            let canonical = fs::canonicalize(path).await?;
            if !canonical.starts_with(&root) {
                return Err(StoreError::InvalidKey(key.to_string()));
            }
        }

        for ancestor in path.ancestors().skip(1) {
            match fs::canonicalize(ancestor).await {
                Ok(canonical) if canonical.starts_with(&root) => return Ok(()),
                Ok(_) => return Err(StoreError::InvalidKey(key.to_string())),
                Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

fn missing_or_io(key: &str, err: io::Error) -> StoreError {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => StoreError::NotFound(key.to_string()),
        _ => StoreError::Io(err),
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn list_blocking(root: &Path, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
    // Only walk the deepest directory the prefix names
    let start = match prefix.rfind('/') {
        Some(idx) => root.join(sanitize_key(&prefix[..idx])?),
        None => root.to_path_buf(),
    };
    if !start.is_dir() {
        return Ok(Vec::new());
    }

    let mut objects = Vec::new();
    let walker = WalkDir::new(&start)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !name.starts_with(prefix) {
            continue;
        }
        let size = entry.metadata().map_err(io::Error::from)?.len();
        objects.push(ObjectInfo {
            content_type: Some(guess_content_type(&name)),
            name,
            size,
        });
    }

    objects.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(objects)
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn stat(&self, key: &str) -> Result<Option<ObjectInfo>, StoreError> {
        let (key, path) = self.path_for(key)?;
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Ok(None);
        }
        self.ensure_within_root(&key, &path).await?;

        Ok(Some(ObjectInfo {
            content_type: Some(guess_content_type(&key)),
            name: key,
            size: metadata.len(),
        }))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        let root = self.root.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || list_blocking(&root, &prefix))
            .await
            .map_err(|e| StoreError::Backend(format!("listing task failed: {e}")))?
    }

    async fn read(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream, StoreError> {
        let (key, path) = self.path_for(key)?;
        self.ensure_within_root(&key, &path).await?;
        let mut file = File::open(&path).await.map_err(|e| missing_or_io(&key, e))?;

        match range {
            Some(range) => {
                debug!(key, start = range.start, end = range.end, "local ranged read");
                file.seek(SeekFrom::Start(range.start)).await?;
                Ok(ReaderStream::new(file.take(range.len()))
                    .map_err(StoreError::Io)
                    .boxed())
            }
            None => Ok(ReaderStream::new(file).map_err(StoreError::Io).boxed()),
        }
    }

    async fn write(&self, key: &str, data: Bytes, _content_type: &str) -> Result<(), StoreError> {
        let (key, path) = self.path_for(key)?;
        self.ensure_writable_within_root(&key, &path).await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await?;
        debug!(key, bytes = data.len(), "local write");
        Ok(())
    }
}

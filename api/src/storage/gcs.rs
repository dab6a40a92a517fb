use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use google_cloud_gax::error::rpc::Code;
use google_cloud_storage::client::{Storage, StorageControl};
use google_cloud_storage::model::Object;
use google_cloud_storage::model_ext::ReadRange;
use tracing::{debug, info};

use super::{ByteRange, ByteStream, ObjectInfo, ObjectStore, StoreError};

/// Build the data and metadata clients. Both pick up credentials from
/// `GOOGLE_APPLICATION_CREDENTIALS`.
pub async fn connect_clients() -> Result<(Storage, StorageControl), StoreError> {
    let storage = Storage::builder()
        .build()
        .await
        .map_err(|e| StoreError::Backend(format!("failed to create GCS client: {e}")))?;
    let control = StorageControl::builder()
        .build()
        .await
        .map_err(|e| StoreError::Backend(format!("failed to create GCS control client: {e}")))?;
    info!("GCS clients initialized");
    Ok((storage, control))
}

/// One bucket. Clients are cheap to clone, so several stores can share them.
pub struct GcsStore {
    storage: Storage,
    control: StorageControl,
    /// `projects/_/buckets/<name>`
    bucket: String,
}

impl GcsStore {
    pub fn new(storage: Storage, control: StorageControl, bucket_name: &str) -> Self {
        Self {
            storage,
            control,
            bucket: format!("projects/_/buckets/{}", bucket_name),
        }
    }
}

fn is_not_found(err: &google_cloud_gax::error::Error) -> bool {
    err.http_status_code() == Some(404) || err.status().is_some_and(|s| s.code == Code::NotFound)
}

fn backend_error(context: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("{context}: {err}"))
}

fn object_info(object: Object) -> ObjectInfo {
    ObjectInfo {
        name: object.name,
        size: u64::try_from(object.size).unwrap_or(0),
        content_type: Some(object.content_type).filter(|ct| !ct.is_empty()),
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn stat(&self, key: &str) -> Result<Option<ObjectInfo>, StoreError> {
        match self
            .control
            .get_object()
            .set_bucket(&self.bucket)
            .set_object(key)
            .send()
            .await
        {
            Ok(object) => Ok(Some(object_info(object))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(backend_error("get object", e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        let mut objects = Vec::new();
        let mut page_token = String::new();

        loop {
            let response = self
                .control
                .list_objects()
                .set_parent(&self.bucket)
                .set_prefix(prefix)
                .set_page_token(page_token)
                .send()
                .await
                .map_err(|e| backend_error("list objects", e))?;

            objects.extend(response.objects.into_iter().map(object_info));

            if response.next_page_token.is_empty() {
                break;
            }
            page_token = response.next_page_token;
        }

        debug!(prefix, count = objects.len(), "GCS listing");
        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    async fn read(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream, StoreError> {
        let mut request = self.storage.read_object(&self.bucket, key);
        if let Some(range) = range {
            request = request.set_read_range(ReadRange::segment(range.start, range.len()));
        }

        let response = request.send().await.map_err(|e| {
            if is_not_found(&e) {
                StoreError::NotFound(key.to_string())
            } else {
                backend_error("read object", e)
            }
        })?;

        let stream = futures::stream::unfold(response, |mut response| async move {
            response.next().await.map(|chunk| {
                (
                    chunk.map_err(|e| backend_error("read chunk", e)),
                    response,
                )
            })
        });
        Ok(stream.boxed())
    }

    async fn write(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StoreError> {
        let size = data.len();
        self.storage
            .write_object(&self.bucket, key, data)
            .set_content_type(content_type)
            .send_buffered()
            .await
            .map_err(|e| backend_error("write object", e))?;
        debug!(key, bytes = size, "GCS upload");
        Ok(())
    }
}

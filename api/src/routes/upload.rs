//! Multipart upload endpoints (/api/uploadFile, /api/uploadFolder)

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartRejection},
    routing::post,
};
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use unicode_normalization::UnicodeNormalization;

use crate::AppState;
use crate::services::error::{ApiError, JsonApiError, LogErr};
use crate::storage::{ObjectStore, guess_content_type, sanitize_key};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/uploadFile", post(upload_file))
        .route("/api/uploadFolder", post(upload_folder))
}

struct UploadedFile {
    file_name: String,
    content_type: String,
    data: Bytes,
}

#[derive(Default)]
struct UploadForm {
    folder: Option<String>,
    files: Vec<UploadedFile>,
}

impl UploadForm {
    /// Folder without trailing slashes, NFC-normalised
    fn folder(&self) -> Result<String, ApiError> {
        self.folder
            .as_deref()
            .map(|f| f.trim().trim_end_matches('/').nfc().collect::<String>())
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing folder field"))
    }
}

fn parse_error() -> ApiError {
    ApiError::bad_request("Failed to parse form data")
}

/// Collect the whole form first: `folder` may come after the files.
async fn read_form(
    multipart: Result<Multipart, MultipartRejection>,
    file_field: &str,
) -> Result<UploadForm, ApiError> {
    let mut multipart = multipart.log_status("Multipart rejected", parse_error())?;
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .log_status("Multipart field error", parse_error())?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "folder" {
            form.folder = Some(field.text().await.log_status("Folder field error", parse_error())?);
            continue;
        }
        if name != file_field {
            continue;
        }

        let Some(file_name) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string) else {
            continue;
        };
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(&file_name));
        let data = field
            .bytes()
            .await
            .log_status("File field error", parse_error())?;

        form.files.push(UploadedFile {
            file_name,
            content_type,
            data,
        });
    }

    Ok(form)
}

/// `<folder>/<file name>`, validated like any other key
fn destination(folder: &str, file_name: &str) -> Result<String, ApiError> {
    let file_name: String = file_name.nfc().collect();
    Ok(sanitize_key(&format!("{}/{}", folder, file_name))?)
}

async fn store_file(
    store: &dyn ObjectStore,
    folder: &str,
    file: UploadedFile,
) -> Result<String, ApiError> {
    let key = destination(folder, &file.file_name)?;
    let size = file.data.len();
    store
        .write(&key, file.data, &file.content_type)
        .await
        .map_err(|e| {
            error!("Upload of {} failed: {}", key, e);
            ApiError::internal("Upload failed")
        })?;
    info!(key, bytes = size, "Uploaded");
    Ok(file.file_name)
}

#[derive(Debug, Serialize)]
struct UploadFileResponse {
    message: &'static str,
    file: String,
}

/// POST /api/uploadFile - multipart `folder` + one `file`
async fn upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadFileResponse>, JsonApiError> {
    let mut form = read_form(multipart, "file").await?;
    let folder = form.folder()?;

    if form.files.is_empty() {
        return Err(ApiError::bad_request("No file provided").into());
    }
    let file = form.files.swap_remove(0);

    let file = match store_file(state.data_store.as_ref(), &folder, file).await {
        Ok(name) => name,
        Err(ApiError::Internal(_)) => return Err(ApiError::internal("Failed to upload file").into()),
        Err(e) => return Err(e.into()),
    };

    Ok(Json(UploadFileResponse {
        message: "File uploaded successfully",
        file,
    }))
}

#[derive(Debug, Serialize)]
struct UploadFolderResponse {
    message: &'static str,
    files: Vec<String>,
}

/// POST /api/uploadFolder - multipart `folder` + any number of `files`
async fn upload_folder(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadFolderResponse>, JsonApiError> {
    let form = read_form(multipart, "files").await?;
    let folder = form.folder()?;

    if form.files.is_empty() {
        return Err(ApiError::bad_request("No files provided").into());
    }

    // Validate every destination before anything is written
    for file in &form.files {
        destination(&folder, &file.file_name)?;
    }

    let store = state.data_store.as_ref();
    let uploads = form
        .files
        .into_iter()
        .map(|file| store_file(store, &folder, file));

    let files = match try_join_all(uploads).await {
        Ok(files) => files,
        Err(ApiError::Internal(_)) => return Err(ApiError::internal("Failed to upload files").into()),
        Err(e) => return Err(e.into()),
    };

    info!(folder, count = files.len(), "Folder upload complete");
    Ok(Json(UploadFolderResponse {
        message: "Folder uploaded successfully",
        files,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};

    const BOUNDARY: &str = "----bucketbrowserboundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart(uri: &str, parts: &[Part]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
                Part::File(name, file_name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_body(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_upload_file() {
        let app = TestApp::new();
        let (status, _, body) = app
            .send(multipart(
                "/api/uploadFile",
                &[
                    Part::Text("folder", "Rehearsals/"),
                    Part::File("file", "take1.mp3", b"take-one"),
                ],
            ))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json_body(&body),
            json!({ "message": "File uploaded successfully", "file": "take1.mp3" })
        );
        assert_eq!(app.read_data("Rehearsals/take1.mp3"), b"take-one");
    }

    #[tokio::test]
    async fn test_folder_field_may_come_last() {
        let app = TestApp::new();
        let (status, _, _) = app
            .send(multipart(
                "/api/uploadFile",
                &[
                    Part::File("file", "late.mp3", b"late"),
                    Part::Text("folder", "Late"),
                ],
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.read_data("Late/late.mp3"), b"late");
    }

    #[tokio::test]
    async fn test_upload_file_validation() {
        let app = TestApp::new();

        let (status, _, body) = app
            .send(multipart("/api/uploadFile", &[Part::File("file", "a.mp3", b"a")]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body), json!({ "error": "Missing folder field" }));

        let (status, _, body) = app
            .send(multipart("/api/uploadFile", &[Part::Text("folder", "X")]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body), json!({ "error": "No file provided" }));
    }

    #[tokio::test]
    async fn test_upload_rejects_traversal() {
        let app = TestApp::new();
        let (status, _, _) = app
            .send(multipart(
                "/api/uploadFile",
                &[
                    Part::Text("folder", "../outside"),
                    Part::File("file", "a.mp3", b"a"),
                ],
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_folder() {
        let app = TestApp::new();
        let (status, _, body) = app
            .send(multipart(
                "/api/uploadFolder",
                &[
                    Part::Text("folder", "Concert"),
                    Part::File("files", "one.mp3", b"1"),
                    Part::File("files", "two.mp3", b"22"),
                    Part::File("ignored", "three.mp3", b"333"),
                ],
            ))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json_body(&body),
            json!({ "message": "Folder uploaded successfully", "files": ["one.mp3", "two.mp3"] })
        );
        assert_eq!(app.read_data("Concert/one.mp3"), b"1");
        assert_eq!(app.read_data("Concert/two.mp3"), b"22");
        assert!(!app.data_path("Concert/three.mp3").exists());
    }

    #[tokio::test]
    async fn test_upload_folder_without_files() {
        let app = TestApp::new();
        let (status, _, body) = app
            .send(multipart("/api/uploadFolder", &[Part::Text("folder", "Concert")]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body), json!({ "error": "No files provided" }));
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let app = TestApp::new();
        let (status, headers, body) = app
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/uploadFile")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"folder":"X"}"#))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(json_body(&body), json!({ "error": "Failed to parse form data" }));
    }

    #[tokio::test]
    async fn test_upload_file_store_failure() {
        let app = TestApp::with_failing_writes("");
        let (status, _, body) = app
            .send(multipart(
                "/api/uploadFile",
                &[Part::Text("folder", "X"), Part::File("file", "a.mp3", b"a")],
            ))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(&body), json!({ "error": "Failed to upload file" }));
    }

    #[tokio::test]
    async fn test_upload_folder_partial_failure() {
        let app = TestApp::with_failing_writes("broken");
        let (status, _, body) = app
            .send(multipart(
                "/api/uploadFolder",
                &[
                    Part::Text("folder", "Concert"),
                    Part::File("files", "good.mp3", b"ok"),
                    Part::File("files", "broken.mp3", b"no"),
                ],
            ))
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(&body), json!({ "error": "Failed to upload files" }));
        assert!(!app.data_path("Concert/broken.mp3").exists());
    }

    #[tokio::test]
    async fn test_upload_requires_post() {
        let app = TestApp::new();
        let (status, _, _) = app.get("/api/uploadFile").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}

//! Application constants

/// Object in the config store holding the selected keys
pub const SELECTED_KEYS_OBJECT: &str = "selectedKeys.json";

/// Optional pre-generated folder tree at the root of the data store
pub const FILES_MANIFEST_OBJECT: &str = "files.json";

/// Default port, same as the local dev server
pub const DEFAULT_PORT: u16 = 3001;

/// Maximum request body for uploads (200 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Buffer between the zip writer task and the response body
pub const ZIP_BUFFER_SIZE: usize = 1024 * 1024;

/// Timeout for upstream fetches made by the proxy endpoint
pub const PROXY_TIMEOUT_SECS: u64 = 30;

/// Served when an audio file's extension says nothing useful
pub const DEFAULT_AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Subdirectory of the local data path used as config store when none is set
pub const LOCAL_CONFIG_DIR: &str = ".config";

//! Response header helpers shared by the download endpoints.

use axum::http::HeaderValue;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::constants::DEFAULT_AUDIO_CONTENT_TYPE;

/// RFC 5987 `attr-char` minus alphanumerics
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Last path segment of a key
pub fn basename(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or(key)
}

/// `attachment` disposition with an ASCII fallback name and the exact
/// UTF-8 name in `filename*`. Accented names are common in the bucket.
pub fn attachment(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    let value = if fallback == filename {
        format!("attachment; filename=\"{}\"", fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            utf8_percent_encode(filename, ATTR_CHAR)
        )
    };

    // Every byte is visible ASCII at this point
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Content type for playback. Only trust the extension when it is audio.
pub fn audio_content_type(key: &str) -> String {
    mime_guess::from_path(key)
        .iter()
        .find(|mime| mime.type_() == mime_guess::mime::AUDIO)
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_AUDIO_CONTENT_TYPE.to_string())
}

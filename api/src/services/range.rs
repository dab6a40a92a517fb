//! `Range` header handling for streamed playback.
//!
//! Only single `bytes=` ranges are honoured. Anything malformed is ignored
//! and the whole object is served. A well-formed range that selects nothing
//! (start past the end, or end before start) is unsatisfiable.

use axum::http::HeaderValue;

use crate::storage::ByteRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    Full,
    Partial(ByteRange),
    Unsatisfiable,
}

pub fn resolve(header: Option<&HeaderValue>, size: u64) -> RangeRequest {
    let Some(spec) = header
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().strip_prefix("bytes="))
    else {
        return RangeRequest::Full;
    };
    if spec.contains(',') {
        return RangeRequest::Full;
    }
    let Some((start, end)) = spec.split_once('-') else {
        return RangeRequest::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // bytes=-N: the last N bytes
        let Ok(suffix) = end.parse::<u64>() else {
            return RangeRequest::Full;
        };
        if suffix == 0 || size == 0 {
            return RangeRequest::Unsatisfiable;
        }
        return RangeRequest::Partial(ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        });
    }

    let Ok(start) = start.parse::<u64>() else {
        return RangeRequest::Full;
    };
    let end = if end.is_empty() {
        None
    } else {
        match end.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            Ok(_) => return RangeRequest::Unsatisfiable,
            Err(_) => return RangeRequest::Full,
        }
    };

    if start >= size {
        return RangeRequest::Unsatisfiable;
    }
    let last = size - 1;
    RangeRequest::Partial(ByteRange {
        start,
        end: end.map_or(last, |end| end.min(last)),
    })
}

//! JSON bodies for RPC messages, optionally gzip-compressed
//!
//! Compression is signalled with a `Content-Encoding: gzip` header so
//! either side can decode without knowing which method compresses.

use async_nats::HeaderMap;
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

use crate::types::{HeraldError, Result};

pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const GZIP: &str = "gzip";

/// Largest decompressed body accepted
pub const MAX_DECODED: usize = 16 * 1024 * 1024;

/// Serialize `value`, compressing when asked
pub fn encode<T: Serialize>(value: &T, compress: bool) -> Result<(HeaderMap, Bytes)> {
    let json = serde_json::to_vec(value)?;
    let mut headers = HeaderMap::new();
    if !compress {
        return Ok((headers, json.into()));
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| HeraldError::Codec(format!("gzip write error: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| HeraldError::Codec(format!("gzip finish error: {e}")))?;
    headers.insert(CONTENT_ENCODING, GZIP);
    Ok((headers, compressed.into()))
}

/// Whether the headers mark the body as gzip
pub fn is_gzip(headers: Option<&HeaderMap>) -> bool {
    headers
        .and_then(|h| h.get(CONTENT_ENCODING))
        .map(|v| v.as_str().eq_ignore_ascii_case(GZIP))
        .unwrap_or(false)
}

/// Deserialize a body, decompressing if the headers say so
pub fn decode<T: DeserializeOwned>(headers: Option<&HeaderMap>, payload: &[u8]) -> Result<T> {
    if !is_gzip(headers) {
        return Ok(serde_json::from_slice(payload)?);
    }

    let mut json = Vec::with_capacity(payload.len() * 2);
    GzDecoder::new(payload)
        .take(MAX_DECODED as u64 + 1)
        .read_to_end(&mut json)
        .map_err(|e| HeraldError::Codec(format!("gzip decode error: {e}")))?;
    if json.len() > MAX_DECODED {
        return Err(HeraldError::Codec(format!("gzip body exceeds {MAX_DECODED} bytes")));
    }
    Ok(serde_json::from_slice(&json)?)
}

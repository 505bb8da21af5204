//! Client frame as seen by the gateway after wire decoding

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Protocol version carried by frames built in this crate
pub const PROTO_VERSION: i32 = 1;

/// One decoded client frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proto {
    pub ver: i32,
    pub op: i32,
    pub seq: i32,
    pub body: Bytes,
}

impl Proto {
    /// Create a frame with the current protocol version
    pub fn new(op: i32, seq: i32, body: impl Into<Bytes>) -> Self {
        Self {
            ver: PROTO_VERSION,
            op,
            seq,
            body: body.into(),
        }
    }

    /// Body interpreted as UTF-8, lossy
    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

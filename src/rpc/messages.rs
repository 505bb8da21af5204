//! Request/reply shapes of the session RPC surface

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::model::Proto;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectReq {
    pub server: String,
    pub cookie: String,
    /// Opaque credential from the client's auth frame
    pub token: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectReply {
    pub mid: i64,
    pub key: String,
    pub room_id: String,
    pub accepts: Vec<i32>,
    pub heartbeat_ms: u64,
}

impl ConnectReply {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectReq {
    pub server: String,
    pub mid: i64,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectReply {
    /// Whether a live mapping was removed
    pub has: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatReq {
    pub server: String,
    pub mid: i64,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineReq {
    pub server: String,
    pub room_count: HashMap<String, i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineReply {
    pub all_room_count: HashMap<String, i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveReq {
    pub mid: i64,
    pub proto: Proto,
}

/// Reply wrapper carried over the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcResult<T> {
    Ok(T),
    Err(String),
}

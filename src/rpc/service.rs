//! The logic tier's session service contract

use super::messages::{
    ConnectReply, ConnectReq, DisconnectReply, DisconnectReq, HeartbeatReq, OnlineReply, OnlineReq,
    ReceiveReq,
};
use crate::types::Result;

/// Session operations the logic tier serves to gateway nodes.
///
/// Implemented in-process by [`crate::logic::Logic`] and over NATS by
/// [`super::LogicClient`].
#[async_trait::async_trait]
pub trait LogicRpc: Send + Sync {
    async fn connect(&self, req: ConnectReq) -> Result<ConnectReply>;

    async fn disconnect(&self, req: DisconnectReq) -> Result<DisconnectReply>;

    async fn heartbeat(&self, req: HeartbeatReq) -> Result<()>;

    async fn renew_online(&self, req: OnlineReq) -> Result<OnlineReply>;

    async fn receive(&self, req: ReceiveReq) -> Result<()>;
}

/// RPC method names, also the last subject token
pub mod method {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const RENEW_ONLINE: &str = "renew_online";
    pub const RECEIVE: &str = "receive";
}

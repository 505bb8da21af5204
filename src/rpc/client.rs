//! Session RPC client used by gateway nodes

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::codec;
use super::messages::{
    ConnectReply, ConnectReq, DisconnectReply, DisconnectReq, HeartbeatReq, OnlineReply, OnlineReq,
    ReceiveReq, RpcResult,
};
use super::service::{method, LogicRpc};
use crate::nats::NatsClient;
use crate::types::{HeraldError, Result};

/// Calls the logic tier over NATS request/reply
#[derive(Clone)]
pub struct LogicClient {
    nats: NatsClient,
    prefix: String,
}

impl LogicClient {
    pub fn new(nats: NatsClient, prefix: impl Into<String>) -> Self {
        Self {
            nats,
            prefix: prefix.into(),
        }
    }

    async fn call<Req, Resp>(&self, method: &str, req: &Req, compress: bool) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let subject = format!("{}.{}", self.prefix, method);
        let (headers, body) = codec::encode(req, compress)?;
        debug!(subject = %subject, bytes = body.len(), "RPC call");

        let msg = self
            .nats
            .request_with_headers(&subject, headers, body)
            .await?;

        match codec::decode::<RpcResult<Resp>>(msg.headers.as_ref(), &msg.payload)? {
            RpcResult::Ok(resp) => Ok(resp),
            RpcResult::Err(e) => Err(HeraldError::Rpc(e)),
        }
    }
}

#[async_trait::async_trait]
impl LogicRpc for LogicClient {
    async fn connect(&self, req: ConnectReq) -> Result<ConnectReply> {
        self.call(method::CONNECT, &req, false).await
    }

    async fn disconnect(&self, req: DisconnectReq) -> Result<DisconnectReply> {
        self.call(method::DISCONNECT, &req, false).await
    }

    async fn heartbeat(&self, req: HeartbeatReq) -> Result<()> {
        self.call(method::HEARTBEAT, &req, false).await
    }

    async fn renew_online(&self, req: OnlineReq) -> Result<OnlineReply> {
        // Room maps can be large; always compress.
        self.call(method::RENEW_ONLINE, &req, true).await
    }

    async fn receive(&self, req: ReceiveReq) -> Result<()> {
        self.call(method::RECEIVE, &req, false).await
    }
}

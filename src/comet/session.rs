//! Gateway-side session calls into the logic tier

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::model::Proto;
use crate::rpc::{ConnectReq, DisconnectReq, HeartbeatReq, LogicRpc, OnlineReq, ReceiveReq};
use crate::types::{HeraldError, Result};

/// Default bound on a detached disconnect
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity granted to an authenticated connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub mid: i64,
    pub key: String,
    pub room_id: String,
    pub accepts: Vec<i32>,
    pub heartbeat: Duration,
}

/// Issues session RPCs on behalf of this node's connections
#[derive(Clone)]
pub struct SessionHandler {
    server_id: String,
    rpc: Arc<dyn LogicRpc>,
    disconnect_timeout: Duration,
}

impl SessionHandler {
    pub fn new(server_id: impl Into<String>, rpc: Arc<dyn LogicRpc>) -> Self {
        Self {
            server_id: server_id.into(),
            rpc,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
        }
    }

    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Authenticate a connection with the token from its auth frame.
    ///
    /// On error the connection must not be treated as authenticated.
    pub async fn connect(&self, cookie: &str, token: Bytes) -> Result<Session> {
        let reply = self
            .rpc
            .connect(ConnectReq {
                server: self.server_id.clone(),
                cookie: cookie.to_string(),
                token,
            })
            .await?;
        Ok(Session {
            heartbeat: reply.heartbeat(),
            mid: reply.mid,
            key: reply.key,
            room_id: reply.room_id,
            accepts: reply.accepts,
        })
    }

    /// Report a closed connection.
    ///
    /// Runs on its own task, bounded by the disconnect timeout rather than
    /// the caller: dropping the handle or cancelling the caller does not
    /// stop the call. The handle resolves to whether a mapping was removed.
    pub fn disconnect(&self, mid: i64, key: &str) -> JoinHandle<Result<bool>> {
        let rpc = Arc::clone(&self.rpc);
        let req = DisconnectReq {
            server: self.server_id.clone(),
            mid,
            key: key.to_string(),
        };
        let timeout = self.disconnect_timeout;
        tokio::spawn(async move {
            let key = req.key.clone();
            match tokio::time::timeout(timeout, rpc.disconnect(req)).await {
                Ok(Ok(reply)) => Ok(reply.has),
                Ok(Err(e)) => {
                    error!(mid, key = %key, "disconnect failed: {}", e);
                    Err(e)
                }
                Err(_) => {
                    warn!(mid, key = %key, "disconnect timed out after {:?}", timeout);
                    Err(HeraldError::Rpc(format!("disconnect timed out after {timeout:?}")))
                }
            }
        })
    }

    /// Renew the connection's presence
    pub async fn heartbeat(&self, mid: i64, key: &str) -> Result<()> {
        self.rpc
            .heartbeat(HeartbeatReq {
                server: self.server_id.clone(),
                mid,
                key: key.to_string(),
            })
            .await
    }

    /// Report local room counts, get the cluster-wide counts back
    pub async fn renew_online(
        &self,
        room_count: HashMap<String, i32>,
    ) -> Result<HashMap<String, i32>> {
        let reply = self
            .rpc
            .renew_online(OnlineReq {
                server: self.server_id.clone(),
                room_count,
            })
            .await?;
        Ok(reply.all_room_count)
    }

    /// Relay an application frame to the logic tier
    pub async fn receive(&self, mid: i64, proto: Proto) -> Result<()> {
        self.rpc.receive(ReceiveReq { mid, proto }).await
    }
}

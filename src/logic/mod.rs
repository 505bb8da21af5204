//! Logic tier: session business rules and push dispatch
//!
//! [`Logic`] serves the session RPC surface for gateway nodes and keeps
//! presence current; [`PushDispatcher`] turns logical sends into
//! published envelopes.

pub mod online;
pub mod push;

pub use online::RoomOnline;
pub use push::{PushDispatcher, PushReport};

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::presence::PresenceStore;
use crate::rpc::{
    ConnectReply, ConnectReq, DisconnectReply, DisconnectReq, HeartbeatReq, LogicRpc, OnlineReply,
    OnlineReq, ReceiveReq,
};
use crate::types::{HeraldError, Result};

/// Logic service configuration
#[derive(Debug, Clone)]
pub struct LogicConfig {
    /// Heartbeat interval handed to new connections
    pub heartbeat: Duration,
    /// Age after which a server's room report no longer counts
    pub online_ttl: Duration,
}

impl Default for LogicConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(240),
            online_ttl: Duration::from_secs(60),
        }
    }
}

/// Credential presented in the client's auth frame
#[derive(Debug, Deserialize)]
struct ConnectToken {
    #[serde(default)]
    mid: i64,
    #[serde(default)]
    key: String,
    #[serde(default)]
    room_id: String,
    #[serde(default)]
    platform: String,
    #[serde(default)]
    accepts: Vec<i32>,
}

/// Session business rules backed by the presence store
pub struct Logic {
    config: LogicConfig,
    presence: Arc<dyn PresenceStore>,
    online: RoomOnline,
    closed: AtomicBool,
}

impl Logic {
    pub fn new(config: LogicConfig, presence: Arc<dyn PresenceStore>) -> Self {
        let online = RoomOnline::new(config.online_ttl);
        Self {
            config,
            presence,
            online,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &LogicConfig {
        &self.config
    }

    /// Cluster-wide room occupancy
    pub fn online(&self) -> &RoomOnline {
        &self.online
    }

    /// Refuse new connections from now on
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Logic service closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LogicRpc for Logic {
    async fn connect(&self, req: ConnectReq) -> Result<ConnectReply> {
        if self.is_closed() {
            return Err(HeraldError::Internal("logic service is shutting down".into()));
        }
        if req.server.is_empty() {
            return Err(HeraldError::BadRequest("connect without server".into()));
        }
        let token: ConnectToken = serde_json::from_slice(&req.token)
            .map_err(|e| HeraldError::Unauthorized(format!("invalid token: {e}")))?;

        let key = if token.key.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            token.key
        };
        self.presence.add_mapping(token.mid, &key, &req.server).await?;

        info!(
            mid = token.mid,
            key = %key,
            server = %req.server,
            platform = %token.platform,
            room = %token.room_id,
            "conn connected"
        );

        Ok(ConnectReply {
            mid: token.mid,
            key,
            room_id: token.room_id,
            accepts: token.accepts,
            heartbeat_ms: self.config.heartbeat.as_millis() as u64,
        })
    }

    async fn disconnect(&self, req: DisconnectReq) -> Result<DisconnectReply> {
        let has = self
            .presence
            .del_mapping(req.mid, &req.key, &req.server)
            .await?;
        info!(mid = req.mid, key = %req.key, server = %req.server, has, "conn disconnected");
        Ok(DisconnectReply { has })
    }

    async fn heartbeat(&self, req: HeartbeatReq) -> Result<()> {
        let has = self.presence.expire_mapping(req.mid, &req.key).await?;
        if !has {
            // Expired or evicted while the socket stayed up: re-register.
            self.presence
                .add_mapping(req.mid, &req.key, &req.server)
                .await?;
        }
        debug!(mid = req.mid, key = %req.key, server = %req.server, has, "conn heartbeat");
        Ok(())
    }

    async fn renew_online(&self, req: OnlineReq) -> Result<OnlineReply> {
        if req.server.is_empty() {
            return Err(HeraldError::BadRequest("online report without server".into()));
        }
        let rooms = req.room_count.len();
        let all_room_count: HashMap<String, i32> = self.online.update(&req.server, req.room_count);
        debug!(server = %req.server, rooms, total_rooms = all_room_count.len(), "online renewed");
        Ok(OnlineReply { all_room_count })
    }

    async fn receive(&self, req: ReceiveReq) -> Result<()> {
        if req.proto.body.is_empty() {
            warn!(mid = req.mid, op = req.proto.op, "receive with empty body");
        }
        info!(
            mid = req.mid,
            op = req.proto.op,
            seq = req.proto.seq,
            bytes = req.proto.body.len(),
            "receive"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Proto;
    use crate::presence::MemoryPresence;
    use bytes::Bytes;

    fn logic() -> (Logic, Arc<MemoryPresence>) {
        let presence = Arc::new(MemoryPresence::new(Duration::from_secs(60)));
        (Logic::new(LogicConfig::default(), presence.clone()), presence)
    }

    fn connect_req(token: &str) -> ConnectReq {
        ConnectReq {
            server: "srvA".into(),
            cookie: String::new(),
            token: Bytes::from(token.to_string()),
        }
    }

    #[tokio::test]
    async fn test_connect_registers_presence() {
        let (logic, presence) = logic();
        let token = serde_json::json!({
            "mid": 7,
            "key": "k1",
            "room_id": "live://1",
            "platform": "web",
            "accepts": [1000, 1001],
        })
        .to_string();
        let reply = logic.connect(connect_req(&token)).await.unwrap();

        assert_eq!(reply.key, "k1");
        assert_eq!(reply.accepts, vec![1000, 1001]);
        assert_eq!(reply.heartbeat(), Duration::from_secs(240));
        assert_eq!(
            presence.servers_by_keys(&["k1".to_string()]).await.unwrap(),
            vec!["srvA"]
        );
        assert_eq!(presence.keys_by_mids(&[7]).await.unwrap().keys, vec!["k1"]);
    }

    #[tokio::test]
    async fn test_connect_assigns_key() {
        let (logic, _) = logic();
        let reply = logic.connect(connect_req(r#"{"mid":7}"#)).await.unwrap();
        assert!(!reply.key.is_empty());
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_token_without_side_effects() {
        let (logic, presence) = logic();
        let err = logic.connect(connect_req("not-json")).await.unwrap_err();
        assert!(matches!(err, HeraldError::Unauthorized(_)));
        assert!(presence.is_empty());
    }

    #[tokio::test]
    async fn test_closed_logic_refuses_connect() {
        let (logic, _) = logic();
        logic.close();
        assert!(logic.connect(connect_req(r#"{"mid":7}"#)).await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (logic, _) = logic();
        logic
            .connect(connect_req(r#"{"mid":7,"key":"k1"}"#))
            .await
            .unwrap();
        let req = DisconnectReq {
            server: "srvA".into(),
            mid: 7,
            key: "k1".into(),
        };

        assert!(logic.disconnect(req.clone()).await.unwrap().has);
        assert!(!logic.disconnect(req).await.unwrap().has);
    }

    #[tokio::test]
    async fn test_heartbeat_restores_missing_mapping() {
        let (logic, presence) = logic();
        logic
            .heartbeat(HeartbeatReq {
                server: "srvB".into(),
                mid: 9,
                key: "k9".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            presence.servers_by_keys(&["k9".to_string()]).await.unwrap(),
            vec!["srvB"]
        );
    }

    #[tokio::test]
    async fn test_renew_online_aggregates() {
        let (logic, _) = logic();
        let mut a = HashMap::new();
        a.insert("live://1".to_string(), 2);
        logic
            .renew_online(OnlineReq {
                server: "srvA".into(),
                room_count: a,
            })
            .await
            .unwrap();

        let mut b = HashMap::new();
        b.insert("live://1".to_string(), 5);
        let reply = logic
            .renew_online(OnlineReq {
                server: "srvB".into(),
                room_count: b,
            })
            .await
            .unwrap();
        assert_eq!(reply.all_room_count["live://1"], 7);
    }

    #[tokio::test]
    async fn test_receive_accepts_frames() {
        let (logic, _) = logic();
        let req = ReceiveReq {
            mid: 7,
            proto: Proto::new(1000, 1, Bytes::from("hi")),
        };
        assert!(logic.receive(req).await.is_ok());
    }
}

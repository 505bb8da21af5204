//! NATS responder for the session RPC surface
//!
//! Subscribes to `<prefix>.*`; each request is handled on its own task.
//! Presence and room counts live in this process, so exactly one logic
//! instance may serve a given prefix.

use async_nats::HeaderMap;
use bytes::Bytes;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::codec;
use super::messages::RpcResult;
use super::service::{method, LogicRpc};
use crate::types::{HeraldError, Result};

/// Running RPC responder
pub struct RpcServer {
    cancel: CancellationToken,
    tracker: TaskTracker,
    listener: JoinHandle<()>,
}

impl RpcServer {
    /// Start serving `<prefix>.<method>` requests
    pub async fn start(
        client: async_nats::Client,
        prefix: &str,
        service: Arc<dyn LogicRpc>,
    ) -> Result<Self> {
        let subject = format!("{prefix}.*");
        let mut subscriber = client
            .subscribe(subject.clone())
            .await
            .map_err(|e| HeraldError::Nats(format!("Subscribe to {} failed: {}", subject, e)))?;

        info!("Serving session RPC on {}", subject);

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let listener = {
            let cancel = cancel.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        next = subscriber.next() => {
                            let Some(msg) = next else { break };
                            let client = client.clone();
                            let service = Arc::clone(&service);
                            tracker.spawn(async move {
                                handle_message(&client, service.as_ref(), msg).await;
                            });
                        }
                    }
                }
                if let Err(e) = subscriber.unsubscribe().await {
                    warn!("Failed to unsubscribe RPC listener: {}", e);
                }
                tracker.close();
            })
        };

        Ok(Self {
            cancel,
            tracker,
            listener,
        })
    }

    /// Stop taking requests and wait up to `drain` for in-flight ones
    pub async fn graceful_stop(self, drain: Duration) {
        self.cancel.cancel();
        if let Err(e) = self.listener.await {
            error!("RPC listener task failed: {}", e);
        }
        if tokio::time::timeout(drain, self.tracker.wait()).await.is_err() {
            warn!(
                "RPC drain timed out with {} request(s) in flight",
                self.tracker.len()
            );
        } else {
            info!("RPC server stopped");
        }
    }
}

async fn handle_message(
    client: &async_nats::Client,
    service: &dyn LogicRpc,
    msg: async_nats::Message,
) {
    let Some(reply) = msg.reply.clone() else {
        warn!(subject = %msg.subject, "Dropping RPC request without reply subject");
        return;
    };
    let method = msg.subject.as_str().rsplit('.').next().unwrap_or_default().to_string();

    match dispatch(service, &method, msg.headers.as_ref(), &msg.payload).await {
        Ok((headers, body)) => {
            if let Err(e) = client.publish_with_headers(reply, headers, body).await {
                error!(method = %method, "Failed to publish RPC reply: {}", e);
            }
        }
        Err(e) => error!(method = %method, "Failed to encode RPC reply: {}", e),
    }
}

/// Decode a request for `method`, run it, and encode the reply.
///
/// Service errors travel inside the reply; only reply encoding can fail.
pub async fn dispatch(
    service: &dyn LogicRpc,
    method: &str,
    headers: Option<&HeaderMap>,
    payload: &[u8],
) -> Result<(HeaderMap, Bytes)> {
    let compress = codec::is_gzip(headers);
    debug!(method = %method, bytes = payload.len(), "RPC request");

    match method {
        method::CONNECT => call(headers, payload, compress, |req| service.connect(req)).await,
        method::DISCONNECT => call(headers, payload, compress, |req| service.disconnect(req)).await,
        method::HEARTBEAT => call(headers, payload, compress, |req| service.heartbeat(req)).await,
        method::RENEW_ONLINE => {
            call(headers, payload, compress, |req| service.renew_online(req)).await
        }
        method::RECEIVE => call(headers, payload, compress, |req| service.receive(req)).await,
        other => codec::encode(
            &RpcResult::<()>::Err(format!("unknown method {other}")),
            compress,
        ),
    }
}

async fn call<Req, Resp, F, Fut>(
    headers: Option<&HeaderMap>,
    payload: &[u8],
    compress: bool,
    handler: F,
) -> Result<(HeaderMap, Bytes)>
where
    Req: DeserializeOwned,
    Resp: Serialize,
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = Result<Resp>>,
{
    let result = match codec::decode::<Req>(headers, payload) {
        Ok(req) => match handler(req).await {
            Ok(resp) => RpcResult::Ok(resp),
            Err(e) => RpcResult::Err(e.to_string()),
        },
        Err(e) => RpcResult::Err(e.to_string()),
    };
    codec::encode(&result, compress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::{Logic, LogicConfig};
    use crate::presence::MemoryPresence;
    use crate::rpc::messages::{ConnectReply, ConnectReq, OnlineReply, OnlineReq};
    use std::collections::HashMap;

    fn logic() -> Logic {
        Logic::new(
            LogicConfig::default(),
            Arc::new(MemoryPresence::new(Duration::from_secs(60))),
        )
    }

    #[tokio::test]
    async fn test_dispatch_connect() {
        let logic = logic();
        let req = ConnectReq {
            server: "srvA".into(),
            cookie: String::new(),
            token: Bytes::from(r#"{"mid":7,"room_id":"live://1","accepts":[1000]}"#),
        };
        let (headers, body) = codec::encode(&req, false).unwrap();

        let (reply_headers, reply) = dispatch(&logic, method::CONNECT, Some(&headers), &body)
            .await
            .unwrap();

        let decoded: RpcResult<ConnectReply> = codec::decode(Some(&reply_headers), &reply).unwrap();
        match decoded {
            RpcResult::Ok(reply) => {
                assert_eq!(reply.mid, 7);
                assert_eq!(reply.room_id, "live://1");
                assert!(!reply.key.is_empty());
            }
            RpcResult::Err(e) => panic!("connect failed: {e}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_answers_compressed_with_compressed() {
        let logic = logic();
        let mut room_count = HashMap::new();
        room_count.insert("live://1".to_string(), 3);
        let req = OnlineReq {
            server: "srvA".into(),
            room_count,
        };
        let (headers, body) = codec::encode(&req, true).unwrap();

        let (reply_headers, reply) =
            dispatch(&logic, method::RENEW_ONLINE, Some(&headers), &body)
                .await
                .unwrap();

        assert!(codec::is_gzip(Some(&reply_headers)));
        let decoded: RpcResult<OnlineReply> = codec::decode(Some(&reply_headers), &reply).unwrap();
        assert!(matches!(decoded, RpcResult::Ok(r) if r.all_room_count["live://1"] == 3));
    }

    #[tokio::test]
    async fn test_dispatch_reports_errors_in_reply() {
        let logic = logic();
        let (headers, reply) = dispatch(&logic, "nope", None, b"{}").await.unwrap();
        let decoded: RpcResult<()> = codec::decode(Some(&headers), &reply).unwrap();
        assert!(matches!(decoded, RpcResult::Err(e) if e.contains("unknown method")));

        let (headers, reply) = dispatch(&logic, method::HEARTBEAT, None, b"garbage")
            .await
            .unwrap();
        let decoded: RpcResult<()> = codec::decode(Some(&headers), &reply).unwrap();
        assert!(matches!(decoded, RpcResult::Err(_)));
    }
}

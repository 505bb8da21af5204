//! Fakes shared by unit tests

use bytes::Bytes;
use futures::Stream;
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::nats::ack::encode_pub_ack;
use crate::nats::{AckStream, BusMessage, MessageBus, StreamSpec};
use crate::presence::{MidKeys, PresenceStore};
use crate::rpc::{
    ConnectReply, ConnectReq, DisconnectReply, DisconnectReq, HeartbeatReq, LogicRpc, OnlineReply,
    OnlineReq, ReceiveReq,
};
use crate::types::{HeraldError, Result};

/// How the fake broker answers a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    Ack,
    /// Never acknowledge
    Drop,
    /// Send an unparseable message, then a valid ack
    GarbageThenAck,
    /// Refuse the message
    Reject,
}

#[derive(Default)]
struct State {
    subs: HashMap<String, mpsc::UnboundedSender<Bytes>>,
    published: Vec<BusMessage>,
    events: Vec<String>,
    streams: HashSet<String>,
    streams_created: usize,
    provisioning_error: Option<String>,
    failing_subjects: HashSet<String>,
    subscribe_count: usize,
    seq: u64,
}

/// In-memory broker that acks on the attached inbox
pub struct FakeBus {
    state: Arc<Mutex<State>>,
    mode: Mutex<AckMode>,
    active: Arc<AtomicUsize>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            mode: Mutex::new(AckMode::Ack),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_mode(&self, mode: AckMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn fail_provisioning(&self, reason: &str) {
        self.state.lock().unwrap().provisioning_error = Some(reason.to_string());
    }

    pub fn fail_publish_to(&self, subject: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_subjects
            .insert(subject.to_string());
    }

    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.state.lock().unwrap().subscribe_count
    }

    pub fn streams_created(&self) -> usize {
        self.state.lock().unwrap().streams_created
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn published(&self) -> Vec<BusMessage> {
        self.state.lock().unwrap().published.clone()
    }
}

struct FakeSubscription {
    subject: String,
    rx: mpsc::UnboundedReceiver<Bytes>,
    state: Arc<Mutex<State>>,
    active: Arc<AtomicUsize>,
}

impl Stream for FakeSubscription {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for FakeSubscription {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        if let Ok(mut state) = self.state.lock() {
            state.subs.remove(&self.subject);
            state.events.push(format!("unsubscribe:{}", self.subject));
        }
    }
}

#[async_trait::async_trait]
impl MessageBus for FakeBus {
    async fn create_stream(&self, spec: &StreamSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.provisioning_error {
            return Err(HeraldError::Provisioning(reason.clone()));
        }
        if !state.streams.insert(spec.name.clone()) {
            return Err(HeraldError::StreamExists(spec.name.clone()));
        }
        state.streams_created += 1;
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<AckStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock().unwrap();
            state.subs.insert(subject.to_string(), tx);
            state.subscribe_count += 1;
            state.events.push(format!("subscribe:{subject}"));
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(FakeSubscription {
            subject: subject.to_string(),
            rx,
            state: Arc::clone(&self.state),
            active: Arc::clone(&self.active),
        }))
    }

    async fn publish(&self, msg: BusMessage) -> Result<()> {
        let mode = *self.mode.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        if state.failing_subjects.contains(&msg.subject) {
            return Err(HeraldError::Publish(format!("broker refused {}", msg.subject)));
        }
        state.events.push(format!("publish:{}", msg.subject));
        state.published.push(msg.clone());
        state.seq += 1;
        let seq = state.seq;

        let Some(inbox) = state.subs.get(&msg.ack_inbox) else {
            return Ok(());
        };
        match mode {
            AckMode::Ack => {
                let _ = inbox.send(encode_pub_ack("HERALD_PUSH", seq));
            }
            AckMode::GarbageThenAck => {
                let _ = inbox.send(Bytes::from_static(b"{not an ack"));
                let _ = inbox.send(encode_pub_ack("HERALD_PUSH", seq));
            }
            AckMode::Reject => {
                let _ = inbox.send(Bytes::from_static(
                    br#"{"error":{"code":503,"description":"stream offline"}}"#,
                ));
            }
            AckMode::Drop => {}
        }
        Ok(())
    }
}

/// Presence store returning fixed answers, consistent or not
#[derive(Default)]
pub struct StubPresence {
    pub servers: HashMap<String, String>,
    pub mid_keys: MidKeys,
    pub fail: bool,
}

#[async_trait::async_trait]
impl PresenceStore for StubPresence {
    async fn servers_by_keys(&self, keys: &[String]) -> Result<Vec<String>> {
        if self.fail {
            return Err(HeraldError::Presence("store unavailable".into()));
        }
        Ok(keys
            .iter()
            .map(|k| self.servers.get(k).cloned().unwrap_or_default())
            .collect())
    }

    async fn keys_by_mids(&self, _mids: &[i64]) -> Result<MidKeys> {
        if self.fail {
            return Err(HeraldError::Presence("store unavailable".into()));
        }
        Ok(self.mid_keys.clone())
    }

    async fn add_mapping(&self, _mid: i64, _key: &str, _server: &str) -> Result<()> {
        Ok(())
    }

    async fn expire_mapping(&self, _mid: i64, _key: &str) -> Result<bool> {
        Ok(true)
    }

    async fn del_mapping(&self, _mid: i64, _key: &str, _server: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Session RPC fake that records every call
#[derive(Default)]
pub struct RecordingRpc {
    pub(crate) calls: Mutex<Vec<String>>,
    /// Fail every call
    pub fail: bool,
    /// Delay applied to disconnect before it is recorded
    pub disconnect_delay: std::time::Duration,
    /// Cluster-wide counts returned by renew_online
    pub all_room_count: HashMap<String, i32>,
}

impl RecordingRpc {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            return Err(HeraldError::Rpc("logic unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LogicRpc for RecordingRpc {
    async fn connect(&self, req: ConnectReq) -> Result<ConnectReply> {
        self.record(format!("connect:{}", req.server))?;
        Ok(ConnectReply {
            mid: 7,
            key: "k1".into(),
            room_id: "live://1".into(),
            accepts: vec![1000],
            heartbeat_ms: 30_000,
        })
    }

    async fn disconnect(&self, req: DisconnectReq) -> Result<DisconnectReply> {
        if !self.disconnect_delay.is_zero() {
            tokio::time::sleep(self.disconnect_delay).await;
        }
        self.record(format!("disconnect:{}:{}", req.mid, req.key))?;
        Ok(DisconnectReply { has: true })
    }

    async fn heartbeat(&self, req: HeartbeatReq) -> Result<()> {
        self.record(format!("heartbeat:{}:{}", req.mid, req.key))
    }

    async fn renew_online(&self, req: OnlineReq) -> Result<OnlineReply> {
        self.record(format!("renew_online:{}", req.room_count.len()))?;
        Ok(OnlineReply {
            all_room_count: self.all_room_count.clone(),
        })
    }

    async fn receive(&self, req: ReceiveReq) -> Result<()> {
        self.record(format!("receive:{}:{}", req.mid, req.proto.op))
    }
}

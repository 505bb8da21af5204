//! Push dispatch: resolve logical targets and fan out per owning server
//!
//! Keys are grouped by the server that owns them and one targeted
//! envelope is published per server. Per-server publishes run
//! concurrently; every server is attempted, and any failure is reported
//! as [`HeraldError::PartialPush`] with the full per-server outcome.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::model::{encode_room_key, PushEnvelope};
use crate::nats::DurablePublisher;
use crate::presence::PresenceStore;
use crate::types::{HeraldError, PushFailure, Result};

/// Outcome of a successful push
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PushReport {
    /// Servers that acknowledged their envelope
    pub servers: Vec<String>,
    /// Targets dropped because their key or server was unknown
    pub skipped: usize,
}

/// Turns logical sends into published envelopes
pub struct PushDispatcher {
    presence: Arc<dyn PresenceStore>,
    publisher: Arc<DurablePublisher>,
    subject_prefix: String,
}

impl PushDispatcher {
    pub fn new(
        presence: Arc<dyn PresenceStore>,
        publisher: Arc<DurablePublisher>,
        subject_prefix: impl Into<String>,
    ) -> Self {
        Self {
            presence,
            publisher,
            subject_prefix: subject_prefix.into(),
        }
    }

    /// Resolve a caller deadline, defaulting to one ack timeout from now
    fn deadline(&self, deadline: Option<Instant>) -> Instant {
        deadline.unwrap_or_else(|| Instant::now() + self.publisher.config().ack_timeout)
    }

    /// Push to explicit connection keys
    pub async fn push_keys(
        &self,
        op: i32,
        keys: &[String],
        msg: Bytes,
        deadline: Option<Instant>,
    ) -> Result<PushReport> {
        let deadline = self.deadline(deadline);
        let servers = self.presence.servers_by_keys(keys).await?;

        let mut groups = ServerGroups::default();
        for (key, server) in keys.iter().zip(servers.iter()) {
            if key.is_empty() || server.is_empty() {
                warn!("push key:{} server:{} is empty", key, server);
                groups.skipped += 1;
                continue;
            }
            groups.add(server, key);
        }
        // A short reply from the store leaves the tail unresolved.
        groups.skipped += keys.len().saturating_sub(servers.len());

        self.publish_groups(op, groups, msg, deadline).await
    }

    /// Push to every live connection of the given users
    pub async fn push_mids(
        &self,
        op: i32,
        mids: &[i64],
        msg: Bytes,
        deadline: Option<Instant>,
    ) -> Result<PushReport> {
        let deadline = self.deadline(deadline);
        let resolved = self.presence.keys_by_mids(mids).await?;

        let mut groups = ServerGroups::default();
        for key in &resolved.keys {
            let server = resolved
                .key_servers
                .get(key)
                .map(String::as_str)
                .unwrap_or_default();
            if key.is_empty() || server.is_empty() {
                warn!("push key:{} server:{} is empty", key, server);
                groups.skipped += 1;
                continue;
            }
            groups.add(server, key);
        }

        self.publish_groups(op, groups, msg, deadline).await
    }

    /// Push to a room; gateways fan out to members
    pub async fn push_room(
        &self,
        op: i32,
        typ: &str,
        room: &str,
        msg: Bytes,
        deadline: Option<Instant>,
    ) -> Result<PushReport> {
        let envelope = PushEnvelope::room(op, encode_room_key(typ, room), msg);
        self.publish(&envelope, self.deadline(deadline)).await?;
        Ok(PushReport::default())
    }

    /// Push to every connection; `speed` paces gateway-side delivery
    pub async fn push_all(
        &self,
        op: i32,
        speed: i32,
        msg: Bytes,
        deadline: Option<Instant>,
    ) -> Result<PushReport> {
        let envelope = PushEnvelope::broadcast(op, speed, msg);
        self.publish(&envelope, self.deadline(deadline)).await?;
        Ok(PushReport::default())
    }

    async fn publish(&self, envelope: &PushEnvelope, deadline: Instant) -> Result<()> {
        let subject = envelope.subject(&self.subject_prefix);
        let ack = self
            .publisher
            .publish_until(&subject, envelope.partition_key(), envelope.to_bytes()?, deadline)
            .await?;
        debug!(
            op = envelope.operation(),
            subject = %subject,
            offset = ack.offset,
            "Push acknowledged"
        );
        Ok(())
    }

    async fn publish_groups(
        &self,
        op: i32,
        groups: ServerGroups,
        msg: Bytes,
        deadline: Instant,
    ) -> Result<PushReport> {
        let skipped = groups.skipped;
        let mut envelopes = Vec::with_capacity(groups.order.len());
        for (server, keys) in groups.into_groups() {
            let envelope = PushEnvelope::targeted(op, server.clone(), keys, msg.clone())?;
            envelopes.push((server, envelope));
        }

        let outcomes = futures::future::join_all(envelopes.iter().map(|(server, envelope)| {
            async move { (server.clone(), self.publish(envelope, deadline).await) }
        }))
        .await;

        let mut failure = PushFailure::default();
        for (server, outcome) in outcomes {
            match outcome {
                Ok(()) => failure.delivered.push(server),
                Err(e) => {
                    warn!(server = %server, "Push to server failed: {}", e);
                    failure.failed.push((server, e.to_string()));
                }
            }
        }

        if failure.failed.is_empty() {
            Ok(PushReport {
                servers: failure.delivered,
                skipped,
            })
        } else {
            Err(HeraldError::PartialPush(failure))
        }
    }
}

/// Keys grouped by server, in first-seen order
#[derive(Default)]
struct ServerGroups {
    order: Vec<String>,
    keys: HashMap<String, Vec<String>>,
    skipped: usize,
}

impl ServerGroups {
    fn add(&mut self, server: &str, key: &str) {
        if !self.keys.contains_key(server) {
            self.order.push(server.to_string());
        }
        self.keys
            .entry(server.to_string())
            .or_default()
            .push(key.to_string());
    }

    fn into_groups(mut self) -> Vec<(String, Vec<String>)> {
        self.order
            .into_iter()
            .map(|server| {
                let keys = self.keys.remove(&server).unwrap_or_default();
                (server, keys)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::PublisherConfig;
    use crate::presence::{MemoryPresence, MidKeys};
    use crate::test_support::{AckMode, FakeBus, StubPresence};
    use std::time::Duration;

    async fn dispatcher(
        presence: Arc<dyn PresenceStore>,
        bus: Arc<FakeBus>,
    ) -> PushDispatcher {
        let publisher = DurablePublisher::new(bus, PublisherConfig::default())
            .await
            .unwrap();
        PushDispatcher::new(presence, Arc::new(publisher), "herald.push")
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn decode(bus: &FakeBus) -> Vec<PushEnvelope> {
        bus.published()
            .iter()
            .map(|m| PushEnvelope::from_bytes(&m.payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_push_keys_groups_by_server_and_skips_unknown() {
        let presence = MemoryPresence::new(Duration::from_secs(60));
        presence.add_mapping(1, "k1", "srvA").await.unwrap();
        presence.add_mapping(2, "k2", "srvA").await.unwrap();
        let bus = Arc::new(FakeBus::new());
        let dispatcher = dispatcher(Arc::new(presence), bus.clone()).await;

        let report = dispatcher
            .push_keys(5, &strings(&["k1", "k2", "k3"]), Bytes::from("p"), None)
            .await
            .unwrap();

        assert_eq!(report.servers, vec!["srvA"]);
        assert_eq!(report.skipped, 1);

        let envelopes = decode(&bus);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(
            envelopes[0],
            PushEnvelope::Targeted {
                operation: 5,
                server: "srvA".to_string(),
                keys: strings(&["k1", "k2"]),
                msg: Bytes::from("p"),
            }
        );
        let published = bus.published();
        assert_eq!(published[0].subject, "herald.push.server.srvA");
        assert_eq!(published[0].key, Bytes::from("k1"));
    }

    #[tokio::test]
    async fn test_push_keys_one_publish_per_server() {
        let presence = MemoryPresence::new(Duration::from_secs(60));
        presence.add_mapping(1, "k1", "srvA").await.unwrap();
        presence.add_mapping(2, "k2", "srvB").await.unwrap();
        presence.add_mapping(3, "k3", "srvA").await.unwrap();
        let bus = Arc::new(FakeBus::new());
        let dispatcher = dispatcher(Arc::new(presence), bus.clone()).await;

        let report = dispatcher
            .push_keys(5, &strings(&["k1", "", "k2", "k3"]), Bytes::from("p"), None)
            .await
            .unwrap();

        assert_eq!(report.servers, vec!["srvA", "srvB"]);
        assert_eq!(report.skipped, 1);

        let mut targets: Vec<(String, Vec<String>)> = decode(&bus)
            .into_iter()
            .map(|e| match e {
                PushEnvelope::Targeted { server, keys, .. } => (server, keys),
                other => panic!("unexpected envelope {other:?}"),
            })
            .collect();
        targets.sort();
        assert_eq!(
            targets,
            vec![
                ("srvA".to_string(), strings(&["k1", "k3"])),
                ("srvB".to_string(), strings(&["k2"])),
            ]
        );
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_push_mids_drops_inconsistent_entries() {
        let mut key_servers = HashMap::new();
        key_servers.insert("a".to_string(), "srvA".to_string());
        key_servers.insert("b".to_string(), String::new());
        key_servers.insert(String::new(), "srvB".to_string());
        key_servers.insert("c".to_string(), "srvA".to_string());
        let presence = StubPresence {
            mid_keys: MidKeys {
                key_servers,
                keys: strings(&["a", "b", "", "c"]),
            },
            ..Default::default()
        };
        let bus = Arc::new(FakeBus::new());
        let dispatcher = dispatcher(Arc::new(presence), bus.clone()).await;

        let report = dispatcher
            .push_mids(4, &[1, 2], Bytes::from("hi"), None)
            .await
            .unwrap();

        assert_eq!(report.skipped, 2);
        let envelopes = decode(&bus);
        assert_eq!(envelopes.len(), 1);
        assert!(matches!(
            &envelopes[0],
            PushEnvelope::Targeted { server, keys, .. }
                if server == "srvA" && *keys == strings(&["a", "c"])
        ));
    }

    #[tokio::test]
    async fn test_push_room_publishes_once_without_resolution() {
        let presence = StubPresence {
            fail: true,
            ..Default::default()
        };
        let bus = Arc::new(FakeBus::new());
        let dispatcher = dispatcher(Arc::new(presence), bus.clone()).await;

        dispatcher
            .push_room(7, "live", "42", Bytes::from("p"), None)
            .await
            .unwrap();

        let envelopes = decode(&bus);
        assert_eq!(
            envelopes,
            vec![PushEnvelope::Room {
                operation: 7,
                room: encode_room_key("live", "42"),
                msg: Bytes::from("p"),
            }]
        );
        assert_eq!(bus.published()[0].subject, "herald.push.room");
    }

    #[tokio::test]
    async fn test_push_all_carries_speed() {
        let bus = Arc::new(FakeBus::new());
        let dispatcher = dispatcher(Arc::new(StubPresence::default()), bus.clone()).await;

        tokio_test::assert_ok!(dispatcher.push_all(9, 100, Bytes::from("p"), None).await);

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].subject, "herald.push.all");
        assert_eq!(published[0].key, Bytes::from("9"));
        assert!(matches!(
            PushEnvelope::from_bytes(&published[0].payload).unwrap(),
            PushEnvelope::Broadcast { speed: 100, .. }
        ));
    }

    #[tokio::test]
    async fn test_partial_failure_still_attempts_every_server() {
        let presence = MemoryPresence::new(Duration::from_secs(60));
        presence.add_mapping(1, "k1", "srvA").await.unwrap();
        presence.add_mapping(2, "k2", "srvB").await.unwrap();
        let bus = Arc::new(FakeBus::new());
        bus.fail_publish_to("herald.push.server.srvA");
        let dispatcher = dispatcher(Arc::new(presence), bus.clone()).await;

        let err = dispatcher
            .push_keys(5, &strings(&["k1", "k2"]), Bytes::from("p"), None)
            .await
            .unwrap_err();

        match err {
            HeraldError::PartialPush(failure) => {
                assert_eq!(failure.delivered, vec!["srvB"]);
                assert_eq!(failure.failed.len(), 1);
                assert_eq!(failure.failed[0].0, "srvA");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(bus.published().len(), 1);
        assert_eq!(bus.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_presence_failure_propagates() {
        let presence = StubPresence {
            fail: true,
            ..Default::default()
        };
        let bus = Arc::new(FakeBus::new());
        let dispatcher = dispatcher(Arc::new(presence), bus.clone()).await;

        let err = dispatcher
            .push_keys(5, &strings(&["k1"]), Bytes::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, HeraldError::Presence(_)));
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_no_live_targets_publishes_nothing() {
        let bus = Arc::new(FakeBus::new());
        let dispatcher = dispatcher(Arc::new(StubPresence::default()), bus.clone()).await;

        let report = dispatcher
            .push_keys(5, &strings(&["gone"]), Bytes::new(), None)
            .await
            .unwrap();
        assert!(report.servers.is_empty());
        assert_eq!(report.skipped, 1);
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn test_caller_deadline_bounds_every_server() {
        let presence = MemoryPresence::new(Duration::from_secs(60));
        presence.add_mapping(7, "a", "srvA").await.unwrap();
        presence.add_mapping(7, "b", "srvB").await.unwrap();
        let bus = Arc::new(FakeBus::new());
        bus.set_mode(AckMode::Drop);
        let dispatcher = dispatcher(Arc::new(presence), bus.clone()).await;

        let started = Instant::now();
        let deadline = started + Duration::from_millis(50);
        let err = tokio_test::assert_err!(
            dispatcher
                .push_mids(4, &[7], Bytes::from("hi"), Some(deadline))
                .await
        );

        assert!(started.elapsed() < PublisherConfig::default().ack_timeout);
        match err {
            HeraldError::PartialPush(failure) => {
                assert!(failure.delivered.is_empty());
                assert_eq!(failure.failed.len(), 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(bus.active_subscriptions(), 0);
    }
}

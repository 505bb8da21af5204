//! Durable publisher: publish to the push stream and wait for the broker ack
//!
//! Every call owns a fresh ack inbox (`<ack_prefix>.<uuid>`), so concurrent
//! publishes never consume each other's acknowledgments. The inbox is
//! subscribed before the message is sent, and the subscription lives in a
//! local that is dropped on every exit path, including when the caller
//! drops the future.

use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ack::{decode_ack, Ack, AckOutcome};
use super::bus::{BusMessage, MessageBus, StreamSpec};
use crate::types::{HeraldError, Result};

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Stream the publisher writes to
    pub stream: StreamSpec,
    /// Prefix for per-publish ack inboxes
    pub ack_prefix: String,
    /// Default bound on the ack wait
    pub ack_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            stream: StreamSpec {
                name: "HERALD_PUSH".to_string(),
                subjects: vec!["herald.push.>".to_string()],
                replicas: 1,
            },
            ack_prefix: "herald.ack".to_string(),
            ack_timeout: Duration::from_secs(5),
        }
    }
}

/// Publishes to the durable stream with synchronous acknowledgment
pub struct DurablePublisher {
    bus: Arc<dyn MessageBus>,
    config: PublisherConfig,
}

impl DurablePublisher {
    /// Create a publisher, provisioning its stream first.
    ///
    /// Fails if the stream cannot be provisioned for any reason other than
    /// already existing.
    pub async fn new(bus: Arc<dyn MessageBus>, config: PublisherConfig) -> Result<Self> {
        let publisher = Self { bus, config };
        publisher.provision().await?;
        Ok(publisher)
    }

    /// Idempotently create the stream
    pub async fn provision(&self) -> Result<()> {
        match self.bus.create_stream(&self.config.stream).await {
            Ok(()) => Ok(()),
            Err(HeraldError::StreamExists(name)) => {
                info!("Stream {} already exists", name);
                Ok(())
            }
            Err(HeraldError::Provisioning(reason)) => Err(HeraldError::Provisioning(reason)),
            Err(other) => Err(HeraldError::Provisioning(other.to_string())),
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Publish and wait up to the configured ack timeout
    pub async fn publish(&self, subject: &str, key: Bytes, payload: Bytes) -> Result<Ack> {
        let deadline = Instant::now() + self.config.ack_timeout;
        self.publish_until(subject, key, payload, deadline).await
    }

    /// Publish and wait for the ack until `deadline`
    pub async fn publish_until(
        &self,
        subject: &str,
        key: Bytes,
        payload: Bytes,
        deadline: Instant,
    ) -> Result<Ack> {
        let ack_inbox = format!("{}.{}", self.config.ack_prefix, uuid::Uuid::new_v4().simple());

        // Subscribe first so the ack cannot arrive before anyone listens.
        let mut acks = self.bus.subscribe(&ack_inbox).await?;

        self.bus
            .publish(BusMessage {
                subject: subject.to_string(),
                key,
                ack_inbox: ack_inbox.clone(),
                payload,
            })
            .await?;

        let stream_subject = self.config.stream.subjects.join(",");
        let wait = async {
            while let Some(raw) = acks.next().await {
                match decode_ack(&raw, &stream_subject, subject) {
                    Ok(AckOutcome::Acked(ack)) => {
                        debug!(
                            "ack: {} {} offset={} subject={}",
                            ack.stream_subject, ack.stream_name, ack.offset, ack.msg_subject
                        );
                        return Ok(ack);
                    }
                    Ok(AckOutcome::Rejected(reason)) => return Err(HeraldError::Publish(reason)),
                    Err(e) => {
                        warn!(inbox = %ack_inbox, "Ignoring malformed ack: {}", e);
                    }
                }
            }
            Err(HeraldError::Nats(format!(
                "Ack subscription {} closed before acknowledgment",
                ack_inbox
            )))
        };

        tokio::time::timeout_at(deadline, wait)
            .await
            .map_err(|_| {
                HeraldError::AckTimeout(format!("No acknowledgment for publish to {}", subject))
            })?
    }
}

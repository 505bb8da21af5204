//! Message bus abstraction and its JetStream implementation

use async_nats::jetstream::{self, context::CreateStreamErrorKind, ErrorCode};
use async_nats::HeaderMap;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::types::{HeraldError, Result};

/// Header carrying the partition key of a published message
pub const PARTITION_KEY_HEADER: &str = "Herald-Partition-Key";

/// Stream of raw messages on a subscribed subject.
///
/// Dropping the stream releases the subscription.
pub type AckStream = BoxStream<'static, Bytes>;

/// Stream provisioning parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub name: String,
    pub subjects: Vec<String>,
    pub replicas: usize,
}

/// A message headed for the durable stream
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub subject: String,
    pub key: Bytes,
    /// Where the broker sends its acknowledgment
    pub ack_inbox: String,
    pub payload: Bytes,
}

/// Operations the durable publisher needs from a broker
#[async_trait::async_trait]
pub trait MessageBus: Send + Sync {
    /// Create the stream; `HeraldError::StreamExists` if it is already there
    async fn create_stream(&self, spec: &StreamSpec) -> Result<()>;

    /// Subscribe to a subject
    async fn subscribe(&self, subject: &str) -> Result<AckStream>;

    /// Send a message with its ack destination attached
    async fn publish(&self, msg: BusMessage) -> Result<()>;
}

/// JetStream-backed bus
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsBus {
    pub fn new(client: async_nats::Client) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self { client, jetstream }
    }
}

#[async_trait::async_trait]
impl MessageBus for NatsBus {
    async fn create_stream(&self, spec: &StreamSpec) -> Result<()> {
        let config = jetstream::stream::Config {
            name: spec.name.clone(),
            subjects: spec.subjects.clone(),
            num_replicas: spec.replicas,
            ..Default::default()
        };

        match self.jetstream.create_stream(config).await {
            Ok(_) => {
                info!("Created stream {} for {:?}", spec.name, spec.subjects);
                Ok(())
            }
            Err(err) => match err.kind() {
                CreateStreamErrorKind::JetStream(api)
                    if api.error_code() == ErrorCode::STREAM_NAME_EXIST =>
                {
                    Err(HeraldError::StreamExists(spec.name.clone()))
                }
                _ => Err(HeraldError::Provisioning(format!(
                    "Failed to create stream {}: {}",
                    spec.name, err
                ))),
            },
        }
    }

    async fn subscribe(&self, subject: &str) -> Result<AckStream> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| HeraldError::Nats(format!("Subscribe to {} failed: {}", subject, e)))?;
        debug!("Subscribed to {}", subject);
        Ok(subscriber.map(|msg| msg.payload).boxed())
    }

    async fn publish(&self, msg: BusMessage) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(
            PARTITION_KEY_HEADER,
            String::from_utf8_lossy(&msg.key).as_ref(),
        );

        self.client
            .publish_with_reply_and_headers(
                msg.subject.clone(),
                msg.ack_inbox,
                headers,
                msg.payload,
            )
            .await
            .map_err(|e| HeraldError::Publish(format!("Publish to {} failed: {}", msg.subject, e)))
    }
}

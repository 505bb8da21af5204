//! NATS client wrapper
//!
//! Provides connection management with reconnection and request/response
//! patterns with timeouts.

use async_nats::{Client, ConnectOptions, HeaderMap};
use bytes::Bytes;
use std::time::Duration;
use tracing::info;

use crate::config::NatsArgs;
use crate::types::HeraldError;

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// NATS client wrapper
#[derive(Clone)]
pub struct NatsClient {
    /// Underlying NATS client
    client: Client,
    /// Request timeout for RPC calls
    request_timeout: Duration,
}

impl NatsClient {
    /// Create a new NATS client
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self, HeraldError> {
        info!("Connecting to NATS at {}", args.nats_url);

        // No retry_on_initial_connect(): startup should fail fast if NATS is down.
        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&args.nats_url)
            .await
            .map_err(|e| HeraldError::Nats(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", args.nats_url);

        Ok(Self {
            client,
            request_timeout: Duration::from_millis(args.request_timeout_ms),
        })
    }

    /// Get the underlying NATS client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Publish a message to a subject
    pub async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), HeraldError> {
        self.client
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| HeraldError::Nats(format!("Publish failed: {}", e)))
    }

    /// Request with headers, bounded by the request timeout
    pub async fn request_with_headers(
        &self,
        subject: &str,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<async_nats::Message, HeraldError> {
        tokio::time::timeout(
            self.request_timeout,
            self.client
                .request_with_headers(subject.to_string(), headers, payload),
        )
        .await
        .map_err(|_| HeraldError::Nats(format!("Request to {} timed out", subject)))?
        .map_err(|e| HeraldError::Nats(format!("Request failed: {}", e)))
    }

    /// Subscribe to a subject
    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, HeraldError> {
        self.client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| HeraldError::Nats(format!("Subscribe failed: {}", e)))
    }

    /// Flush pending messages
    pub async fn flush(&self) -> Result<(), HeraldError> {
        self.client
            .flush()
            .await
            .map_err(|e| HeraldError::Nats(format!("Flush failed: {}", e)))
    }
}

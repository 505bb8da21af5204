//! NATS messaging layer
//!
//! Connection wrapper, the message bus seam used by the durable publisher,
//! and broker acknowledgment decoding.

pub mod ack;
pub mod bus;
pub mod client;
pub mod publisher;

pub use ack::{Ack, AckOutcome};
pub use bus::{AckStream, BusMessage, MessageBus, NatsBus, StreamSpec};
pub use client::NatsClient;
pub use publisher::{DurablePublisher, PublisherConfig};

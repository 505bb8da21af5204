//! Herald - presence-routed push pipeline
//!
//! The logic tier of a real-time push platform. Gateway ("comet") nodes
//! hold client connections and report them here; pushes addressed to
//! users, connection keys, rooms or everyone are resolved against
//! presence and published to the owning gateways over NATS JetStream,
//! each publish waiting for its broker acknowledgment.
//!
//! ## Components
//!
//! - **nats**: connection, message bus seam, durable publisher
//! - **presence**: key to server and user to keys mappings
//! - **logic**: session business rules and push dispatch
//! - **rpc**: session RPC between gateways and the logic tier
//! - **comet**: gateway-side session calls and frame dispatch
//! - **discovery**: self-registration and instance resolution
//! - **server**: HTTP control endpoint and process lifecycle

pub mod comet;
pub mod config;
pub mod discovery;
pub mod logic;
pub mod model;
pub mod nats;
pub mod presence;
pub mod rpc;
pub mod server;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::Args;
pub use types::{HeraldError, Result};

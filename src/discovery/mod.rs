//! Service discovery over NATS
//!
//! Instances announce themselves on `herald.discovery.<app_id>` and renew
//! periodically; a [`Resolver`] keeps the live set. The process owns its
//! discovery handle and passes it to whoever needs it.

pub mod instance;
pub mod registry;
pub mod resolver;

pub use instance::{discovery_subject, AnnounceAction, Announcement, ServiceInstance, META_WEIGHT};
pub use registry::{Discovery, NatsDiscovery, Registration};
pub use resolver::Resolver;

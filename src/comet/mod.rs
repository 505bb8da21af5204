//! Gateway node side of the session protocol
//!
//! A gateway holds client connections and talks to the logic tier through
//! [`SessionHandler`]; [`Operator`] interprets each inbound frame against
//! local [`Membership`].

pub mod bucket;
pub mod channel;
pub mod online;
pub mod operation;
pub mod session;

pub use bucket::{LocalBucket, Membership};
pub use channel::Channel;
pub use online::spawn_renew_online;
pub use operation::Operator;
pub use session::{Session, SessionHandler};

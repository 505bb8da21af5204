//! Data model shared by the logic tier and gateway nodes

pub mod envelope;
pub mod ops;
pub mod proto;
pub mod room;

pub use envelope::{PushEnvelope, PUSH_SUBJECT_PREFIX};
pub use proto::Proto;
pub use room::encode_room_key;

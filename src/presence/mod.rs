//! Presence: which server owns which connection key, and which keys a user has

pub mod memory;
pub mod store;

pub use memory::MemoryPresence;
pub use store::{MidKeys, PresenceStore};

//! Presence store contract

use std::collections::HashMap;

use crate::types::Result;

/// Keys owned by a batch of users, with their owning servers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MidKeys {
    /// Connection key -> owning server; either side may be empty when
    /// the store is inconsistent
    pub key_servers: HashMap<String, String>,
    /// The same keys in lookup order
    pub keys: Vec<String>,
}

/// Maps connection keys to servers and users to connection keys
#[async_trait::async_trait]
pub trait PresenceStore: Send + Sync {
    /// Owning server per key, index-aligned; empty string when unknown
    async fn servers_by_keys(&self, keys: &[String]) -> Result<Vec<String>>;

    /// All live keys of the given users
    async fn keys_by_mids(&self, mids: &[i64]) -> Result<MidKeys>;

    /// Record that `key` (owned by `mid`, possibly 0) lives on `server`
    async fn add_mapping(&self, mid: i64, key: &str, server: &str) -> Result<()>;

    /// Renew the TTL of a mapping; false if it no longer exists
    async fn expire_mapping(&self, mid: i64, key: &str) -> Result<bool>;

    /// Remove a mapping; false if it was already gone
    async fn del_mapping(&self, mid: i64, key: &str, server: &str) -> Result<bool>;
}

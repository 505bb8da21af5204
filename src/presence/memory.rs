//! In-process presence store
//!
//! Concurrent maps with per-mapping expiry. Expired entries are invisible
//! to reads and removed lazily or by [`MemoryPresence::purge_expired`].

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::store::{MidKeys, PresenceStore};
use crate::types::Result;

#[derive(Debug, Clone)]
struct KeyEntry {
    server: String,
    mid: i64,
    expires_at: Instant,
}

/// DashMap-backed presence store
pub struct MemoryPresence {
    keys: DashMap<String, KeyEntry>,
    mids: DashMap<i64, HashSet<String>>,
    ttl: Duration,
}

impl MemoryPresence {
    pub fn new(ttl: Duration) -> Self {
        Self {
            keys: DashMap::new(),
            mids: DashMap::new(),
            ttl,
        }
    }

    fn live_server(&self, key: &str, now: Instant) -> Option<String> {
        self.keys
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.server.clone())
    }

    /// Number of live connection keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.keys.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired mappings; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(String, i64)> = self
            .keys
            .iter()
            .filter(|e| e.expires_at <= now)
            .map(|e| (e.key().clone(), e.mid))
            .collect();

        for (key, mid) in &expired {
            self.keys.remove_if(key, |_, entry| entry.expires_at <= now);
            if *mid != 0 {
                if let Some(mut owned) = self.mids.get_mut(mid) {
                    owned.remove(key);
                }
                self.mids.remove_if(mid, |_, owned| owned.is_empty());
            }
        }
        if !expired.is_empty() {
            debug!("Purged {} expired presence mapping(s)", expired.len());
        }
        expired.len()
    }

    /// Periodically purge expired mappings
    pub fn start_purge_task(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                self.purge_expired();
            }
        })
    }
}

#[async_trait::async_trait]
impl PresenceStore for MemoryPresence {
    async fn servers_by_keys(&self, keys: &[String]) -> Result<Vec<String>> {
        let now = Instant::now();
        Ok(keys
            .iter()
            .map(|key| self.live_server(key, now).unwrap_or_default())
            .collect())
    }

    async fn keys_by_mids(&self, mids: &[i64]) -> Result<MidKeys> {
        let now = Instant::now();
        let mut result = MidKeys::default();
        for mid in mids {
            let Some(owned) = self.mids.get(mid) else {
                continue;
            };
            let mut keys: Vec<&String> = owned.iter().collect();
            keys.sort();
            for key in keys {
                if let Some(server) = self.live_server(key, now) {
                    if result.key_servers.insert(key.clone(), server).is_none() {
                        result.keys.push(key.clone());
                    }
                }
            }
        }
        Ok(result)
    }

    async fn add_mapping(&self, mid: i64, key: &str, server: &str) -> Result<()> {
        let previous = self.keys.insert(
            key.to_string(),
            KeyEntry {
                server: server.to_string(),
                mid,
                expires_at: Instant::now() + self.ttl,
            },
        );
        if let Some(previous) = previous {
            if previous.mid != mid && previous.mid != 0 {
                if let Some(mut owned) = self.mids.get_mut(&previous.mid) {
                    owned.remove(key);
                }
            }
        }
        if mid != 0 {
            self.mids.entry(mid).or_default().insert(key.to_string());
        }
        Ok(())
    }

    async fn expire_mapping(&self, _mid: i64, key: &str) -> Result<bool> {
        let now = Instant::now();
        match self.keys.get_mut(key) {
            Some(mut entry) if entry.expires_at > now => {
                entry.expires_at = now + self.ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn del_mapping(&self, mid: i64, key: &str, server: &str) -> Result<bool> {
        let now = Instant::now();
        let removed = self
            .keys
            .remove_if(key, |_, entry| entry.server == server || server.is_empty());
        let Some((_, entry)) = removed else {
            return Ok(false);
        };
        // The stored mid owns the key, whatever the caller passed
        let owner = if entry.mid != 0 { entry.mid } else { mid };
        if owner != 0 {
            if let Some(mut owned) = self.mids.get_mut(&owner) {
                owned.remove(key);
            }
            self.mids.remove_if(&owner, |_, owned| owned.is_empty());
        }
        Ok(entry.expires_at > now)
    }
}

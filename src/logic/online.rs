//! Cluster-wide room occupancy from per-server reports

use dashmap::DashMap;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::info;

struct ServerRooms {
    counts: HashMap<String, i32>,
    updated: Instant,
}

/// Aggregates the room counts each gateway reports
pub struct RoomOnline {
    servers: DashMap<String, ServerRooms>,
    ttl: Duration,
}

impl RoomOnline {
    pub fn new(ttl: Duration) -> Self {
        Self {
            servers: DashMap::new(),
            ttl,
        }
    }

    /// Replace `server`'s report and return the cluster-wide totals
    pub fn update(&self, server: &str, counts: HashMap<String, i32>) -> HashMap<String, i32> {
        self.servers.insert(
            server.to_string(),
            ServerRooms {
                counts,
                updated: Instant::now(),
            },
        );
        self.totals()
    }

    /// Sum of all fresh reports
    pub fn totals(&self) -> HashMap<String, i32> {
        let now = Instant::now();
        let mut totals: HashMap<String, i32> = HashMap::new();
        for entry in self.servers.iter() {
            if now.duration_since(entry.updated) > self.ttl {
                continue;
            }
            for (room, count) in &entry.counts {
                *totals.entry(room.clone()).or_default() += *count;
            }
        }
        totals
    }

    /// Cluster-wide count for one room
    pub fn room_count(&self, room: &str) -> i32 {
        let now = Instant::now();
        self.servers
            .iter()
            .filter(|e| now.duration_since(e.updated) <= self.ttl)
            .filter_map(|e| e.counts.get(room).copied())
            .sum()
    }

    /// Forget servers that stopped reporting
    pub fn remove_stale(&self) -> usize {
        let now = Instant::now();
        let before = self.servers.len();
        self.servers
            .retain(|server, rooms| {
                let fresh = now.duration_since(rooms.updated) <= self.ttl;
                if !fresh {
                    info!("Dropping stale online report from {}", server);
                }
                fresh
            });
        before - self.servers.len()
    }
}

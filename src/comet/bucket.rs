//! Local room and watched-operation membership on a gateway node

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::channel::Channel;
use crate::types::{HeraldError, Result};

/// Membership mutations the operation dispatcher needs
pub trait Membership: Send + Sync {
    /// Join `room`; a connection is in at most one room
    fn add_to_room(&self, ch: &Channel, room: &str) -> Result<()>;

    /// Leave the current room, if any
    fn remove_from_room(&self, ch: &Channel) -> Result<()>;

    /// Add operation codes to the connection's accepted set
    fn add_watched_ops(&self, ch: &Channel, ops: &[i32]) -> Result<()>;

    /// Remove operation codes from the connection's accepted set
    fn remove_watched_ops(&self, ch: &Channel, ops: &[i32]) -> Result<()>;
}

#[derive(Debug, Default)]
struct Member {
    mid: i64,
    room: Option<String>,
    accepts: HashSet<i32>,
}

/// In-memory membership for the connections held by this node
#[derive(Default)]
pub struct LocalBucket {
    members: DashMap<String, Member>,
    rooms: DashMap<String, HashSet<String>>,
    /// Cluster-wide counts learned from the logic tier
    all_rooms: DashMap<String, i32>,
}

impl LocalBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly authenticated connection
    pub fn register(&self, ch: &Channel, room: Option<&str>, accepts: &[i32]) {
        self.unregister(ch);
        self.members.insert(
            ch.key.clone(),
            Member {
                mid: ch.mid,
                room: None,
                accepts: accepts.iter().copied().collect(),
            },
        );
        if let Some(room) = room.filter(|r| !r.is_empty()) {
            self.join(&ch.key, room);
        }
    }

    /// Forget a connection; false if it was unknown
    pub fn unregister(&self, ch: &Channel) -> bool {
        match self.members.remove(&ch.key) {
            Some((key, member)) => {
                if let Some(room) = member.room {
                    self.leave(&key, &room);
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Room the connection is in
    pub fn room_of(&self, key: &str) -> Option<String> {
        self.members.get(key).and_then(|m| m.room.clone())
    }

    /// Accepted operation codes, sorted
    pub fn accepts(&self, key: &str) -> Option<Vec<i32>> {
        self.members.get(key).map(|m| {
            let mut ops: Vec<i32> = m.accepts.iter().copied().collect();
            ops.sort_unstable();
            ops
        })
    }

    /// Keys of the connections in `room`
    pub fn room_members(&self, room: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .rooms
            .get(room)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Local connection count per non-empty room
    pub fn room_counts(&self) -> HashMap<String, i32> {
        self.rooms
            .iter()
            .filter(|r| !r.is_empty())
            .map(|r| (r.key().clone(), r.len() as i32))
            .collect()
    }

    /// Users with at least one connection here
    pub fn mids(&self) -> Vec<i64> {
        let mut mids: Vec<i64> = self
            .members
            .iter()
            .map(|m| m.mid)
            .filter(|mid| *mid != 0)
            .collect();
        mids.sort_unstable();
        mids.dedup();
        mids
    }

    /// Replace the cluster-wide counts
    pub fn set_all_room_counts(&self, counts: HashMap<String, i32>) {
        self.all_rooms.retain(|room, _| counts.contains_key(room));
        for (room, count) in counts {
            self.all_rooms.insert(room, count);
        }
    }

    /// Cluster-wide count for `room`, 0 when unknown
    pub fn all_room_count(&self, room: &str) -> i32 {
        self.all_rooms.get(room).map(|c| *c).unwrap_or(0)
    }

    fn join(&self, key: &str, room: &str) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(key.to_string());
        if let Some(mut member) = self.members.get_mut(key) {
            member.room = Some(room.to_string());
        }
    }

    fn leave(&self, key: &str, room: &str) {
        let empty = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(key);
                members.is_empty()
            }
            None => false,
        };
        if empty {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }

    fn not_found(ch: &Channel) -> HeraldError {
        HeraldError::NotFound(format!("connection {} is not on this node", ch.key))
    }
}

impl Membership for LocalBucket {
    fn add_to_room(&self, ch: &Channel, room: &str) -> Result<()> {
        if room.is_empty() {
            return Err(HeraldError::BadRequest("empty room id".into()));
        }
        let previous = match self.members.get(&ch.key) {
            Some(member) => member.room.clone(),
            None => return Err(Self::not_found(ch)),
        };
        if let Some(previous) = previous {
            if previous == room {
                return Ok(());
            }
            self.leave(&ch.key, &previous);
        }
        self.join(&ch.key, room);
        debug!(key = %ch.key, room = %room, "joined room");
        Ok(())
    }

    fn remove_from_room(&self, ch: &Channel) -> Result<()> {
        let room = match self.members.get_mut(&ch.key) {
            Some(mut member) => member.room.take(),
            None => return Err(Self::not_found(ch)),
        };
        if let Some(room) = room {
            self.leave(&ch.key, &room);
            debug!(key = %ch.key, room = %room, "left room");
        }
        Ok(())
    }

    fn add_watched_ops(&self, ch: &Channel, ops: &[i32]) -> Result<()> {
        let mut member = self
            .members
            .get_mut(&ch.key)
            .ok_or_else(|| Self::not_found(ch))?;
        member.accepts.extend(ops.iter().copied());
        Ok(())
    }

    fn remove_watched_ops(&self, ch: &Channel, ops: &[i32]) -> Result<()> {
        let mut member = self
            .members
            .get_mut(&ch.key)
            .ok_or_else(|| Self::not_found(ch))?;
        for op in ops {
            member.accepts.remove(op);
        }
        Ok(())
    }
}

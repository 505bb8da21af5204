//! Interprets inbound client frames on a gateway node
//!
//! Control frames (room change, subscribe, unsubscribe) only touch local
//! membership and are answered in place. Everything else is relayed to the
//! logic tier.

use bytes::Bytes;
use tracing::{error, warn};

use super::bucket::Membership;
use super::channel::Channel;
use super::session::SessionHandler;
use crate::model::ops::{
    parse_ops, OP_CHANGE_ROOM, OP_CHANGE_ROOM_REPLY, OP_SUB, OP_SUB_REPLY, OP_UNSUB,
    OP_UNSUB_REPLY,
};
use crate::model::Proto;

/// Per-frame operation dispatcher
pub struct Operator {
    session: SessionHandler,
}

impl Operator {
    pub fn new(session: SessionHandler) -> Self {
        Self { session }
    }

    /// Apply `proto` for connection `ch`, rewriting it into the reply frame.
    ///
    /// Never fails: control-frame errors are logged and the reply is sent
    /// anyway; relay errors are logged and the body is cleared.
    pub async fn operate(&self, proto: &mut Proto, ch: &Channel, membership: &dyn Membership) {
        match proto.op {
            OP_CHANGE_ROOM => {
                let room = proto.body_str().into_owned();
                if let Err(e) = change_room(membership, ch, &room) {
                    error!(key = %ch.key, room = %room, "change room failed: {}", e);
                }
                proto.op = OP_CHANGE_ROOM_REPLY;
            }
            OP_SUB => {
                if let Ok(ops) = parse_ops(&proto.body_str()) {
                    if let Err(e) = membership.add_watched_ops(ch, &ops) {
                        warn!(key = %ch.key, "watch failed: {}", e);
                    }
                }
                proto.op = OP_SUB_REPLY;
            }
            OP_UNSUB => {
                if let Ok(ops) = parse_ops(&proto.body_str()) {
                    if let Err(e) = membership.remove_watched_ops(ch, &ops) {
                        warn!(key = %ch.key, "unwatch failed: {}", e);
                    }
                }
                proto.op = OP_UNSUB_REPLY;
            }
            _ => {
                if let Err(e) = self.session.receive(ch.mid, proto.clone()).await {
                    error!(mid = ch.mid, op = proto.op, "receive failed: {}", e);
                }
                proto.body = Bytes::new();
            }
        }
    }
}

fn change_room(membership: &dyn Membership, ch: &Channel, room: &str) -> crate::types::Result<()> {
    membership.remove_from_room(ch)?;
    if room.is_empty() {
        return Ok(());
    }
    membership.add_to_room(ch, room)
}

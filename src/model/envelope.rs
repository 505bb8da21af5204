//! Push envelopes published to the message bus
//!
//! Gateway nodes consume these from the push stream. Targeted envelopes
//! land on a per-server subject so a gateway can filter for its own keys.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{HeraldError, Result};

/// Default subject prefix for push envelopes
pub const PUSH_SUBJECT_PREFIX: &str = "herald.push";

/// One push, addressed to keys on a server, a room, or everyone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushEnvelope {
    Targeted {
        operation: i32,
        server: String,
        keys: Vec<String>,
        msg: Bytes,
    },
    Room {
        operation: i32,
        room: String,
        msg: Bytes,
    },
    Broadcast {
        operation: i32,
        speed: i32,
        msg: Bytes,
    },
}

impl PushEnvelope {
    /// Targeted envelope; `keys` must not be empty
    pub fn targeted(
        operation: i32,
        server: impl Into<String>,
        keys: Vec<String>,
        msg: Bytes,
    ) -> Result<Self> {
        let server = server.into();
        if keys.is_empty() {
            return Err(HeraldError::BadRequest(format!(
                "targeted push to {server} has no keys"
            )));
        }
        if server.is_empty() {
            return Err(HeraldError::BadRequest(
                "targeted push has no server".to_string(),
            ));
        }
        Ok(Self::Targeted {
            operation,
            server,
            keys,
            msg,
        })
    }

    pub fn room(operation: i32, room: impl Into<String>, msg: Bytes) -> Self {
        Self::Room {
            operation,
            room: room.into(),
            msg,
        }
    }

    pub fn broadcast(operation: i32, speed: i32, msg: Bytes) -> Self {
        Self::Broadcast {
            operation,
            speed,
            msg,
        }
    }

    pub fn operation(&self) -> i32 {
        match self {
            Self::Targeted { operation, .. }
            | Self::Room { operation, .. }
            | Self::Broadcast { operation, .. } => *operation,
        }
    }

    /// Bus subject under `prefix` for this envelope
    pub fn subject(&self, prefix: &str) -> String {
        match self {
            Self::Targeted { server, .. } => format!("{prefix}.server.{server}"),
            Self::Room { .. } => format!("{prefix}.room"),
            Self::Broadcast { .. } => format!("{prefix}.all"),
        }
    }

    /// Partition key: first key, room key, or the operation code
    pub fn partition_key(&self) -> Bytes {
        match self {
            Self::Targeted { keys, .. } => Bytes::from(keys[0].clone()),
            Self::Room { room, .. } => Bytes::from(room.clone()),
            Self::Broadcast { operation, .. } => Bytes::from(operation.to_string()),
        }
    }

    /// Serialize to MessagePack
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(rmp_serde::to_vec_named(self)?.into())
    }

    /// Deserialize from MessagePack
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let envelope: Self = rmp_serde::from_slice(data)?;
        if let Self::Targeted { keys, .. } = &envelope {
            if keys.is_empty() {
                return Err(HeraldError::Codec("targeted envelope without keys".into()));
            }
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targeted_requires_keys() {
        let err = PushEnvelope::targeted(5, "srvA", vec![], Bytes::new()).unwrap_err();
        assert!(matches!(err, HeraldError::BadRequest(_)));
    }

    #[test]
    fn test_subjects() {
        let targeted =
            PushEnvelope::targeted(5, "srvA", vec!["k1".into()], Bytes::new()).unwrap();
        assert_eq!(targeted.subject("herald.push"), "herald.push.server.srvA");
        assert_eq!(
            PushEnvelope::room(7, "live://42", Bytes::new()).subject("herald.push"),
            "herald.push.room"
        );
        assert_eq!(
            PushEnvelope::broadcast(9, 10, Bytes::new()).subject("herald.push"),
            "herald.push.all"
        );
    }

    #[test]
    fn test_partition_keys() {
        let targeted = PushEnvelope::targeted(
            5,
            "srvA",
            vec!["k1".into(), "k2".into()],
            Bytes::new(),
        )
        .unwrap();
        assert_eq!(targeted.partition_key(), Bytes::from("k1"));
        assert_eq!(
            PushEnvelope::room(7, "live://42", Bytes::new()).partition_key(),
            Bytes::from("live://42")
        );
        assert_eq!(
            PushEnvelope::broadcast(9, 10, Bytes::new()).partition_key(),
            Bytes::from("9")
        );
    }

    #[test]
    fn test_wire_roundtrip_keeps_variant() {
        let original = PushEnvelope::room(7, "live://42", Bytes::from_static(b"hello"));
        let decoded = PushEnvelope::from_bytes(&original.to_bytes().unwrap()).unwrap();
        assert_eq!(original, decoded);
        assert_eq!(decoded.operation(), 7);
    }
}

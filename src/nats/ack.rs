//! Broker acknowledgments
//!
//! JetStream answers a publish that carries a reply subject with a JSON
//! pub-ack on that subject: `{"stream":"HERALD_PUSH","seq":12}` on success,
//! `{"error":{"code":503,"description":"..."}}` when it refuses the message.

use serde::{Deserialize, Serialize};

/// A broker acknowledgment for one published message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Subject filter of the stream that stored the message
    pub stream_subject: String,
    /// Name of the stream that stored the message
    pub stream_name: String,
    /// Position of the message in the stream
    pub offset: u64,
    /// Subject the message was published on
    pub msg_subject: String,
}

/// Decoded content of an ack inbox message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    Acked(Ack),
    /// The broker refused the message
    Rejected(String),
}

#[derive(Deserialize)]
struct PubAckWire {
    stream: Option<String>,
    seq: Option<u64>,
    error: Option<ApiErrorWire>,
}

#[derive(Deserialize)]
struct ApiErrorWire {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    description: String,
}

/// Why an ack inbox message could not be understood
#[derive(Debug, thiserror::Error)]
pub enum AckDecodeError {
    #[error("invalid ack JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ack has neither stream/seq nor error")]
    Incomplete,
}

/// Decode an ack message received for a publish on `msg_subject`
pub fn decode_ack(
    data: &[u8],
    stream_subject: &str,
    msg_subject: &str,
) -> Result<AckOutcome, AckDecodeError> {
    let wire: PubAckWire = serde_json::from_slice(data)?;

    if let Some(err) = wire.error {
        return Ok(AckOutcome::Rejected(format!(
            "broker refused message ({}): {}",
            err.code, err.description
        )));
    }

    match (wire.stream, wire.seq) {
        (Some(stream_name), Some(offset)) => Ok(AckOutcome::Acked(Ack {
            stream_subject: stream_subject.to_string(),
            stream_name,
            offset,
            msg_subject: msg_subject.to_string(),
        })),
        _ => Err(AckDecodeError::Incomplete),
    }
}

/// Encode a success ack the way the broker does
pub fn encode_pub_ack(stream_name: &str, seq: u64) -> bytes::Bytes {
    serde_json::json!({ "stream": stream_name, "seq": seq })
        .to_string()
        .into()
}

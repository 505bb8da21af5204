//! Client protocol operation codes

pub const OP_HANDSHAKE: i32 = 0;
pub const OP_HANDSHAKE_REPLY: i32 = 1;

pub const OP_HEARTBEAT: i32 = 2;
pub const OP_HEARTBEAT_REPLY: i32 = 3;

pub const OP_SEND_MSG: i32 = 4;
pub const OP_SEND_MSG_REPLY: i32 = 5;

pub const OP_DISCONNECT_REPLY: i32 = 6;

pub const OP_AUTH: i32 = 7;
pub const OP_AUTH_REPLY: i32 = 8;

/// Raw payload, delivered to the socket without re-framing
pub const OP_RAW: i32 = 9;

pub const OP_PROTO_READY: i32 = 10;
pub const OP_PROTO_FINISH: i32 = 11;

pub const OP_CHANGE_ROOM: i32 = 12;
pub const OP_CHANGE_ROOM_REPLY: i32 = 13;

pub const OP_SUB: i32 = 14;
pub const OP_SUB_REPLY: i32 = 15;

pub const OP_UNSUB: i32 = 16;
pub const OP_UNSUB_REPLY: i32 = 17;

/// Parse a comma-separated list of operation codes.
///
/// An empty string is an empty list. Whitespace around items is ignored;
/// any item that is not an `i32` fails the whole list.
pub fn parse_ops(list: &str) -> Result<Vec<i32>, std::num::ParseIntError> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    list.split(',').map(|item| item.trim().parse::<i32>()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ops() {
        assert_eq!(parse_ops("1,2, 3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_ops("").unwrap(), Vec::<i32>::new());
        assert!(parse_ops("1,x").is_err());
        assert!(parse_ops("1,,2").is_err());
        assert!(parse_ops("99999999999").is_err());
    }
}

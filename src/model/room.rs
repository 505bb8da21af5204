//! Room key encoding
//!
//! A room key is `<type>://<room>`, e.g. `live://42`.

const ROOM_SEPARATOR: &str = "://";

/// Encode a room type and room id into a room key
pub fn encode_room_key(typ: &str, room: &str) -> String {
    format!("{typ}{ROOM_SEPARATOR}{room}")
}

//! Handle for one live client connection

/// Identity of a local connection, as issued by the logic tier at connect
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    pub key: String,
    pub mid: i64,
}

impl Channel {
    pub fn new(key: impl Into<String>, mid: i64) -> Self {
        Self {
            key: key.into(),
            mid,
        }
    }
}

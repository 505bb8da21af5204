//! Service registration record and its wire announcements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata key holding the instance's load weight
pub const META_WEIGHT: &str = "weight";

/// Subject root for discovery announcements
pub const DISCOVERY_SUBJECT_PREFIX: &str = "herald.discovery";

/// A discoverable process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub region: String,
    pub zone: String,
    pub env: String,
    pub hostname: String,
    pub app_id: String,
    /// Reachable addresses, e.g. `http://10.0.0.3:3111`
    pub addrs: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// Identity within an app: one instance per hostname
    pub fn instance_id(&self) -> String {
        format!("{}/{}", self.app_id, self.hostname)
    }

    /// Load weight from metadata; 0 when absent or unparseable
    pub fn weight(&self) -> i64 {
        self.metadata
            .get(META_WEIGHT)
            .and_then(|w| w.parse().ok())
            .unwrap_or(0)
    }

    /// Subject this instance announces itself on
    pub fn subject(&self) -> String {
        discovery_subject(&self.app_id)
    }
}

/// Announcement subject for `app_id`
pub fn discovery_subject(app_id: &str) -> String {
    format!("{DISCOVERY_SUBJECT_PREFIX}.{app_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnounceAction {
    Register,
    Renew,
    Cancel,
}

/// Message published on the discovery subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub action: AnnounceAction,
    pub instance: ServiceInstance,
    pub sent_at: DateTime<Utc>,
}

impl Announcement {
    pub fn new(action: AnnounceAction, instance: ServiceInstance) -> Self {
        Self {
            action,
            instance,
            sent_at: Utc::now(),
        }
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<bytes::Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Into::into)
    }
}

#[cfg(test)]
pub(crate) fn instance(hostname: &str, weight: i64) -> ServiceInstance {
    ServiceInstance {
        region: "local".into(),
        zone: "local".into(),
        env: "dev".into(),
        hostname: hostname.into(),
        app_id: "herald.logic".into(),
        addrs: vec![format!("http://{hostname}:3111")],
        metadata: HashMap::from([(META_WEIGHT.to_string(), weight.to_string())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_from_metadata() {
        assert_eq!(instance("a", 42).weight(), 42);

        let mut bad = instance("a", 1);
        bad.metadata.insert(META_WEIGHT.into(), "heavy".into());
        assert_eq!(bad.weight(), 0);
    }

    #[test]
    fn test_subject_and_id() {
        let inst = instance("logic-1", 1);
        assert_eq!(inst.subject(), "herald.discovery.herald.logic");
        assert_eq!(inst.instance_id(), "herald.logic/logic-1");
    }

    #[test]
    fn test_announcement_wire_action() {
        let bytes = Announcement::new(AnnounceAction::Cancel, instance("a", 1))
            .to_bytes()
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["action"], "cancel");
        assert_eq!(json["instance"]["hostname"], "a");
    }
}

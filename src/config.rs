//! Configuration for the Herald logic tier
//!
//! CLI arguments and environment variable handling using clap. Component
//! configs are derived from [`Args`] and handed to constructors.

use clap::Parser;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::discovery::{ServiceInstance, META_WEIGHT};
use crate::logic::LogicConfig;
use crate::model::PUSH_SUBJECT_PREFIX;
use crate::nats::{PublisherConfig, StreamSpec};

/// Application identifier announced to service discovery
pub const APP_ID: &str = "herald.logic";

/// Herald logic tier
#[derive(Parser, Debug, Clone)]
#[command(name = "herald-logic")]
#[command(about = "Presence-routed push dispatch for gateway fleets")]
#[command(version)]
pub struct Args {
    /// Address of the HTTP control endpoint
    #[arg(long, env = "HTTP_LISTEN", default_value = "0.0.0.0:3111")]
    pub http_listen: SocketAddr,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// JetStream stream holding push envelopes
    #[arg(long, env = "PUSH_STREAM", default_value = "HERALD_PUSH")]
    pub push_stream: String,

    /// Subject prefix for push envelopes (the stream covers `<prefix>.>`)
    #[arg(long, env = "PUSH_SUBJECT_PREFIX", default_value = PUSH_SUBJECT_PREFIX)]
    pub push_subject_prefix: String,

    /// Stream replication factor
    #[arg(long, env = "PUSH_REPLICAS", default_value = "1")]
    pub push_replicas: usize,

    /// Subject prefix for per-publish acknowledgment inboxes
    #[arg(long, env = "ACK_SUBJECT_PREFIX", default_value = "herald.ack")]
    pub ack_subject_prefix: String,

    /// How long a publish waits for its acknowledgment
    #[arg(long, env = "ACK_TIMEOUT_MS", default_value = "5000")]
    pub ack_timeout_ms: u64,

    /// Subject prefix for the session RPC surface
    #[arg(long, env = "RPC_SUBJECT_PREFIX", default_value = "herald.logic")]
    pub rpc_subject_prefix: String,

    /// Heartbeat interval handed to connections on connect
    #[arg(long, env = "HEARTBEAT_SECS", default_value = "240")]
    pub heartbeat_secs: u64,

    /// Presence TTL; a connection that misses heartbeats for this long is gone
    #[arg(long, env = "PRESENCE_TTL_SECS", default_value = "600")]
    pub presence_ttl_secs: u64,

    /// Room counts reported by a server older than this are ignored
    #[arg(long, env = "ONLINE_TTL_SECS", default_value = "60")]
    pub online_ttl_secs: u64,

    /// Service discovery environment
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Upper bound for each shutdown step
    #[arg(long, env = "DRAIN_TIMEOUT_MS", default_value = "10000")]
    pub drain_timeout_ms: u64,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,

    /// Timeout for request/reply calls
    #[arg(long, env = "NATS_REQUEST_TIMEOUT_MS", default_value = "5000")]
    pub request_timeout_ms: u64,
}

/// Deployment environment used for service registration
#[derive(Parser, Debug, Clone)]
pub struct DiscoveryArgs {
    #[arg(long, env = "REGION", default_value = "local")]
    pub region: String,

    #[arg(long, env = "ZONE", default_value = "local")]
    pub zone: String,

    #[arg(long, env = "DEPLOY_ENV", default_value = "dev")]
    pub deploy_env: String,

    /// Hostname announced to discovery
    #[arg(long, env = "HOSTNAME", default_value = "localhost")]
    pub hostname: String,

    /// Load weight announced in instance metadata
    #[arg(long, env = "WEIGHT", default_value = "10")]
    pub weight: i64,

    /// Address other services should use to reach this node's HTTP endpoint
    #[arg(long, env = "ADVERTISE_ADDR")]
    pub advertise_addr: Option<String>,

    /// How often the registration is renewed
    #[arg(long, env = "DISCOVERY_RENEW_SECS", default_value = "30")]
    pub renew_secs: u64,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.ack_timeout_ms == 0 {
            return Err("ACK_TIMEOUT_MS must be greater than zero".to_string());
        }
        if self.nats.request_timeout_ms == 0 {
            return Err("NATS_REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }
        if self.heartbeat_secs == 0 {
            return Err("HEARTBEAT_SECS must be greater than zero".to_string());
        }
        if self.presence_ttl_secs < self.heartbeat_secs {
            return Err("PRESENCE_TTL_SECS must not be shorter than HEARTBEAT_SECS".to_string());
        }
        for (name, value) in [
            ("PUSH_STREAM", &self.push_stream),
            ("PUSH_SUBJECT_PREFIX", &self.push_subject_prefix),
            ("ACK_SUBJECT_PREFIX", &self.ack_subject_prefix),
            ("RPC_SUBJECT_PREFIX", &self.rpc_subject_prefix),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{name} must not be empty"));
            }
        }
        if self.ack_subject_prefix.starts_with(&self.push_subject_prefix) {
            return Err("ACK_SUBJECT_PREFIX must not live under PUSH_SUBJECT_PREFIX".to_string());
        }
        if self.discovery.renew_secs == 0 {
            return Err("DISCOVERY_RENEW_SECS must be greater than zero".to_string());
        }
        if self.discovery.weight <= 0 {
            return Err("WEIGHT must be positive".to_string());
        }
        Ok(())
    }

    /// Renewal period for this process's registration
    pub fn renew_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.renew_secs)
    }

    /// Instances missing three renewals are considered gone
    pub fn discovery_stale_after(&self) -> Duration {
        self.renew_interval() * 3
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Publisher configuration for the push stream
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            stream: StreamSpec {
                name: self.push_stream.clone(),
                subjects: vec![format!("{}.>", self.push_subject_prefix)],
                replicas: self.push_replicas,
            },
            ack_prefix: self.ack_subject_prefix.clone(),
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
        }
    }

    /// Logic service configuration
    pub fn logic_config(&self) -> LogicConfig {
        LogicConfig {
            heartbeat: Duration::from_secs(self.heartbeat_secs),
            online_ttl: Duration::from_secs(self.online_ttl_secs),
        }
    }

    /// Registration record for this process
    pub fn service_instance(&self) -> ServiceInstance {
        let env = &self.discovery;
        let addr = env
            .advertise_addr
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.http_listen));
        let mut metadata = HashMap::new();
        metadata.insert(META_WEIGHT.to_string(), env.weight.to_string());
        metadata.insert("rpc_prefix".to_string(), self.rpc_subject_prefix.clone());

        ServiceInstance {
            region: env.region.clone(),
            zone: env.zone.clone(),
            env: env.deploy_env.clone(),
            hostname: env.hostname.clone(),
            app_id: APP_ID.to_string(),
            addrs: vec![addr],
            metadata,
        }
    }
}

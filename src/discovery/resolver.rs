//! Live view of announced instances
//!
//! Listens to discovery announcements and keeps every instance seen
//! within the staleness window.

use dashmap::DashMap;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::instance::{AnnounceAction, Announcement, ServiceInstance, DISCOVERY_SUBJECT_PREFIX};
use crate::nats::NatsClient;
use crate::types::Result;

#[derive(Debug, Clone)]
struct CachedInstance {
    instance: ServiceInstance,
    last_seen: Instant,
}

/// Instances per app id, pruned when they stop renewing
pub struct Resolver {
    instances: DashMap<String, CachedInstance>,
    stale_after: Duration,
    cancel: CancellationToken,
}

impl Resolver {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            instances: DashMap::new(),
            stale_after,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to all announcements and start the prune task
    pub async fn start(nats: &NatsClient, stale_after: Duration) -> Result<Arc<Self>> {
        let subject = format!("{DISCOVERY_SUBJECT_PREFIX}.>");
        let mut subscriber = nats.subscribe(&subject).await?;
        let resolver = Arc::new(Self::new(stale_after));
        info!("Resolving instances from {}", subject);

        {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move {
                let mut prune = tokio::time::interval(resolver.stale_after);
                loop {
                    tokio::select! {
                        _ = resolver.cancel.cancelled() => break,
                        _ = prune.tick() => {
                            resolver.cleanup_stale();
                        }
                        next = subscriber.next() => {
                            let Some(msg) = next else { break };
                            match serde_json::from_slice::<Announcement>(&msg.payload) {
                                Ok(announcement) => resolver.apply(announcement),
                                Err(e) => {
                                    warn!(subject = %msg.subject, "Bad announcement: {}", e)
                                }
                            }
                        }
                    }
                }
                if let Err(e) = subscriber.unsubscribe().await {
                    warn!("Failed to unsubscribe resolver: {}", e);
                }
                debug!("Resolver stopped");
            });
        }

        Ok(resolver)
    }

    /// Fold one announcement into the view
    pub fn apply(&self, announcement: Announcement) {
        let id = announcement.instance.instance_id();
        match announcement.action {
            AnnounceAction::Register | AnnounceAction::Renew => {
                let fresh = self
                    .instances
                    .insert(
                        id.clone(),
                        CachedInstance {
                            instance: announcement.instance,
                            last_seen: Instant::now(),
                        },
                    )
                    .is_none();
                if fresh {
                    info!("Discovered instance {}", id);
                }
            }
            AnnounceAction::Cancel => {
                if self.instances.remove(&id).is_some() {
                    info!("Instance {} deregistered", id);
                }
            }
        }
    }

    /// Live instances of `app_id`, heaviest first
    pub fn instances(&self, app_id: &str) -> Vec<ServiceInstance> {
        let mut found: Vec<ServiceInstance> = self
            .instances
            .iter()
            .filter(|c| c.instance.app_id == app_id && !self.is_stale(c.value()))
            .map(|c| c.instance.clone())
            .collect();
        found.sort_by(|a, b| b.weight().cmp(&a.weight()).then_with(|| a.hostname.cmp(&b.hostname)));
        found
    }

    /// Every live instance, ordered by app then hostname
    pub fn all(&self) -> Vec<ServiceInstance> {
        let mut found: Vec<ServiceInstance> = self
            .instances
            .iter()
            .filter(|c| !self.is_stale(c.value()))
            .map(|c| c.instance.clone())
            .collect();
        found.sort_by(|a, b| a.app_id.cmp(&b.app_id).then_with(|| a.hostname.cmp(&b.hostname)));
        found
    }

    /// Drop instances that missed their renewals
    pub fn cleanup_stale(&self) -> usize {
        let before = self.instances.len();
        self.instances.retain(|id, cached| {
            let keep = !self.is_stale(cached);
            if !keep {
                info!("Removing stale instance: {}", id);
            }
            keep
        });
        before - self.instances.len()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    fn is_stale(&self, cached: &CachedInstance) -> bool {
        cached.last_seen.elapsed() > self.stale_after
    }
}

//! Self-registration of this process

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::instance::{AnnounceAction, Announcement, ServiceInstance};
use crate::nats::NatsClient;
use crate::types::{HeraldError, Result};

/// Registers instances so other services can find them
#[async_trait::async_trait]
pub trait Discovery: Send + Sync {
    /// Announce `instance` until the returned registration is cancelled
    async fn register(&self, instance: ServiceInstance) -> Result<Registration>;
}

/// Live registration; [`Registration::cancel`] deregisters
pub struct Registration {
    instance: ServiceInstance,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Registration {
    pub fn new(instance: ServiceInstance, cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            instance,
            cancel,
            task,
        }
    }

    pub fn instance(&self) -> &ServiceInstance {
        &self.instance
    }

    /// Stop renewing and announce removal
    pub async fn cancel(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Discovery renew task failed: {}", e);
        }
    }
}

/// Discovery over NATS announcements on `herald.discovery.<app_id>`
pub struct NatsDiscovery {
    nats: NatsClient,
    renew_every: Duration,
}

impl NatsDiscovery {
    pub fn new(nats: NatsClient, renew_every: Duration) -> Self {
        Self { nats, renew_every }
    }
}

async fn announce(
    nats: &NatsClient,
    action: AnnounceAction,
    instance: &ServiceInstance,
) -> Result<()> {
    let payload = Announcement::new(action, instance.clone())
        .to_bytes()
        .map_err(|e| HeraldError::Codec(e.to_string()))?;
    nats.publish(&instance.subject(), payload).await
}

#[async_trait::async_trait]
impl Discovery for NatsDiscovery {
    async fn register(&self, instance: ServiceInstance) -> Result<Registration> {
        announce(&self.nats, AnnounceAction::Register, &instance).await?;
        info!(
            app_id = %instance.app_id,
            hostname = %instance.hostname,
            addrs = ?instance.addrs,
            "Registered with discovery"
        );

        let cancel = CancellationToken::new();
        let task = {
            let nats = self.nats.clone();
            let instance = instance.clone();
            let cancel = cancel.clone();
            let every = self.renew_every;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(every);
                // First tick completes immediately; registration was just sent.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            match announce(&nats, AnnounceAction::Renew, &instance).await {
                                Ok(()) => {
                                    debug!(hostname = %instance.hostname, "Discovery renewed")
                                }
                                Err(e) => warn!("Discovery renew failed: {}", e),
                            }
                        }
                    }
                }
                if let Err(e) = announce(&nats, AnnounceAction::Cancel, &instance).await {
                    warn!("Discovery cancel announcement failed: {}", e);
                }
                if let Err(e) = nats.flush().await {
                    warn!("Flush after deregistration failed: {}", e);
                }
                info!(hostname = %instance.hostname, "Deregistered from discovery");
            })
        };

        Ok(Registration::new(instance, cancel, task))
    }
}

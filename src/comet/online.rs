//! Periodic room-count renewal

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::bucket::LocalBucket;
use super::session::SessionHandler;

/// Report local room counts every `every` and keep the cluster-wide counts
/// the logic tier answers with. Stops when `cancel` fires.
pub fn spawn_renew_online(
    session: SessionHandler,
    bucket: Arc<LocalBucket>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let counts = bucket.room_counts();
                    match session.renew_online(counts).await {
                        Ok(all) => {
                            debug!(rooms = all.len(), "room counts renewed");
                            bucket.set_all_room_counts(all);
                        }
                        Err(e) => warn!("renew online failed: {}", e),
                    }
                }
            }
        }
        debug!("room count renewal stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comet::Channel;
    use crate::test_support::RecordingRpc;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_renewal_stores_cluster_counts() {
        let rpc = Arc::new(RecordingRpc {
            all_room_count: HashMap::from([("live://1".to_string(), 40)]),
            ..Default::default()
        });
        let bucket = Arc::new(LocalBucket::new());
        bucket.register(&Channel::new("k1", 7), Some("live://1"), &[]);
        let cancel = CancellationToken::new();

        let task = spawn_renew_online(
            SessionHandler::new("srvA", rpc.clone()),
            bucket.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_millis(35)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(bucket.all_room_count("live://1"), 40);
        assert!(rpc.calls().iter().all(|c| c == "renew_online:1"));
        assert!(!rpc.calls().is_empty());
    }
}

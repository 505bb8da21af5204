//! Process signals and ordered shutdown

use std::future::Future;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::types::Result;

/// Signal that ended the wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Terminate,
    Interrupt,
    Quit,
}

/// Wait for SIGTERM, SIGINT or SIGQUIT. SIGHUP is logged and ignored.
pub async fn wait_for_shutdown() -> Result<Shutdown> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                return Ok(Shutdown::Terminate);
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
                return Ok(Shutdown::Interrupt);
            }
            _ = sigquit.recv() => {
                info!("Received SIGQUIT");
                return Ok(Shutdown::Quit);
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, nothing to reload");
            }
        }
    }
}

/// Run one shutdown step, giving up after `limit`
pub async fn bounded_step<F>(name: &str, limit: Duration, step: F) -> bool
where
    F: Future<Output = ()>,
{
    match tokio::time::timeout(limit, step).await {
        Ok(()) => {
            info!("Shutdown step '{}' done", name);
            true
        }
        Err(_) => {
            warn!("Shutdown step '{}' exceeded {:?}", name, limit);
            false
        }
    }
}

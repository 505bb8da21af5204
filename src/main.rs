//! Herald logic tier

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herald::{
    config::{Args, APP_ID},
    discovery::{Discovery, NatsDiscovery, Resolver},
    logic::{Logic, PushDispatcher},
    nats::{DurablePublisher, NatsBus, NatsClient},
    presence::{MemoryPresence, PresenceStore},
    rpc::{LogicRpc, RpcServer},
    server::{bounded_step, wait_for_shutdown, AppState, HttpServer},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("herald={},info", args.log_level).into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Herald logic tier {}", env!("CARGO_PKG_VERSION"));
    info!("======================================");
    info!("HTTP: {}", args.http_listen);
    info!("NATS: {}", args.nats.nats_url);
    info!("Push stream: {} ({}.>)", args.push_stream, args.push_subject_prefix);
    info!("RPC prefix: {}", args.rpc_subject_prefix);
    info!("======================================");

    let nats = NatsClient::new(&args.nats, APP_ID).await?;

    // Provisioning failure is fatal.
    let bus = Arc::new(NatsBus::new(nats.inner().clone()));
    let publisher = Arc::new(DurablePublisher::new(bus, args.publisher_config()).await?);

    let presence = Arc::new(MemoryPresence::new(Duration::from_secs(args.presence_ttl_secs)));
    let purge = Arc::clone(&presence).start_purge_task(Duration::from_secs(args.heartbeat_secs));
    let presence: Arc<dyn PresenceStore> = presence;

    let logic = Arc::new(Logic::new(args.logic_config(), Arc::clone(&presence)));
    let dispatcher = Arc::new(PushDispatcher::new(
        Arc::clone(&presence),
        publisher,
        args.push_subject_prefix.clone(),
    ));

    let rpc = RpcServer::start(
        nats.inner().clone(),
        &args.rpc_subject_prefix,
        Arc::clone(&logic) as Arc<dyn LogicRpc>,
    )
    .await?;

    let resolver = Resolver::start(&nats, args.discovery_stale_after()).await?;
    let discovery = NatsDiscovery::new(nats.clone(), args.renew_interval());

    let state = Arc::new(AppState::new(
        Arc::clone(&logic),
        dispatcher,
        Arc::clone(&resolver),
    ));
    let http = HttpServer::start(args.http_listen, state).await?;

    let registration = discovery.register(args.service_instance()).await?;
    info!("Herald logic tier ready");

    let signal = wait_for_shutdown().await?;
    info!("Shutting down on {:?}", signal);

    let drain = args.drain_timeout();
    bounded_step("deregister", drain, registration.cancel()).await;
    logic.close();
    bounded_step("http", drain, http.graceful_stop(drain)).await;
    bounded_step("rpc", drain, rpc.graceful_stop(drain)).await;
    resolver.stop();
    purge.abort();
    if let Err(e) = nats.flush().await {
        error!("Final NATS flush failed: {}", e);
    }

    info!("Herald logic tier stopped");
    Ok(())
}

// src/main.rs

mod config;
mod feed;
use config::Config;
use dotenv::dotenv;
use std::error::Error;
use log::{info, warn, error};
use monitor_bridge_lib::{
    Context,          // publish sink (broadcast)
    DiscoveryConfig,
    MonitorAddress,
    Session,          // reconnecting monitor link
    SessionConfig,
    discover,
};
use tokio_util::sync::CancellationToken;

/* RUST_LOG=monitor_bridge_lib=debug,monitor_bridge_server=info \
cargo run -p monitor_bridge-server */

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // ──────── ① Load .env if present ────────
    let dotenv_loaded = dotenv().is_ok();

    // initialize logger and panic hook
    env_logger::init();
    std::panic::set_hook(Box::new(|info| {
        error!("Thread panic: {:?}", info);
    }));
    if !dotenv_loaded {
        info!("No .env file found, using process environment");
    }

    // ──────── ② Read configuration ────────
    let config = Config::from_env()?;
    info!("Configuration: {:?}", config);

    // build shared publish context (holds a broadcast::Sender<_>)
    let ctx = Context::new(config.publish_capacity);
    let shutdown = CancellationToken::new();

    // ──────── 1) Ctrl-C → cancel everything ────────
    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        ctrl_c_token.cancel();
    });

    // ──────── 2) Live feed (SSE) ────────
    let feed = tokio::spawn(feed::serve_feed(ctx.tx.clone(), config.feed_port, shutdown.clone()));

    // ──────── 3) Resolve the monitor: configured or discovered ────────
    let address = match config.monitor_ip.clone() {
        Some(ip) => {
            info!("Connecting {}:{}", ip, config.monitor_port);
            Some(MonitorAddress { ip, port: config.monitor_port })
        }
        None => {
            info!("Sniffing for monitor admission on udp/{}", config.discovery_port);
            let discovery = DiscoveryConfig { port: config.discovery_port, ..DiscoveryConfig::default() };
            discover(discovery, shutdown.clone()).await
        }
    };

    // ──────── 4) Monitor link → publish ────────
    match address {
        Some(MonitorAddress { ip, port }) => {
            Session::new(SessionConfig::new(ip, port), ctx, shutdown.clone()).run().await;
        }
        None => warn!("Shut down before a monitor was found"),
    }

    shutdown.cancel();
    if let Err(e) = feed.await {
        error!("Feed task failed: {}", e);
    }
    Ok(())
}

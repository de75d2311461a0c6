mod command;
mod config;
mod connection;
mod error;
mod runtime;
mod transport;

use anyhow::{bail, Context, Result};
use command::handlers::HandlerContext;
use command::CommandDispatcher;
use config::AgentConfig;
use connection::{ConnectionEvent, ConnectionManager};
use runtime::{ArtifactStore, ExecutionSupervisor, ResourceTracker};
use std::sync::Arc;
use tinykube_shared::topic;
use transport::ReplyPublisher;

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let endpoint = std::env::args().nth(1);
    let config = AgentConfig::load(endpoint.as_deref());

    info!("TinyKube agent starting: {}", config.device_id);
    info!("  Broker: {}", config.mqtt);
    info!("  Storage root: {}", config.storage_root.display());

    let tracker = Arc::new(ResourceTracker::new(
        ArtifactStore::new(&config.storage_root),
        config.limits,
    ));
    let supervisor = Arc::new(ExecutionSupervisor::new(tracker, config.stop_timeout));

    let mut conn = ConnectionManager::new(config.connection());
    wait_for_session(&mut conn).await?;
    info!("Listening on {}", topic::subscription_filter(&config.namespace));

    let dispatcher = CommandDispatcher::new(HandlerContext::new(supervisor.clone()), conn.publisher());

    // Main event loop
    loop {
        tokio::select! {
            event = conn.recv() => match event {
                Some(event) => handle_connection_event(event, &dispatcher).await,
                None => {
                    error!("Connection manager closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    supervisor.shutdown().await;
    if let Err(e) = conn.disconnect().await {
        warn!("Disconnect failed: {}", e);
    }
    Ok(())
}

/// Wait for the first session and its command subscription. Failing to
/// reach the broker or to subscribe at startup is fatal.
async fn wait_for_session(conn: &mut ConnectionManager) -> Result<()> {
    loop {
        match conn.recv().await.context("Connection manager closed")? {
            ConnectionEvent::Connected => {
                info!("Connected to broker, waiting for subscription");
            }
            ConnectionEvent::Subscribed => {
                info!("Command subscription granted");
                return Ok(());
            }
            ConnectionEvent::SubscribeFailed { reason } => {
                bail!("Cannot subscribe to commands: {}", reason)
            }
            ConnectionEvent::ConnectionFailed { reason } | ConnectionEvent::Disconnected { reason } => {
                bail!("Cannot connect to broker: {}", reason)
            }
            ConnectionEvent::Received(message) => {
                bail!("Unexpected message on {} before subscribing", message.topic)
            }
        }
    }
}

async fn handle_connection_event<P: ReplyPublisher>(event: ConnectionEvent, dispatcher: &CommandDispatcher<P>) {
    match event {
        ConnectionEvent::Connected => {
            info!("Reconnected to broker");
        }
        ConnectionEvent::Subscribed => {
            info!("Command subscription restored");
        }
        ConnectionEvent::SubscribeFailed { reason } => {
            error!("Command subscription lost: {}", reason);
        }
        ConnectionEvent::Disconnected { reason } => {
            warn!("Disconnected: {}", reason);
        }
        ConnectionEvent::ConnectionFailed { reason } => {
            error!("Connection failed: {}", reason);
        }
        ConnectionEvent::Received(message) => {
            if let Some(device) = topic::device_segment(&message.topic) {
                debug!("Command for device {}", device);
            }
            // Dropped commands are logged by the dispatcher
            let _ = dispatcher.handle_message(&message).await;
        }
    }
}

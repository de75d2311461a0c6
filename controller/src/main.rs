//! Operator-side command client
//!
//! ```text
//! tinykube-controller DEVICE_ID VERB [ARG]
//! ```
//!
//! The broker comes from `TINYKUBE_CONNECTION_STRING` (connection string or
//! `host[:port]`), the namespace from `TINYKUBE_NAMESPACE` and the reply
//! timeout in milliseconds from `TINYKUBE_REPLY_TIMEOUT_MS`.

mod command;

use anyhow::{bail, Context, Result};
use command::{build_request, describe_result, summarize_reply, CommandDispatcher, TimeoutTracker};
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, MqttOptions};
use std::sync::Arc;
use std::time::Duration;
use tinykube_shared::settings::MqttSettings;
use tinykube_shared::{now_ms, protocol, Verb};
use tokio::sync::mpsc;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (device_id, verb, arg) = match args.as_slice() {
        [device, verb] => (device.as_str(), verb, None),
        [device, verb, arg] => (device.as_str(), verb, Some(arg.as_str())),
        _ => bail!("usage: tinykube-controller DEVICE_ID VERB [ARG]"),
    };
    let verb: Verb = verb.parse()?;
    let payload = build_request(verb, arg)?;

    let mut settings = std::env::var("TINYKUBE_CONNECTION_STRING")
        .map(|endpoint| MqttSettings::from_endpoint(&endpoint))
        .unwrap_or_default();
    if settings.client_id.is_empty() {
        settings.client_id = format!("tinykube-ctl-{}", now_ms());
    }
    let namespace = std::env::var("TINYKUBE_NAMESPACE")
        .unwrap_or_else(|_| protocol::DEFAULT_NAMESPACE.to_string());
    let reply_timeout_ms = match std::env::var("TINYKUBE_REPLY_TIMEOUT_MS") {
        Ok(value) => value
            .parse()
            .with_context(|| format!("Invalid TINYKUBE_REPLY_TIMEOUT_MS: {}", value))?,
        Err(_) => protocol::COMMAND_REPLY_TIMEOUT_MS,
    };

    let mut options = MqttOptions::new(settings.client_id.clone(), settings.host.clone(), settings.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
    if let Some(username) = &settings.username {
        options.set_credentials(username.clone(), settings.password.clone().unwrap_or_default());
    }
    let (client, mut eventloop) = AsyncClient::new(options, 16);

    let dispatcher = Arc::new(
        CommandDispatcher::new(client.clone(), namespace, settings.client_id.clone())
            .with_timeout_ms(reply_timeout_ms),
    );
    let reply_filter = dispatcher.reply_filter(device_id);

    // Connect and subscribe before sending, so the reply cannot be missed
    let mut subscribed = false;
    while !subscribed {
        match eventloop.poll().await.context("Cannot connect to broker")? {
            Event::Incoming(Packet::ConnAck(_)) => {
                debug!("Connected to {}", settings);
                client.subscribe(reply_filter.clone(), QoS::AtLeastOnce).await?;
            }
            Event::Incoming(Packet::SubAck(_)) => subscribed = true,
            _ => {}
        }
    }

    let (expired_tx, mut expired_rx) = mpsc::channel(1);
    let tracker = TimeoutTracker::new(dispatcher.clone());
    tokio::spawn(async move { tracker.run(expired_tx).await });

    let token = dispatcher.send_command(device_id, verb, payload).await?;
    debug!("{} command(s) awaiting a reply", dispatcher.pending_count().await);

    loop {
        tokio::select! {
            event = eventloop.poll() => {
                let Event::Incoming(Packet::Publish(publish)) = event.context("Lost broker connection")? else {
                    continue;
                };
                let Some(completed) = dispatcher.handle_publish(&publish).await else {
                    continue;
                };
                let summary = summarize_reply(completed.command.verb, &completed.payload)?;
                println!(
                    "{} on {}: {} {} ({}ms)",
                    verb,
                    device_id,
                    describe_result(summary.result),
                    summary.detail,
                    completed.round_trip_ms
                );
                if !summary.is_ok() {
                    std::process::exit(1);
                }
                return Ok(());
            }
            Some(expired) = expired_rx.recv() => {
                if expired.token == token {
                    error!("No reply from {} within {}ms", device_id, expired.timeout_ms);
                    bail!("{} timed out", verb);
                }
            }
        }
    }
}

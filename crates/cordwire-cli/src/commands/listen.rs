//! `cordwire listen`: connect to the gateway and print every dispatched event
//! as one JSON line until interrupted.

use std::io::Write;

use anyhow::{Context, Result};
use cordwire_client::{ClientConfig, ConnectOptions, GatewayClient, RestClient};
use cordwire_core::{Event, ShardInfo};
use serde_json::{json, Value};
use tracing::{info, warn};

pub struct ListenArgs {
    /// Gateway URL; discovered over REST when absent.
    pub url: Option<String>,
    pub shard: Option<ShardInfo>,
    /// Only print these events. Unknown event names are always printed.
    pub events: Vec<Event>,
}

/// Parse `id/count`.
pub fn parse_shard(s: &str) -> Result<ShardInfo> {
    let (id, count) = s
        .split_once('/')
        .with_context(|| format!("invalid shard '{s}', expected id/count"))?;
    let id: u32 = id.trim().parse().with_context(|| format!("invalid shard id in '{s}'"))?;
    let count: u32 = count
        .trim()
        .parse()
        .with_context(|| format!("invalid shard count in '{s}'"))?;
    if count == 0 || id >= count {
        anyhow::bail!("shard id must be below shard count in '{s}'");
    }
    Ok(ShardInfo::new(id, count))
}

/// Parse a comma-separated list of event names.
pub fn parse_events(s: &str) -> Result<Vec<Event>> {
    s.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            Event::from_name(&name.to_uppercase())
                .with_context(|| format!("unknown event '{name}'"))
        })
        .collect()
}

fn print_event(name: &str, payload: &Value) {
    let line = json!({ "t": name, "d": payload });
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{line}") {
        warn!(error = %e, "failed to write event");
    }
}

pub async fn run(token: &str, config: ClientConfig, args: ListenArgs) -> Result<()> {
    let url = match args.url {
        Some(url) => url,
        None => RestClient::new(token, config.rest.clone())
            .context("invalid REST configuration")?
            .get_gateway_url()
            .await
            .context("failed to discover the gateway URL")?,
    };

    let gateway = GatewayClient::with_websocket(token, config.gateway);
    let events: &[Event] = if args.events.is_empty() {
        Event::ALL
    } else {
        &args.events
    };
    for &event in events {
        gateway
            .dispatcher()
            .add_handler(event, move |payload| print_event(event.as_str(), payload));
    }
    gateway
        .dispatcher()
        .add_unknown_event_handler(|name, payload| print_event(name, payload));

    let options = ConnectOptions {
        shard: args.shard,
        presence: None,
    };
    gateway
        .connect(&url, options)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    info!(%url, "listening for gateway events, press Ctrl-C to stop");

    let shutdown = gateway.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.trigger();
        }
    });

    gateway.wait().await.context("gateway connection failed")?;
    if let Some(session) = gateway.session() {
        info!(session_id = %session.session_id, seq = ?session.last_sequence, "session closed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_parsing() {
        assert_eq!(parse_shard("1/4").unwrap(), ShardInfo::new(1, 4));
        assert!(parse_shard("4/4").is_err());
        assert!(parse_shard("1").is_err());
        assert!(parse_shard("a/2").is_err());
    }

    #[test]
    fn event_list_parsing() {
        let events = parse_events("message_create, READY").unwrap();
        assert_eq!(events, vec![Event::MessageCreate, Event::Ready]);
        assert!(parse_events("NOT_AN_EVENT").is_err());
        assert!(parse_events("").unwrap().is_empty());
    }
}

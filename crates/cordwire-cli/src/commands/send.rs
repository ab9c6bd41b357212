//! `cordwire send <channel> <content>`: post a message over REST.

use anyhow::{Context, Result};
use cordwire_client::{RestClient, RestConfig};
use tracing::info;

pub async fn run(token: &str, config: RestConfig, channel_id: u64, content: &str) -> Result<()> {
    let rest = RestClient::new(token, config).context("invalid REST configuration")?;
    let message = rest
        .create_message(channel_id, content, false)
        .await
        .with_context(|| format!("failed to send message to channel {channel_id}"))?;

    let id = message["id"].as_str().unwrap_or("?");
    info!(channel_id, message_id = %id, "message sent");
    println!("{id}");
    Ok(())
}

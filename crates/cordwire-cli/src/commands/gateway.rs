//! `cordwire gateway`: print the gateway URL.

use anyhow::{Context, Result};
use cordwire_client::{RestClient, RestConfig};
use tracing::debug;

pub async fn run(token: &str, config: RestConfig, bot: bool) -> Result<()> {
    let rest = RestClient::new(token, config).context("invalid REST configuration")?;

    if bot {
        let info = rest
            .get_gateway_bot()
            .await
            .context("failed to query /gateway/bot")?;
        debug!(url = %info.url, shards = info.shards, "gateway info");
        println!("{} (recommended shards: {})", info.url, info.shards);
    } else {
        let url = rest
            .get_gateway_url()
            .await
            .context("failed to query /gateway")?;
        println!("{url}");
    }
    Ok(())
}

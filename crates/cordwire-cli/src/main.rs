//! cordwire: command-line client for the chat gateway and REST API.
//!
//! Prints gateway discovery info, streams gateway events as JSON lines,
//! posts messages, and shows the effective configuration.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use tracing::error;

use crate::commands::listen::{self, ListenArgs};

/// cordwire: chat gateway client
#[derive(Parser)]
#[command(name = "cordwire", version, about = "Chat gateway and REST client")]
struct Cli {
    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<String>,

    /// Bot or user token
    #[arg(long = "token", global = true, env = "CORDWIRE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the gateway URL
    Gateway {
        /// Also query the recommended shard count
        #[arg(long)]
        bot: bool,
    },

    /// Connect to the gateway and print events until Ctrl-C
    Listen {
        /// Gateway URL (discovered over REST when omitted)
        #[arg(long)]
        url: Option<String>,

        /// Shard as id/count, e.g. 0/2
        #[arg(long)]
        shard: Option<String>,

        /// Comma-separated event names to print, e.g. MESSAGE_CREATE,READY
        #[arg(long)]
        events: Option<String>,
    },

    /// Post a message to a channel
    Send {
        /// Channel ID
        channel_id: u64,
        /// Message text
        content: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("cordwire=debug,cordwire_cli=debug,cordwire_client=debug,cordwire_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("cordwire=warn,cordwire_cli=warn,cordwire_client=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("cordwire: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Config => {
            print!("{}", config::render(&cfg)?);
            Ok(())
        }
        Command::Gateway { bot } => {
            let token = config::require_token(cli.token.as_deref())?;
            commands::gateway::run(&token, cfg.rest, bot).await
        }
        Command::Send { channel_id, content } => {
            let token = config::require_token(cli.token.as_deref())?;
            commands::send::run(&token, cfg.rest, channel_id, &content).await
        }
        Command::Listen { url, shard, events } => {
            let token = config::require_token(cli.token.as_deref())?;
            let args = ListenArgs {
                url,
                shard: shard.as_deref().map(listen::parse_shard).transpose()?,
                events: match events.as_deref() {
                    Some(list) => listen::parse_events(list)?,
                    None => Vec::new(),
                },
            };
            listen::run(&token, cfg, args).await
        }
    }
}

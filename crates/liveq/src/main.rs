//! liveq - talk to Ableton Live over LiveOSC
//!
//! Subcommands:
//! - `liveq console` - type OSC messages, see everything Live sends back
//! - `liveq query <address> [args]` - send one request and print the reply
//! - `liveq send <address> [args]` - fire one message and exit
//! - `liveq dump` - scan the open set and print it as a tree

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use liveconf::LiveConfig;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "liveq")]
#[command(about = "Console and query tool for Ableton Live's LiveOSC")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Send /live/reload before anything else
    #[arg(long, global = true)]
    reload: bool,

    /// Host running Live
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port LiveOSC listens on
    #[arg(long, global = true)]
    send_port: Option<u16>,

    /// Port to receive LiveOSC replies on
    #[arg(long, global = true)]
    listen_port: Option<u16>,

    /// Config file, in place of ./livemirror.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read `address arg...` lines from stdin and print every inbound message
    Console,

    /// Send a request and print the reply
    Query {
        /// OSC address, e.g. /live/tempo
        address: String,

        /// Arguments: ints, floats, true/false, nil, or strings
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,

        /// Address the reply arrives on, when it differs
        #[arg(short, long)]
        response: Option<String>,

        /// Timeout in milliseconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Send a message without waiting for anything
    Send {
        /// OSC address
        address: String,

        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Scan the open set and print it
    Dump {
        /// Include devices and parameters
        #[arg(long)]
        devices: bool,

        /// Fetch clip names (one request per clip)
        #[arg(long)]
        clip_names: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = LiveConfig::load_from(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(host) = cli.host {
        config.osc.host = host;
    }
    if let Some(port) = cli.send_port {
        config.osc.send_port = port;
    }
    if let Some(port) = cli.listen_port {
        config.osc.listen_port = port;
    }

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.telemetry.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match cli.command {
        Commands::Console => {
            let gateway = commands::connect(&config, cli.reload)?;
            commands::console(&gateway, std::io::stdin().lock())?;
        }
        Commands::Query {
            address,
            args,
            response,
            timeout,
        } => {
            let gateway = commands::connect(&config, cli.reload)?;
            commands::query(&gateway, &address, &args, response.as_deref(), timeout)?;
        }
        Commands::Send { address, args } => {
            let gateway = commands::connect(&config, cli.reload)?;
            commands::send(&gateway, &address, &args)?;
        }
        Commands::Dump {
            devices,
            clip_names,
        } => {
            commands::dump(&config, cli.reload, devices, clip_names)?;
        }
    }

    Ok(())
}

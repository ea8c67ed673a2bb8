//! CLI command implementations

use std::io::BufRead;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use liveconf::LiveConfig;
use liveosc::{Gateway, GatewayConfig, Message, OscValue};
use livemirror::{ScanOptions, Session};
use tracing::{debug, info};

const RELOAD: &str = "/live/reload";

/// Addresses are OSC paths; catch the common slip of leaving off the slash.
fn validate_address(address: &str) -> Result<()> {
    if !address.starts_with('/') {
        bail!(
            "Invalid OSC address: '{}'\n\n\
             Addresses start with '/', e.g.:\n  \
             /live/tempo\n  \
             /live/name/track 0",
            address
        );
    }
    Ok(())
}

pub fn parse_args(tokens: &[String]) -> Vec<OscValue> {
    tokens.iter().map(|t| OscValue::parse_token(t)).collect()
}

/// Split a console line into address and arguments. Blank lines give `None`.
pub fn parse_line(line: &str) -> Option<(String, Vec<OscValue>)> {
    let mut tokens = line.split_whitespace();
    let address = tokens.next()?.to_string();
    let args = tokens.map(OscValue::parse_token).collect();
    Some((address, args))
}

pub fn format_message(address: &str, args: &[OscValue]) -> String {
    let mut line = address.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string());
    }
    line
}

pub fn connect(config: &LiveConfig, reload: bool) -> Result<Gateway> {
    let gateway_config = GatewayConfig::from_config(config).context("Failed to resolve Live host")?;
    let gateway = Gateway::connect(gateway_config).context("Failed to open OSC socket")?;
    if reload {
        info!("asking LiveOSC to reload");
        gateway.send(RELOAD, vec![])?;
    }
    Ok(gateway)
}

/// Send one request and print the reply
pub fn query(
    gateway: &Gateway,
    address: &str,
    args: &[String],
    response: Option<&str>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    validate_address(address)?;
    let response = response.unwrap_or(address);
    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| gateway.default_timeout());

    let reply = gateway
        .request_with(address, parse_args(args), response, timeout)
        .with_context(|| format!("No reply to {} (is Live running with LiveOSC?)", address))?;
    println!("{}", format_message(response, &reply));
    Ok(())
}

pub fn send(gateway: &Gateway, address: &str, args: &[String]) -> Result<()> {
    validate_address(address)?;
    gateway.send(address, parse_args(args))?;
    Ok(())
}

/// Interactive loop: each line is sent, every inbound message is printed.
pub fn console(gateway: &Gateway, input: impl BufRead) -> Result<()> {
    gateway.set_monitor(|message: &Message| {
        println!("<- {}", format_message(&message.address, &message.args));
    });

    for line in input.lines() {
        let line = line.context("Failed to read stdin")?;
        let Some((address, args)) = parse_line(&line) else {
            continue;
        };
        if address == "quit" || address == "exit" {
            break;
        }
        if let Err(e) = validate_address(&address) {
            eprintln!("{}", e);
            continue;
        }
        debug!("-> {}", format_message(&address, &args));
        if let Err(e) = gateway.send(&address, args) {
            eprintln!("send failed: {}", e);
        }
    }

    // let late replies land before the listener goes away
    std::thread::sleep(gateway.poll_interval() * 5);
    Ok(())
}

pub fn dump(config: &LiveConfig, reload: bool, devices: bool, clip_names: bool) -> Result<()> {
    let session = Session::connect(config).context("Failed to open OSC socket")?;
    if reload {
        session.gateway().send(RELOAD, vec![])?;
    }
    session
        .scan(ScanOptions {
            clip_names,
            devices,
        })
        .context("Scan failed")?;
    print!("{}", session.graph());
    Ok(())
}

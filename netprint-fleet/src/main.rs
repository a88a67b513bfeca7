use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use netprint_fleet::{
    ConnectionState, DeviceAddress, Fleet, FleetConfig, ReceiptDocument, Selection, logger,
};

/// A printer given on the command line
#[derive(Debug, Clone)]
enum Target {
    /// `host:port`, added directly
    Printer(DeviceAddress),
    /// Bare host, probed on the discovery ports
    Host(String),
}

fn parse_target(arg: &str) -> Result<Target, netprint_escpos::PrintError> {
    if arg.contains(':') {
        arg.parse().map(Target::Printer)
    } else {
        Ok(Target::Host(arg.to_string()))
    }
}

#[derive(Parser, Debug)]
#[command(name = "netprint", about = "Drive a fleet of ESC/POS network receipt printers")]
struct Cli {
    /// Printers as `host:port`, or bare hosts to discover
    #[arg(value_name = "HOST[:PORT]", value_parser = parse_target)]
    targets: Vec<Target>,

    /// Receipt JSON printed once on every printer that connects
    #[arg(long, env = "NETPRINT_RECEIPT")]
    receipt: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (.env, arguments, logging)
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    logger::init_logger();

    tracing::info!("netprint starting");

    // 2. Configuration
    let config = FleetConfig::from_env();
    tracing::debug!(?config, "Configuration loaded");

    let receipt = match &cli.receipt {
        Some(path) => {
            let payload =
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            ReceiptDocument::from_json(&payload)
                .with_context(|| format!("decoding {}", path.display()))?;
            Some(payload)
        }
        None => None,
    };

    // 3. Fleet
    let (fleet, mut events) = Fleet::spawn_tcp(config);

    for target in cli.targets {
        match target {
            Target::Printer(address) => {
                fleet.add(address.clone())?;
                fleet.connect(Selection::One(address))?;
            }
            Target::Host(host) => fleet.discover(host)?,
        }
    }

    // 4. Watch the fleet until Ctrl-C
    let mut printed: HashSet<DeviceAddress> = HashSet::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received");
                break;
            }
            Some(address) = events.discovered_rx.recv() => {
                fleet.add(address.clone())?;
                fleet.connect(Selection::One(address))?;
            }
            Some(devices) = events.devices_rx.recv() => {
                tracing::info!(devices = %serde_json::to_string(&devices)?, "Device list changed");

                let Some(payload) = &receipt else {
                    continue;
                };
                for device in devices
                    .iter()
                    .filter(|d| d.state == ConnectionState::Connected && !d.pending_job)
                {
                    if printed.insert(device.address.clone()) {
                        fleet.print_check_json(Selection::One(device.address.clone()), payload)?;
                    }
                }
            }
        }
    }

    // 5. Shutdown
    fleet.shutdown().await;
    tracing::info!("netprint stopped");
    Ok(())
}

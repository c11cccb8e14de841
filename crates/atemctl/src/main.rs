use atem::{AtemClient, AtemEvent};
use atem_log::AtemLogger;
use log::{Level, debug, error, info, trace, warn};
use std::net::SocketAddr;
use std::str::FromStr;

pub mod config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match config::handle() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let level = Level::from_str(&config.log.level).unwrap_or(Level::Info);
    let wire_level = Level::from_str(&config.log.wire_level).unwrap_or(level);
    AtemLogger::init_with_wire_level(level, wire_level, 1024)?;

    let addr: SocketAddr = config.switcher.address.parse()?;
    info!("connecting to switcher at {}", addr);

    let (client, mut events) = match AtemClient::connect_to(addr, config.client.clone()).await {
        Ok(pair) => pair,
        Err(e) => {
            error!("failed to start client: {}", e);
            std::process::exit(1);
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            event = events.recv() => match event {
                None => break,
                Some(AtemEvent::Connected) => {
                    info!("connected to {}", addr);
                }
                Some(AtemEvent::Disconnected) => {
                    warn!("connection lost; reconnecting");
                }
                Some(AtemEvent::Receive(commands)) => {
                    for command in commands {
                        debug!("{:?}", command);
                    }
                }
                Some(AtemEvent::ReceivePacket(packet)) => {
                    trace!(
                        "packet flags {} pkt {:#06x} ({} bytes)",
                        packet.header.flags,
                        packet.header.pkt_id,
                        packet.header.length
                    );
                }
            }
        }
    }

    client.close().await;
    info!("session stats: {:?}", client.stats().await);
    log::logger().flush();
    Ok(())
}

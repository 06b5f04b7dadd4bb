//! # peartalk
//!
//! Command-line PearTalk node.
//!
//! Runs one chat core for the identity named by `PEARTALK_USER` on top of a
//! libp2p swarm, and reads commands from stdin (`/help` lists them).
//! Incoming messages and peer changes are printed as they happen.

mod bridge;
mod commands;
mod config;

use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use peartalk_core::{CoreEvent, CoreNotification, CoreRegistry, Rendezvous};
use peartalk_net::{parse_multiaddrs, spawn_swarm, SwarmCommand, SwarmConfig};
use peartalk_shared::constants::APP_NAME;
use peartalk_shared::UserId;

use crate::bridge::{handle_notification, LinkBook, SwarmRendezvous};
use crate::commands::{execute, format_message, Command, Flow};
use crate::config::NodeConfig;

/// How often flushes paused by a full swarm command queue are resumed.
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

fn print_event(notification: &CoreNotification) {
    match &notification.event {
        CoreEvent::PeerConnected(peer) => println!("* peer {} connected", peer.short()),
        CoreEvent::PeerDisconnected(peer) => println!("* peer {} disconnected", peer.short()),
        CoreEvent::Message(message) if message.sender == notification.local => {}
        CoreEvent::Message(message) => println!("{}", format_message(message)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,peartalk_core=debug,peartalk_net=debug")),
        )
        .init();

    info!("Starting {} node v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::from_env();
    info!(?config, "Loaded configuration");
    let user = config
        .user
        .clone()
        .context("PEARTALK_USER must name the local identity")?;

    // The transport key is per run; identities live above it.
    let keypair = libp2p::identity::Keypair::generate_ed25519();
    let swarm_config = SwarmConfig {
        local_identity: user.clone(),
        bootstrap_peers_path: config.bootstrap_peers_path.clone(),
        listen_port: config.listen_port,
        extra_dials: parse_multiaddrs(&config.dial),
    };
    let (cmd_tx, mut notif_rx, peer_id) = spawn_swarm(keypair, swarm_config).await?;
    info!(peer_id = %peer_id, user = %user, "Swarm running");

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let factory_tx = cmd_tx.clone();
    let mut cores = CoreRegistry::new(
        config.core.clone(),
        events_tx,
        Box::new(move |_: &UserId| -> Box<dyn Rendezvous> {
            Box::new(SwarmRendezvous::new(factory_tx.clone()))
        }),
    );
    cores.open(&user)?;
    println!("{APP_NAME} ready as {user}. Type /help for commands.");

    let mut book = LinkBook::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut flush_tick = tokio::time::interval(FLUSH_INTERVAL);
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            notification = notif_rx.recv() => {
                let Some(notification) = notification else {
                    warn!("Swarm task ended");
                    break;
                };
                if let Some(core) = cores.get_mut(&user) {
                    handle_notification(core, &mut book, &cmd_tx, notification);
                }
            }
            Some(notification) = events_rx.recv() => {
                print_event(&notification);
            }
            _ = flush_tick.tick() => {
                if let Some(core) = cores.get_mut(&user) {
                    core.flush_pending();
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Failed to read stdin");
                        break;
                    }
                };
                let command = match Command::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                };
                let Some(core) = cores.get_mut(&user) else {
                    break;
                };
                match execute(core, command) {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => println!("error: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    cores.close_all();
    if cmd_tx.send(SwarmCommand::Shutdown).await.is_err() {
        warn!("Swarm already stopped");
    }

    // Surface events raised while closing.
    while let Ok(notification) = events_rx.try_recv() {
        print_event(&notification);
    }

    Ok(())
}

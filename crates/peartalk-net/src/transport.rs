use std::time::Duration;

use libp2p::identity::Keypair;
use libp2p::{noise, yamux, Swarm, SwarmBuilder};
use tracing::info;

use crate::behaviour::PeartalkBehaviour;

const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// QUIC swarm with relay fallback (noise + yamux over relayed circuits).
pub fn build_swarm(keypair: Keypair) -> anyhow::Result<Swarm<PeartalkBehaviour>> {
    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_quic()
        .with_relay_client(noise::Config::new, yamux::Config::default)?
        .with_behaviour(|key, relay_client| PeartalkBehaviour::new(key, relay_client))?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
        .build();

    info!(peer_id = %swarm.local_peer_id(), "Built PearTalk swarm");

    Ok(swarm)
}

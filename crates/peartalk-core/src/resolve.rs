//! Mapping from external identities to connection-layer routing keys.

use peartalk_shared::constants::KDF_CONTEXT_PEER_ROUTE;
use peartalk_shared::{RoutingKey, UserId};

/// Resolves an identity to the key its sessions and pending messages are
/// filed under. The same identity must always give the same key, on both the
/// send and the receive path.
pub trait PeerResolver: Send {
    fn resolve(&self, identity: &UserId) -> RoutingKey;
}

/// Deterministic hash of the identity.
///
/// Stands in for a real directory: it cannot follow key rotation or several
/// devices per identity, and colliding identities are indistinguishable.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashResolver;

impl PeerResolver for HashResolver {
    fn resolve(&self, identity: &UserId) -> RoutingKey {
        RoutingKey(blake3::derive_key(KDF_CONTEXT_PEER_ROUTE, identity.as_bytes()))
    }
}

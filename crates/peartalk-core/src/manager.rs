//! Lifecycle of the cores of every local identity in the process.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::info;

use peartalk_shared::UserId;

use crate::chat::ChatCore;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::events::EventSink;
use crate::stream::Rendezvous;

/// Builds the rendezvous handle a new core joins its topics through.
pub type RendezvousFactory = Box<dyn FnMut(&UserId) -> Box<dyn Rendezvous> + Send>;

/// One [`ChatCore`] per local identity, created on first use and kept until
/// closed. All cores share the event sink; notifications carry the identity
/// of the core that raised them.
pub struct CoreRegistry {
    config: CoreConfig,
    events: EventSink,
    rendezvous: RendezvousFactory,
    cores: HashMap<UserId, ChatCore>,
}

impl CoreRegistry {
    pub fn new(config: CoreConfig, events: EventSink, rendezvous: RendezvousFactory) -> Self {
        Self {
            config,
            events,
            rendezvous,
            cores: HashMap::new(),
        }
    }

    /// The connected core for `identity`, opening it if needed.
    pub fn open(&mut self, identity: &str) -> Result<&mut ChatCore, CoreError> {
        if identity.is_empty() {
            return Err(CoreError::MissingIdentity);
        }
        let identity = UserId::parse(identity)?;

        let core = match self.cores.entry(identity) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let rendezvous = (self.rendezvous)(entry.key());
                let core = ChatCore::open(
                    entry.key().clone(),
                    &self.config,
                    rendezvous,
                    self.events.clone(),
                )?;
                info!(identity = %entry.key(), "registered local identity");
                entry.insert(core)
            }
        };

        core.connect()?;
        Ok(core)
    }

    pub fn get(&self, identity: &str) -> Option<&ChatCore> {
        let identity = UserId::parse(identity).ok()?;
        self.cores.get(&identity)
    }

    pub fn get_mut(&mut self, identity: &str) -> Option<&mut ChatCore> {
        let identity = UserId::parse(identity).ok()?;
        self.cores.get_mut(&identity)
    }

    /// Disconnect and drop the core of `identity`. Returns whether one was
    /// open.
    pub fn close(&mut self, identity: &str) -> bool {
        let Ok(identity) = UserId::parse(identity) else {
            return false;
        };
        match self.cores.remove(&identity) {
            Some(mut core) => {
                core.disconnect();
                info!(identity = %identity, "closed local identity");
                true
            }
            None => false,
        }
    }

    pub fn close_all(&mut self) {
        for (_, mut core) in self.cores.drain() {
            core.disconnect();
        }
    }

    pub fn identities(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.cores.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.cores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }
}

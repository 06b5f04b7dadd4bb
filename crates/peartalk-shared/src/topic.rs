//! Discovery topic derivation.
//!
//! Both sides of a conversation compute the same topic from the sorted pair
//! of identities, so they can rendezvous without a third party.

use crate::constants::{KDF_CONTEXT_CHAT_TOPIC, KDF_CONTEXT_USER_TOPIC, TOPIC_SEPARATOR};
use crate::error::IdentityError;
use crate::types::{Topic, UserId};

/// Personal presence topic of a single identity.
pub fn derive_presence_topic(self_id: &str) -> Result<Topic, IdentityError> {
    let id = UserId::parse(self_id)?;

    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_USER_TOPIC);
    update_length_prefixed(&mut hasher, id.as_bytes());
    Ok(Topic(*hasher.finalize().as_bytes()))
}

/// Conversation topic shared by `a` and `b`. Argument order does not matter.
pub fn derive_chat_topic(a: &str, b: &str) -> Result<Topic, IdentityError> {
    let a = UserId::parse(a)?;
    let b = UserId::parse(b)?;
    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_CHAT_TOPIC);
    update_length_prefixed(&mut hasher, first.as_bytes());
    hasher.update(&[TOPIC_SEPARATOR]);
    update_length_prefixed(&mut hasher, second.as_bytes());
    Ok(Topic(*hasher.finalize().as_bytes()))
}

// Length prefix keeps ("ab", "c") and ("a", "bc") apart.
fn update_length_prefixed(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

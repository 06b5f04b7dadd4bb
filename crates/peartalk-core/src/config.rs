//! Core configuration loaded from environment variables.
//!
//! Every setting has a default so a core can be opened with zero
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use peartalk_shared::constants::DEFAULT_HISTORY_LIMIT;
use peartalk_store::Database;

use crate::pending::PendingPolicy;

/// Fallback storage root when no platform data directory is available.
const FALLBACK_STORAGE_ROOT: &str = "./data/p2p";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Directory under which each local identity gets its own store.
    /// Env: `PEARTALK_DATA_DIR`
    /// Default: the platform data directory, else `./data/p2p`
    pub storage_root: PathBuf,

    /// Limits on messages waiting for an unreachable peer.
    /// Env: `PEARTALK_MAX_PENDING_PER_PEER`, `PEARTALK_PENDING_TTL_SECS`
    /// Default: unbounded
    pub pending: PendingPolicy,

    /// History returned by `get_messages` when no limit is given.
    /// Env: `PEARTALK_HISTORY_LIMIT`
    /// Default: `50`
    pub history_limit: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            storage_root: Database::default_root()
                .unwrap_or_else(|_| PathBuf::from(FALLBACK_STORAGE_ROOT)),
            pending: PendingPolicy::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl CoreConfig {
    /// Settings rooted at an explicit storage directory, everything else
    /// defaulted.
    pub fn with_storage_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: root.into(),
            pending: PendingPolicy::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`CoreConfig::from_env`] with variables read through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = match lookup("PEARTALK_DATA_DIR") {
            Some(dir) if !dir.trim().is_empty() => Self::with_storage_root(dir),
            _ => Self::default(),
        };

        if let Some(val) = lookup("PEARTALK_MAX_PENDING_PER_PEER") {
            match val.parse::<usize>() {
                Ok(n) => config.pending.max_per_peer = Some(n),
                Err(_) => tracing::warn!(
                    value = %val,
                    "Invalid PEARTALK_MAX_PENDING_PER_PEER, keeping queue unbounded"
                ),
            }
        }

        if let Some(val) = lookup("PEARTALK_PENDING_TTL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => config.pending.max_age = Some(Duration::from_secs(secs)),
                Err(_) => tracing::warn!(
                    value = %val,
                    "Invalid PEARTALK_PENDING_TTL_SECS, queued messages never expire"
                ),
            }
        }

        if let Some(val) = lookup("PEARTALK_HISTORY_LIMIT") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.history_limit = n,
                _ => tracing::warn!(
                    value = %val,
                    default = DEFAULT_HISTORY_LIMIT,
                    "Invalid PEARTALK_HISTORY_LIMIT, using default"
                ),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.pending, PendingPolicy::default());
    }

    #[test]
    fn test_from_lookup_reads_all_settings() {
        let config = CoreConfig::from_lookup(lookup(&[
            ("PEARTALK_DATA_DIR", "/tmp/pt"),
            ("PEARTALK_MAX_PENDING_PER_PEER", "100"),
            ("PEARTALK_PENDING_TTL_SECS", "3600"),
            ("PEARTALK_HISTORY_LIMIT", "20"),
        ]));

        assert_eq!(config.storage_root, PathBuf::from("/tmp/pt"));
        assert_eq!(config.pending.max_per_peer, Some(100));
        assert_eq!(config.pending.max_age, Some(Duration::from_secs(3600)));
        assert_eq!(config.history_limit, 20);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = CoreConfig::from_lookup(lookup(&[
            ("PEARTALK_DATA_DIR", "/tmp/pt"),
            ("PEARTALK_MAX_PENDING_PER_PEER", "lots"),
            ("PEARTALK_PENDING_TTL_SECS", "-1"),
            ("PEARTALK_HISTORY_LIMIT", "0"),
        ]));

        assert_eq!(config.pending, PendingPolicy::default());
        assert_eq!(config.history_limit, 50);
    }
}

//! Node configuration loaded from environment variables.

use std::path::PathBuf;

use peartalk_core::CoreConfig;
use peartalk_shared::constants::DEFAULT_QUIC_PORT;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Local identity this node speaks for.
    /// Env: `PEARTALK_USER`
    /// Default: none (the node refuses to start)
    pub user: Option<String>,

    /// QUIC listen port.
    /// Env: `PEARTALK_LISTEN_PORT`
    /// Default: `4001`
    pub listen_port: u16,

    /// File of bootstrap multiaddrs, one per line.
    /// Env: `PEARTALK_BOOTSTRAP_PEERS`
    pub bootstrap_peers_path: Option<PathBuf>,

    /// Multiaddrs to dial on startup.
    /// Env: `PEARTALK_DIAL` (comma separated)
    pub dial: Vec<String>,

    pub core: CoreConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            user: None,
            listen_port: DEFAULT_QUIC_PORT,
            bootstrap_peers_path: None,
            dial: Vec::new(),
            core: CoreConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self {
            core: CoreConfig::from_lookup(&lookup),
            ..Self::default()
        };

        if let Some(user) = lookup("PEARTALK_USER") {
            if !user.trim().is_empty() {
                config.user = Some(user);
            }
        }

        if let Some(val) = lookup("PEARTALK_LISTEN_PORT") {
            if let Ok(port) = val.parse::<u16>() {
                config.listen_port = port;
            } else {
                tracing::warn!(value = %val, "Invalid PEARTALK_LISTEN_PORT, using default");
            }
        }

        if let Some(path) = lookup("PEARTALK_BOOTSTRAP_PEERS") {
            config.bootstrap_peers_path = Some(PathBuf::from(path));
        }

        if let Some(list) = lookup("PEARTALK_DIAL") {
            config.dial = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

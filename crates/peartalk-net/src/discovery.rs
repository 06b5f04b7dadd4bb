//! Bootstrap peer loading and topic provider keys.
//!
//! Bootstrap peers come from a file of multiaddrs (one per line) or from a
//! runtime list. Joined topics are announced on the DHT under
//! [`provider_key`] so that peers joining the same topic can find us.

use std::fs;
use std::path::Path;

use libp2p::kad::RecordKey;
use libp2p::Multiaddr;
use tracing::{debug, info, warn};

use peartalk_shared::Topic;

/// Load bootstrap peer multiaddrs from a configuration file.
///
/// Empty lines and lines starting with `#` are ignored. Malformed lines are
/// logged and skipped; an unreadable file yields no peers.
///
/// ```text
/// # PearTalk bootstrap nodes
/// /ip4/198.51.100.10/udp/4001/quic-v1/p2p/12D3KooW...
/// ```
pub fn load_bootstrap_peers(path: &Path) -> Vec<Multiaddr> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to read bootstrap peers file"
            );
            return Vec::new();
        }
    };

    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    let addrs = parse_multiaddrs(&lines);

    info!(
        count = addrs.len(),
        path = %path.display(),
        "Loaded bootstrap peers"
    );

    addrs
}

/// Parse multiaddr strings, skipping (and logging) the invalid ones.
pub fn parse_multiaddrs<S: AsRef<str>>(raw: &[S]) -> Vec<Multiaddr> {
    raw.iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<Multiaddr>() {
            Ok(addr) => {
                debug!(addr = %addr, "Parsed peer address");
                Some(addr)
            }
            Err(e) => {
                warn!(addr = %s, error = %e, "Skipping invalid multiaddr");
                None
            }
        })
        .collect()
}

/// DHT key under which the members of `topic` register as providers.
pub fn provider_key(topic: &Topic) -> RecordKey {
    RecordKey::new(&topic.0)
}

/// Inverse of [`provider_key`].
pub fn topic_of(key: &RecordKey) -> Option<Topic> {
    let bytes: [u8; 32] = key.to_vec().try_into().ok()?;
    Some(Topic(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_nonexistent_file() {
        let peers = load_bootstrap_peers(Path::new("/nonexistent/bootstrap.txt"));
        assert!(peers.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("peers.txt");

        let mut f = fs::File::create(&file_path).unwrap();
        writeln!(f, "# bootstrap nodes").unwrap();
        writeln!(f, "/ip4/127.0.0.1/udp/4001/quic-v1").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "invalid-addr").unwrap();
        writeln!(f, "  /ip4/127.0.0.2/udp/4001/quic-v1  ").unwrap();
        drop(f);

        let peers = load_bootstrap_peers(&file_path);
        assert_eq!(peers.len(), 2);
    }

    #[test]
    fn test_parse_multiaddrs() {
        let raw = [
            "/ip4/127.0.0.1/udp/4001/quic-v1",
            "not-a-multiaddr",
            "",
            "/ip4/10.0.0.1/udp/4001/quic-v1",
        ];
        assert_eq!(parse_multiaddrs(&raw).len(), 2);
    }

    #[test]
    fn test_provider_key_maps_back_to_topic() {
        let topic = Topic([7u8; 32]);
        assert_eq!(topic_of(&provider_key(&topic)), Some(topic));
        assert_eq!(topic_of(&RecordKey::new(&[1u8, 2, 3])), None);
    }
}

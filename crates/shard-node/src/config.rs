//! a single immutable configuration object, constructed once at node start
//! and shared by `Arc`. Parsed from a TOML file with CLI-flag overrides, the
//! way `zidecar`'s `Args` layers CLI flags over their `default_value`s.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub listen: SocketAddr,
    /// on-disk storage root; `None` runs against an in-memory adapter.
    pub data_dir: Option<PathBuf>,
    /// path to the 32-byte hex node identity seed; created on first run if
    /// missing.
    pub key_path: PathBuf,
    pub capacity_bytes: u64,
    pub token_ttl_ms: u64,
    pub consign_threshold_ms: u64,
    pub clean_interval_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:4300".parse().unwrap(),
            data_dir: None,
            key_path: PathBuf::from("./shard-node.key"),
            capacity_bytes: 10 * 1024 * 1024 * 1024,
            token_ttl_ms: 60_000,
            consign_threshold_ms: shard_protocol::DEFAULT_CONSIGN_THRESHOLD_MS,
            clean_interval_ms: 60_000,
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let cfg = NodeConfig::default();
        assert!(cfg.capacity_bytes > 0);
        assert!(cfg.token_ttl_ms > 0);
    }

    #[test]
    fn parses_a_partial_toml_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "listen = \"127.0.0.1:9000\"\ncapacity_bytes = 1024\n").unwrap();
        let cfg = NodeConfig::from_file(&path).unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.capacity_bytes, 1024);
        assert_eq!(cfg.token_ttl_ms, NodeConfig::default().token_ttl_ms);
    }
}

//! TOML configuration for the Pearl daemon.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use pearl_cluster::PeerEntry;
use pearl_engine::NodeConfig;
use pearl_types::NodeId;
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Node identity, addresses, and directories.
    pub node: NodeSection,
    /// Cluster membership.
    pub cluster: ClusterSection,
    /// Replication tuning.
    pub replication: ReplicationSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// This node's id (at most 32 bytes).
    pub id: String,
    /// RPC listen address.
    pub address: String,
    /// Directory holding `ca.crt`, `node.crt`, `node.key`.
    pub certs_dir: PathBuf,
    /// Directory for the embedded database.
    pub storage_dir: PathBuf,
}

impl Default for NodeSection {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            id: String::new(),
            address: "0.0.0.0:7801".to_string(),
            certs_dir: home.join(".pearl").join("certs"),
            storage_dir: home.join(".pearl").join("data"),
        }
    }
}

/// `[cluster]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Peer nodes: id → RPC address.
    pub peers: BTreeMap<String, String>,
}

/// `[replication]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReplicationSection {
    /// Sync cycle period (e.g. `"30s"`, `"5m"`). Default 30 seconds.
    pub interval: Option<String>,
    /// Maximum entries per replication response. Default 1000.
    pub limit: Option<usize>,
    /// Tombstone retention (e.g. `"720h"`). Default 720 hours. Must exceed
    /// the longest network partition the cluster is expected to survive.
    pub tombstone_expiration: Option<String>,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read {}", p.display()))?;
                Ok(toml::from_str(&content)?)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// This node's id, validated.
    pub fn node_id(&self) -> anyhow::Result<NodeId> {
        NodeId::from_name(&self.node.id)
            .with_context(|| format!("invalid node id {:?} (1..=32 bytes required)", self.node.id))
    }

    /// Effective sync cycle period.
    pub fn replication_interval(&self) -> anyhow::Result<Duration> {
        parse_optional_duration(self.replication.interval.as_deref(), "replication.interval")
            .map(|d| d.unwrap_or(Duration::from_secs(30)))
    }

    /// Effective response entry cap.
    pub fn replication_limit(&self) -> usize {
        self.replication.limit.unwrap_or(1000)
    }

    /// Effective tombstone retention.
    pub fn tombstone_expiration(&self) -> anyhow::Result<Duration> {
        parse_optional_duration(
            self.replication.tombstone_expiration.as_deref(),
            "replication.tombstone_expiration",
        )
        .map(|d| d.unwrap_or(Duration::from_secs(720 * 3600)))
    }

    /// Peer entries with validated ids.
    pub fn peer_entries(&self) -> anyhow::Result<Vec<PeerEntry>> {
        self.cluster
            .peers
            .iter()
            .map(|(name, address)| {
                let node_id = NodeId::from_name(name)
                    .with_context(|| format!("invalid peer id {name:?}"))?;
                Ok(PeerEntry {
                    node_id,
                    address: address.clone(),
                })
            })
            .collect()
    }

    /// Assemble the engine-level node configuration.
    pub fn node_config(&self) -> anyhow::Result<NodeConfig> {
        Ok(NodeConfig {
            id: self.node_id()?,
            address: self.node.address.clone(),
            certs_dir: self.node.certs_dir.clone(),
            storage_dir: self.node.storage_dir.clone(),
            peers: self.peer_entries()?,
            replication_interval: self.replication_interval()?,
            replication_limit: self.replication_limit(),
            tombstone_expiration: self.tombstone_expiration()?,
        })
    }
}

/// Parse a human-readable duration: `"45s"`, `"5m"`, `"720h"`, or raw
/// seconds (`"30"`).
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(num) = s.strip_suffix('h') {
        num.trim().parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else if let Some(num) = s.strip_suffix('m') {
        num.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(num) = s.strip_suffix('s') {
        num.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn parse_optional_duration(s: Option<&str>, field: &str) -> anyhow::Result<Option<Duration>> {
    match s {
        None => Ok(None),
        Some(raw) => parse_duration(raw)
            .map(Some)
            .with_context(|| format!("invalid duration {raw:?} for {field}")),
    }
}

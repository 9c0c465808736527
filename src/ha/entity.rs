//! Topology entities: the data model shared by the DN and CN health loops,
//! the selector, and persistence.
//!
//! Grounded in `original_source/include/entity.hpp`
//! (`XClusterNodeBasic`, `LeaderTransferInfo`, `MppInfo`).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub const ROLE_LEADER: &str = "Leader";
pub const ROLE_FOLLOWER: &str = "Follower";

pub const MPP_ROLE_WRITER: &str = "W";
pub const MPP_ROLE_READER: &str = "R";
pub const MPP_ROLE_CONSISTENT_READER: &str = "CR";

fn now_nanos_string() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

/// A single DN node as reported by the `Cluster Local` / `Cluster Global`
/// probes. Peers are always flattened one level deep: a `NodeInfo` that is
/// itself a peer is constructed with an empty `peers` vector (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub tag: String,
    pub host: String,
    pub port: u16,
    pub role: String,
    #[serde(default)]
    pub peers: Vec<NodeInfo>,
    pub update_time: String,
}

impl NodeInfo {
    pub fn new(host: impl Into<String>, port: u16, role: impl Into<String>) -> Self {
        let host = host.into();
        let tag = super::util::merge_host_port(&host, port);
        NodeInfo {
            tag,
            host,
            port,
            role: role.into(),
            peers: Vec::new(),
            update_time: now_nanos_string(),
        }
    }

    pub fn is_role(&self, role: &str) -> bool {
        super::util::case_insensitive_eq(&self.role, role)
    }

    pub fn is_leader(&self) -> bool {
        self.is_role(ROLE_LEADER)
    }

    /// Flattens `self` plus all of its peers (each stripped of its own
    /// peers, which is already the invariant, but cloned defensively) into
    /// a single top-level list, matching the persisted file layout (§6.1).
    pub fn flatten(&self) -> Vec<NodeInfo> {
        let mut out = Vec::with_capacity(1 + self.peers.len());
        let mut root = self.clone();
        let peers = std::mem::take(&mut root.peers);
        out.push(root);
        for mut p in peers {
            p.peers.clear();
            out.push(p);
        }
        out
    }
}

/// Marks an in-progress leader transfer (§3.1). `started` is a monotonic
/// timestamp used only to compute elapsed age, never wall-clock time.
#[derive(Debug, Clone)]
pub struct LeaderTransferMark {
    pub tag: String,
    pub started: std::time::Instant,
}

impl LeaderTransferMark {
    pub fn new(tag: impl Into<String>) -> Self {
        LeaderTransferMark {
            tag: tag.into(),
            started: std::time::Instant::now(),
        }
    }

    pub fn age(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}

/// A single compute-node as reported by `SHOW MPP` (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MppInfo {
    pub tag: String,
    pub role: String,
    pub instance_name: String,
    #[serde(default)]
    pub zone_list: Vec<String>,
    #[serde(with = "is_leader_yn")]
    pub is_leader: bool,
}

/// `is_leader` persists as the `"Y"`/`"N"` string the original
/// `entity.hpp::MppInfo::to_json` writes (§6.1), not a JSON boolean.
mod is_leader_yn {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(if *value { "Y" } else { "N" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        let s = String::deserialize(d)?;
        Ok(s.eq_ignore_ascii_case("Y"))
    }
}

impl MppInfo {
    pub fn matches_instance(&self, instance: &str) -> bool {
        instance.is_empty() || super::util::case_insensitive_eq(&self.instance_name, instance)
    }

    pub fn in_zone_set(&self, zones: &[String]) -> bool {
        zones.is_empty()
            || self
                .zone_list
                .iter()
                .any(|z| zones.iter().any(|want| super::util::case_insensitive_eq(z, want)))
    }

    pub fn is_writer(&self) -> bool {
        super::util::case_insensitive_eq(&self.role, MPP_ROLE_WRITER)
    }
}

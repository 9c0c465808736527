//! Warm-start persistence of the topology snapshot (C2).
//!
//! The atomic write pattern (temp file in the same directory, fsync,
//! rename) is grounded in `metadata.rs`'s `write_file_atomic`. Unlike that
//! helper this one is async (wrapped in `spawn_blocking`, since `std::fs`
//! is blocking) to fit naturally into the health loops, which are
//! otherwise fully async.

use super::entity::{MppInfo, NodeInfo};
use crate::error::{DbError, Result};
use std::path::{Path, PathBuf};

async fn write_atomic(path: PathBuf, content: String) -> Result<()> {
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &content))
        .await
        .map_err(|e| DbError::Internal(format!("persistence task panicked: {e}")))?
}

fn write_atomic_blocking(path: &Path, content: &str) -> Result<()> {
    use std::io::Write;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DbError::Storage(format!("invalid persistence path: {}", path.display())))?;
    let tmp_path = parent.join(format!(".{file_name}.tmp.{}", std::process::id()));

    let write_result = (|| -> Result<()> {
        let mut f = std::fs::File::create(&tmp_path).map_err(|e| DbError::Storage(e.to_string()))?;
        f.write_all(content.as_bytes()).map_err(|e| DbError::Storage(e.to_string()))?;
        f.sync_all().map_err(|e| DbError::Storage(e.to_string()))?;
        std::fs::rename(&tmp_path, path).map_err(|e| DbError::Storage(e.to_string()))?;
        Ok(())
    })();

    if write_result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    write_result
}

async fn read_to_string(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DbError::Storage(e.to_string()))
}

/// Serializes the DN topology with peers flattened into one array (§6.1).
pub async fn save_dn_topology(path: &Path, nodes: &[NodeInfo]) -> Result<()> {
    let flattened: Vec<NodeInfo> = nodes.iter().flat_map(NodeInfo::flatten).collect();
    let content = serde_json::to_string_pretty(&flattened)?;
    write_atomic(path.to_path_buf(), content).await
}

/// Loads a previously persisted DN topology. Missing file is not an
/// error: returns an empty list so the caller can fall back to
/// `cfg.Addr` (§4.5 step 3).
pub async fn load_dn_topology(path: &Path) -> Result<Vec<NodeInfo>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let nodes: Vec<NodeInfo> = serde_json::from_str(&content)?;
    Ok(nodes)
}

pub async fn save_mpp_topology(path: &Path, nodes: &[MppInfo]) -> Result<()> {
    let content = serde_json::to_string_pretty(nodes)?;
    write_atomic(path.to_path_buf(), content).await
}

pub async fn load_mpp_topology(path: &Path) -> Result<Vec<MppInfo>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let nodes: Vec<MppInfo> = serde_json::from_str(&content)?;
    Ok(nodes)
}

/// Synthesizes the warm-start file path under the system temp directory
/// (§4.1 step 3): `XCluster-<id-or-addr>-{IPv4|IPv6}.json`.
pub fn synthesize_json_path(cluster_id: i64, addr: &str, use_ipv6: bool) -> PathBuf {
    let ident = if cluster_id >= 0 {
        cluster_id.to_string()
    } else {
        addr.replace([':', ',', '/'], "_")
    };
    let family = if use_ipv6 { "IPv6" } else { "IPv4" };
    std::env::temp_dir().join(format!("XCluster-{ident}-{family}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_dn_topology_with_flattened_peers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dn.json");

        let mut leader = NodeInfo::new("10.0.0.1", 3306, super::super::entity::ROLE_LEADER);
        leader.peers.push(NodeInfo::new("10.0.0.2", 3306, super::super::entity::ROLE_FOLLOWER));

        save_dn_topology(&path, &[leader]).await.unwrap();
        let loaded = load_dn_topology(&path).await.unwrap();

        let tags: std::collections::HashSet<_> = loaded.iter().map(|n| n.tag.clone()).collect();
        assert!(tags.contains("10.0.0.1:3306"));
        assert!(tags.contains("10.0.0.2:3306"));
        assert!(loaded.iter().all(|n| n.peers.is_empty()));
    }

    #[tokio::test]
    async fn missing_file_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(load_dn_topology(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mpp_topology_persists_is_leader_as_yn_string() {
        use super::super::entity::MppInfo;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mpp.json");

        let nodes = vec![
            MppInfo {
                tag: "10.0.0.1:3307".to_string(),
                role: "W".to_string(),
                instance_name: "inst1".to_string(),
                zone_list: vec!["hz1".to_string()],
                is_leader: true,
            },
            MppInfo {
                tag: "10.0.0.2:3307".to_string(),
                role: "R".to_string(),
                instance_name: "inst2".to_string(),
                zone_list: vec!["hz1".to_string()],
                is_leader: false,
            },
        ];

        save_mpp_topology(&path, &nodes).await.unwrap();
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("\"is_leader\": \"Y\""));
        assert!(raw.contains("\"is_leader\": \"N\""));

        let loaded = load_mpp_topology(&path).await.unwrap();
        assert_eq!(loaded, nodes);
    }

    #[test]
    fn synthesized_path_distinguishes_address_family() {
        let v4 = synthesize_json_path(-1, "10.0.0.1:3306", false);
        let v6 = synthesize_json_path(-1, "10.0.0.1:3306", true);
        assert_ne!(v4, v6);
        assert!(v4.to_string_lossy().contains("IPv4"));
        assert!(v6.to_string_lossy().contains("IPv6"));
    }
}

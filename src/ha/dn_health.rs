//! The DN background health loop (C4).
//!
//! Grounded in `original_source/src/ha_manager.cpp`'s `dn_ha_checker` /
//! `ping_leader` / `fully_check` / `probe_and_update_leader` state
//! machine, and in the tick-loop shape of
//! `networking/discovery/registry.rs`'s `start_refresh_task`
//! (`tokio::spawn` + adaptive `tokio::time::sleep` race against a stop
//! signal).

use super::entity::{NodeInfo, ROLE_LEADER};
use super::persistence;
use super::probe;
use super::sql::SqlExecutorFactory;
use super::topology::{ClusterState, Topology};
use super::util;
use crate::config::PolarConfig;
use crate::logging::Logger;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnClassification {
    LeaderAlive,
    LeaderTransferring,
    LeaderTransferred,
    LeaderLost,
}

impl DnClassification {
    fn next_sleep(self, cfg: &PolarConfig) -> Duration {
        match self {
            DnClassification::LeaderAlive => {
                Duration::from_millis(100.min(cfg.ha_check_interval_ms))
            }
            DnClassification::LeaderTransferring => {
                Duration::from_millis(cfg.check_leader_transferring_interval_ms)
            }
            DnClassification::LeaderTransferred => Duration::ZERO,
            DnClassification::LeaderLost => Duration::from_millis(3000.min(cfg.ha_check_interval_ms)),
        }
    }
}

pub struct DnHealthLoop {
    pub cfg: PolarConfig,
    pub topology: Arc<Topology>,
    pub factory: Arc<dyn SqlExecutorFactory>,
    pub json_path: PathBuf,
    pub logger: Logger,
    pub stop: Arc<Notify>,
}

impl DnHealthLoop {
    pub async fn run(self) {
        tracing::info!(addr = %self.cfg.addr, "dn health loop starting");
        loop {
            let classification = self.tick().await;
            tracing::debug!(?classification, "dn health loop tick");
            let sleep = classification.next_sleep(&self.cfg);
            if sleep.is_zero() {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = self.stop.notified() => {
                    tracing::info!("dn health loop stopping");
                    return;
                }
            }
        }
    }

    async fn tick(&self) -> DnClassification {
        self.expire_transfer_mark_if_stale().await;

        let has_pinned = {
            let state = self.topology.read().await;
            match &*state {
                ClusterState::Dn(dn) => dn.leader.is_some() && dn.long_connection.is_some(),
                ClusterState::Cn(_) => unreachable!("DnHealthLoop used on a CN topology"),
            }
        };

        if has_pinned {
            self.ping().await
        } else {
            self.fully_check().await
        }
    }

    async fn expire_transfer_mark_if_stale(&self) {
        let mut state = self.topology.write().await;
        if let ClusterState::Dn(dn) = &mut *state {
            if let Some(mark) = &dn.transfer {
                if mark.age() >= Duration::from_millis(self.cfg.leader_transferring_wait_timeout_ms) {
                    dn.transfer = None;
                }
            }
        }
    }

    /// Pings the pinned leader connection (§4.5 step 2).
    async fn ping(&self) -> DnClassification {
        let conn = {
            let state = self.topology.read().await;
            match &*state {
                ClusterState::Dn(dn) => dn.long_connection.clone(),
                ClusterState::Cn(_) => unreachable!(),
            }
        };
        let Some(conn) = conn else {
            return self.fully_check().await;
        };

        match probe::cluster_local(conn.as_ref()).await {
            Ok(local) if !local.role.eq_ignore_ascii_case(ROLE_LEADER) => {
                self.clear_leader().await;
                self.logger.info("leader ping: role changed away from leader");
                DnClassification::LeaderTransferred
            }
            Ok(_) => match probe::leader_transfer_flag(conn.as_ref()).await {
                Ok(true) => {
                    self.clear_leader_mark_transferring().await;
                    DnClassification::LeaderTransferring
                }
                Ok(false) => DnClassification::LeaderAlive,
                Err(e) => {
                    self.logger.error(format!("leader-transfer-flag probe failed: {e}"));
                    self.clear_leader().await;
                    DnClassification::LeaderLost
                }
            },
            Err(e) => {
                self.logger.error(format!("leader ping failed: {e}"));
                self.clear_leader().await;
                DnClassification::LeaderLost
            }
        }
    }

    async fn clear_leader(&self) {
        let mut state = self.topology.write().await;
        if let ClusterState::Dn(dn) = &mut *state {
            dn.leader = None;
            dn.long_connection = None;
        }
    }

    async fn clear_leader_mark_transferring(&self) {
        let mut state = self.topology.write().await;
        if let ClusterState::Dn(dn) = &mut *state {
            let tag = dn.leader.as_ref().map(|l| l.tag.clone()).unwrap_or_default();
            dn.leader = None;
            dn.long_connection = None;
            dn.transfer = Some(super::entity::LeaderTransferMark::new(tag));
        }
    }

    /// Full concurrent re-probe of every known address (§4.5 step 3).
    async fn fully_check(&self) -> DnClassification {
        self.seed_addresses().await;
        let addresses = self.topology.addresses().await;
        if addresses.is_empty() {
            self.logger.error("fully_check: no known addresses to probe");
            return DnClassification::LeaderLost;
        }

        let mut joinset = tokio::task::JoinSet::new();
        for addr in addresses {
            let factory = self.factory.clone();
            let connect_timeout = Duration::from_millis(self.cfg.ha_check_connect_timeout_ms);
            joinset.spawn(async move { probe_one_dn(factory, addr, connect_timeout).await });
        }

        let mut by_tag: HashMap<String, NodeInfo> = HashMap::new();
        let mut global_port_gap: Option<i32> = None;
        while let Some(joined) = joinset.join_next().await {
            let Ok(outcome) = joined else { continue };
            let Some((node, gap)) = outcome else { continue };
            if let Some(gap) = gap {
                global_port_gap = Some(gap);
            }
            for flat in node.flatten() {
                by_tag.insert(flat.tag.clone(), flat);
            }
        }

        let ignore_vip = self.cfg.ignore_vip();
        let leader = by_tag
            .values()
            .find(|n| n.is_leader() && (ignore_vip || n.tag == util::merge_host_port(&n.host, n.port)))
            .cloned();

        match leader {
            Some(leader) => self.commit_leader(leader, by_tag, global_port_gap).await,
            None => {
                let state = self.topology.read().await;
                match &*state {
                    ClusterState::Dn(dn) if dn.transfer.is_some() => DnClassification::LeaderTransferring,
                    _ => DnClassification::LeaderLost,
                }
            }
        }
    }

    async fn seed_addresses(&self) {
        let mut candidates: Vec<String> = persistence::load_dn_topology(&self.json_path)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|n| n.is_role(ROLE_LEADER) || n.is_role(super::entity::ROLE_FOLLOWER))
            .map(|n| n.tag)
            .collect();
        for addr in util::split_addr_list(&self.cfg.addr) {
            if !candidates.contains(&addr) {
                candidates.push(addr);
            }
        }
        self.topology.seed_addresses_if_empty(candidates).await;
    }

    async fn commit_leader(
        &self,
        leader_snapshot: NodeInfo,
        by_tag: HashMap<String, NodeInfo>,
        global_port_gap: Option<i32>,
    ) -> DnClassification {
        let mut full_peers: Vec<NodeInfo> = by_tag
            .values()
            .filter(|n| n.tag != leader_snapshot.tag)
            .cloned()
            .collect();
        let mut leader = leader_snapshot;
        leader.peers.append(&mut full_peers);

        if let Err(e) = persistence::save_dn_topology(&self.json_path, &[leader.clone()]).await {
            self.logger.error(format!("persisting dn topology failed: {e}"));
        }

        let props = HashMap::new();
        let connect_timeout = Duration::from_millis(self.cfg.ha_check_connect_timeout_ms);
        let conn = match self.factory.connect(&leader.tag, connect_timeout, &props).await {
            Ok(c) => c,
            Err(e) => {
                self.logger.error(format!("opening long connection to new leader failed: {e}"));
                return DnClassification::LeaderLost;
            }
        };
        if let Err(e) = probe::apply_ping_mode(conn.as_ref()).await {
            self.logger.error(format!("applying ping mode failed: {e}"));
        }

        match probe::leader_transfer_flag(conn.as_ref()).await {
            Ok(true) => {
                let mut state = self.topology.write().await;
                if let ClusterState::Dn(dn) = &mut *state {
                    dn.leader = None;
                    dn.long_connection = None;
                    dn.transfer = Some(super::entity::LeaderTransferMark::new(leader.tag.clone()));
                }
                DnClassification::LeaderTransferring
            }
            Ok(false) => {
                let mut state = self.topology.write().await;
                if let ClusterState::Dn(dn) = &mut *state {
                    dn.leader = Some(leader);
                    dn.long_connection = Some(conn);
                    dn.transfer = None;
                    if let Some(gap) = global_port_gap {
                        dn.global_port_gap = gap;
                    }
                }
                drop(state);
                self.topology.notify_change();
                DnClassification::LeaderAlive
            }
            Err(e) => {
                self.logger.error(format!("post-commit transfer-flag check failed: {e}"));
                DnClassification::LeaderLost
            }
        }
    }
}

/// Probes a single address end-to-end: Cluster Local, and if the node is
/// already the leader, Cluster Global too. Returns `None` on any probe
/// failure (the address is simply dropped from this sweep, §7
/// `probe_fail`).
async fn probe_one_dn(
    factory: Arc<dyn SqlExecutorFactory>,
    addr: String,
    connect_timeout: Duration,
) -> Option<(NodeInfo, Option<i32>)> {
    let props = HashMap::new();
    let conn = factory.connect(&addr, connect_timeout, &props).await.ok()?;
    let local = probe::cluster_local(conn.as_ref()).await.ok()?;
    let (host, port) = util::parse_host_port(&addr)?;

    if !local.role.eq_ignore_ascii_case(ROLE_LEADER) {
        let (leader_host, leader_paxos_port) = util::parse_host_port(&local.current_leader)?;
        let mut node = NodeInfo::new(host, port, local.role);
        let mut leader_peer = NodeInfo::new(leader_host, leader_paxos_port, ROLE_LEADER);
        leader_peer.peers.clear();
        node.peers.push(leader_peer);
        let _ = conn.close().await;
        return Some((node, None));
    }

    // `CURRENT_LEADER` on the leader's own Cluster Local row is its own
    // paxos-port address; comparing it to the SQL port we contacted gives
    // the cluster-wide port gap (§3.1, §4.5).
    let global_port_gap = util::parse_host_port(&local.current_leader)
        .map(|(_, leader_paxos_port)| port as i32 - leader_paxos_port as i32);
    let global_rows = probe::cluster_global(conn.as_ref()).await.ok()?;
    let node = probe::build_leader_with_peers(&addr, &global_rows, global_port_gap.unwrap_or(-8000)).ok()?;
    let _ = conn.close().await;
    Some((node, global_port_gap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::sql::mock::MockFactory;
    use std::collections::HashMap as Map;

    fn leader_rows() -> Vec<Vec<String>> {
        vec![vec!["10.0.0.1:11306".into(), ROLE_LEADER.into()]]
    }

    #[tokio::test]
    async fn fully_check_elects_leader_from_cluster_global() {
        let mut responses: Map<String, Map<String, Vec<Vec<String>>>> = Map::new();
        let mut leader_resp = Map::new();
        leader_resp.insert(probe::Q_CLUSTER_LOCAL.to_string(), leader_rows());
        leader_resp.insert(
            probe::Q_CLUSTER_GLOBAL.to_string(),
            vec![
                vec![ROLE_LEADER.into(), "10.0.0.1:11306".into()],
                vec!["Follower".into(), "10.0.0.2:11306".into()],
            ],
        );
        leader_resp.insert(
            probe::Q_LEADER_TRANSFER_FLAG.to_string(),
            vec![vec!["consensus_in_leader_transfer".into(), "0".into()]],
        );
        responses.insert("10.0.0.1:3306".to_string(), leader_resp);

        let factory = Arc::new(MockFactory { responses, ..Default::default() });
        let topology = Arc::new(Topology::new_dn());
        let cfg = PolarConfig::new("10.0.0.1:3306");
        let loop_ = DnHealthLoop {
            cfg,
            topology: topology.clone(),
            factory,
            json_path: std::env::temp_dir().join("test-dn-unused.json"),
            logger: Logger::monitor(false),
            stop: Arc::new(Notify::new()),
        };

        let classification = loop_.fully_check().await;
        assert_eq!(classification, DnClassification::LeaderAlive);

        let state = topology.read().await;
        if let ClusterState::Dn(dn) = &*state {
            assert_eq!(dn.leader.as_ref().unwrap().tag, "10.0.0.1:3306");
            assert_eq!(dn.global_port_gap, -8000);
        } else {
            panic!("expected dn state");
        }
    }

    #[tokio::test]
    async fn fully_check_with_no_reachable_addresses_reports_lost() {
        let factory = Arc::new(MockFactory::default());
        let topology = Arc::new(Topology::new_dn());
        let cfg = PolarConfig::new("10.0.0.1:3306");
        let loop_ = DnHealthLoop {
            cfg,
            topology,
            factory,
            json_path: std::env::temp_dir().join("test-dn-unused2.json"),
            logger: Logger::monitor(false),
            stop: Arc::new(Notify::new()),
        };
        assert_eq!(loop_.fully_check().await, DnClassification::LeaderLost);
    }

    #[test]
    fn classification_next_sleep_matches_table() {
        let cfg = PolarConfig::new("x");
        assert_eq!(DnClassification::LeaderTransferred.next_sleep(&cfg), Duration::ZERO);
        assert_eq!(
            DnClassification::LeaderTransferring.next_sleep(&cfg),
            Duration::from_millis(cfg.check_leader_transferring_interval_ms)
        );
    }
}

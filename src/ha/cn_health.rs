//! The CN background health loop (C5).
//!
//! Grounded in `original_source/src/ha_manager.cpp`'s `cn_ha_checker` /
//! `get_mpp_info` (periodic `SHOW MPP` re-query, union-merge by tag) and
//! the same tick-loop shape as [`super::dn_health::DnHealthLoop`].

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

pub struct CnHealthLoop {
    pub cfg: PolarConfig,
    pub topology: Arc<Topology>,
    pub factory: Arc<dyn SqlExecutorFactory>,
    pub json_path: PathBuf,
    pub logger: Logger,
    pub stop: Arc<Notify>,
}

impl CnHealthLoop {
    pub async fn run(self) {
        tracing::info!(addr = %self.cfg.addr, "cn health loop starting");
        loop {
            let alive = self.tick().await;
            tracing::debug!(alive, "cn health loop tick");
            let sleep = if alive {
                Duration::from_millis(self.cfg.ha_check_interval_ms)
            } else {
                Duration::from_millis(500.min(self.cfg.ha_check_interval_ms))
            };
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = self.stop.notified() => {
                    tracing::info!("cn health loop stopping");
                    return;
                }
            }
        }
    }

    async fn tick(&self) -> bool {
        self.seed_addresses().await;
        let addresses = self.topology.addresses().await;
        if addresses.is_empty() {
            self.logger.error("cn tick: no known addresses to probe");
            return false;
        }

        let mut joinset = tokio::task::JoinSet::new();
        for addr in addresses {
            let factory = self.factory.clone();
            let connect_timeout = Duration::from_millis(self.cfg.ha_check_connect_timeout_ms);
            joinset.spawn(async move {
                let props = HashMap::new();
                let conn = factory.connect(&addr, connect_timeout, &props).await.ok()?;
                let mpp = probe::show_mpp(conn.as_ref()).await.ok();
                let _ = conn.close().await;
                mpp
            });
        }

        let mut merged = HashMap::new();
        while let Some(joined) = joinset.join_next().await {
            let Ok(Some(rows)) = joined else { continue };
            for node in rows {
                merged.insert(node.tag.clone(), node);
            }
        }

        if merged.is_empty() {
            self.logger.error("cn tick: all probes failed");
            return false;
        }

        let nodes: Vec<_> = merged.values().cloned().collect();
        if let Err(e) = persistence::save_mpp_topology(&self.json_path, &nodes).await {
            self.logger.error(format!("persisting mpp topology failed: {e}"));
        }

        let mut state = self.topology.write().await;
        if let ClusterState::Cn(cn) = &mut *state {
            cn.nodes = merged;
        }
        drop(state);
        self.topology.notify_change();
        true
    }

    async fn seed_addresses(&self) {
        let mut candidates: Vec<String> = persistence::load_mpp_topology(&self.json_path)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|n| n.tag)
            .collect();
        for addr in util::split_addr_list(&self.cfg.addr) {
            if !candidates.contains(&addr) {
                candidates.push(addr);
            }
        }
        self.topology.seed_addresses_if_empty(candidates).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::sql::mock::MockFactory;
    use std::collections::HashMap as Map;

    #[tokio::test]
    async fn tick_merges_mpp_rows_by_tag() {
        let mut responses: Map<String, Map<String, Vec<Vec<String>>>> = Map::new();
        let mut resp_a = Map::new();
        resp_a.insert(
            probe::Q_SHOW_MPP.to_string(),
            vec![
                vec!["inst1".into(), "10.0.0.1:3307".into(), "W".into(), "Y".into(), "hz1".into()],
                vec!["inst2".into(), "10.0.0.2:3307".into(), "R".into(), "N".into(), "hz1,hz2".into()],
            ],
        );
        responses.insert("10.0.0.1:3307".to_string(), resp_a);

        let factory = Arc::new(MockFactory { responses, ..Default::default() });
        let topology = Arc::new(Topology::new_cn());
        let cfg = PolarConfig::new("10.0.0.1:3307");
        let loop_ = CnHealthLoop {
            cfg,
            topology: topology.clone(),
            factory,
            json_path: std::env::temp_dir().join("test-cn-unused.json"),
            logger: Logger::monitor(false),
            stop: Arc::new(Notify::new()),
        };

        assert!(loop_.tick().await);
        let state = topology.read().await;
        if let ClusterState::Cn(cn) = &*state {
            assert_eq!(cn.nodes.len(), 2);
            assert!(cn.nodes.get("10.0.0.2:3307").unwrap().zone_list.contains(&"hz2".to_string()));
        } else {
            panic!("expected cn state");
        }
    }

    #[tokio::test]
    async fn tick_with_no_addresses_reports_not_alive() {
        let factory = Arc::new(MockFactory::default());
        let topology = Arc::new(Topology::new_cn());
        let cfg = PolarConfig::new("");
        let loop_ = CnHealthLoop {
            cfg,
            topology,
            factory,
            json_path: std::env::temp_dir().join("test-cn-unused2.json"),
            logger: Logger::monitor(false),
            stop: Arc::new(Notify::new()),
        };
        assert!(!loop_.tick().await);
    }
}

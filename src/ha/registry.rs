//! Process-wide cluster-tag → HA Manager singleton map (C7).
//!
//! Grounded in `original_source/src/ha_manager.cpp`'s `get_manager`
//! three-stage bootstrap, and in the lazily-initialized, lock-guarded
//! singleton pattern the reference codebase uses for its own
//! process-global registries.

use super::manager::{bootstrap_probe, HaManager};
use super::persistence::synthesize_json_path;
use super::sql::SqlExecutorFactory;
use super::util;
use crate::config::PolarConfig;
use crate::error::Result;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

static MANAGERS: Lazy<RwLock<HashMap<String, Arc<HaManager>>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// `get_manager` (§4.1): returns the existing manager for this cluster if
/// one was already created in this process, otherwise bootstraps one.
pub async fn get_manager(cfg: PolarConfig, factory: Arc<dyn SqlExecutorFactory>) -> Result<Arc<HaManager>> {
    let provisional_tag = util::cluster_tag(cfg.cluster_id, &cfg.addr);
    if let Some(existing) = MANAGERS.read().await.get(&provisional_tag) {
        return Ok(existing.clone());
    }

    let first_addr = util::split_addr_list(&cfg.addr)
        .into_iter()
        .next()
        .ok_or_else(|| crate::error::DbError::InvalidArgument("empty cluster address list".to_string()))?;

    let connect_timeout = Duration::from_secs(2);
    let basic = bootstrap_probe(factory.as_ref(), &first_addr, connect_timeout).await?;

    let is_dn = !basic.is_cn();
    let use_ipv6 = util::contains_ipv6(&cfg.addr);
    let cluster_id = if cfg.cluster_id >= 0 {
        cfg.cluster_id
    } else if is_dn {
        basic.cluster_id
    } else {
        -1
    };
    let tag = util::cluster_tag(cluster_id, &cfg.addr);

    let mut managers = MANAGERS.write().await;
    if let Some(existing) = managers.get(&tag) {
        return Ok(existing.clone());
    }

    let mut resolved_cfg = cfg.clone();
    resolved_cfg.cluster_id = cluster_id;
    let json_path = resolved_cfg
        .json_file
        .clone()
        .unwrap_or_else(|| synthesize_json_path(cluster_id, &cfg.addr, use_ipv6));
    ensure_file_exists(&json_path).await;

    tracing::info!(tag = %tag, is_dn, "installing new ha manager");
    let manager = HaManager::new(is_dn, use_ipv6, resolved_cfg, json_path, factory);
    manager.start().await;
    managers.insert(tag, manager.clone());
    Ok(manager)
}

async fn ensure_file_exists(path: &std::path::Path) {
    if !path.exists() {
        let _ = tokio::fs::write(path, b"[]").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::probe::Q_BASIC_INFO;
    use super::super::sql::mock::MockFactory;
    use std::collections::HashMap as Map;

    fn dn_factory(addr: &str) -> MockFactory {
        let mut responses: Map<String, Map<String, Vec<Vec<String>>>> = Map::new();
        let mut rows = Map::new();
        rows.insert(Q_BASIC_INFO.to_string(), vec![vec!["8.0.27".into(), "9".into(), "3306".into()]]);
        responses.insert(addr.to_string(), rows);
        MockFactory { responses, ..Default::default() }
    }

    #[tokio::test]
    async fn get_manager_is_singleton_per_cluster_id() {
        let addr = "10.0.0.50:3306";
        let factory: Arc<dyn SqlExecutorFactory> = Arc::new(dn_factory(addr));
        let mut cfg = PolarConfig::new(addr);
        cfg.json_file = Some(std::env::temp_dir().join(format!("registry-test-{}.json", std::process::id())));

        let m1 = get_manager(cfg.clone(), factory.clone()).await.unwrap();
        let m2 = get_manager(cfg, factory).await.unwrap();
        assert!(Arc::ptr_eq(&m1, &m2));
        m1.shutdown().await;
    }
}

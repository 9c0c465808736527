//! Blocking-with-timeout endpoint selection (C6).
//!
//! Grounded in `original_source/src/ha_manager.cpp`'s
//! `get_available_dn_with_wait` / `get_dn_follower` /
//! `get_available_cn_with_wait` / `get_node_with_load_balance`, and in
//! the `LoadBalancer::select_backend` shape of
//! `networking/loadbalancer/mod.rs` for the selection-algorithm dispatch.

use super::probe;
use super::sql::SqlExecutorFactory;
use super::topology::{ClusterState, Topology};
use crate::config::LoadBalanceAlgorithm;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Picks one of `candidates` per `algo`, bumping the connection counter
/// for the winner under the same lock used to read it (§4.7, §9
/// "least-connections" ambiguity note).
pub async fn select(
    topology: &Topology,
    candidates: &[String],
    algo: LoadBalanceAlgorithm,
) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }
    let refs: Vec<&str> = candidates.iter().map(String::as_str).collect();
    let mut counter = topology.conn_counter.write().await;
    let chosen = match algo {
        LoadBalanceAlgorithm::Random => {
            let idx = rand::random::<u32>() as usize % refs.len();
            refs[idx]
        }
        LoadBalanceAlgorithm::LeastConnection => counter.least_loaded(&refs)?,
        LoadBalanceAlgorithm::Fallback => refs[0],
    };
    counter.add(chosen);
    Some(chosen.to_string())
}

/// `get_available_dn_with_wait` (§4.7). `timeout_ms <= 0` means "one
/// attempt, then return regardless" (§5 cancellation rule).
pub async fn get_available_dn_with_wait(
    topology: &Topology,
    factory: &dyn SqlExecutorFactory,
    timeout_ms: i64,
    slave_only: bool,
    apply_delay: i32,
    slave_weight: i32,
    algo: LoadBalanceAlgorithm,
    connect_timeout: Duration,
) -> Option<String> {
    if timeout_ms <= 0 {
        return get_dn_internal(topology, factory, slave_only, apply_delay, slave_weight, algo, connect_timeout).await;
    }

    let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
    loop {
        if let Some(tag) =
            get_dn_internal(topology, factory, slave_only, apply_delay, slave_weight, algo, connect_timeout).await
        {
            return Some(tag);
        }
        let now = Instant::now();
        if now >= deadline {
            return get_dn_internal(topology, factory, slave_only, apply_delay, slave_weight, algo, connect_timeout)
                .await;
        }
        topology.wait_for_change(deadline - now).await;
    }
}

async fn get_dn_internal(
    topology: &Topology,
    factory: &dyn SqlExecutorFactory,
    slave_only: bool,
    apply_delay: i32,
    slave_weight: i32,
    algo: LoadBalanceAlgorithm,
    connect_timeout: Duration,
) -> Option<String> {
    let leader_tag = {
        let state = topology.read().await;
        match &*state {
            ClusterState::Dn(dn) => dn.leader.as_ref().map(|n| n.tag.clone()),
            ClusterState::Cn(_) => None,
        }
    }?;

    if !slave_only {
        return Some(leader_tag);
    }

    let global_port_gap = {
        let state = topology.read().await;
        match &*state {
            ClusterState::Dn(dn) => dn.global_port_gap,
            ClusterState::Cn(_) => -8000,
        }
    };

    let props = HashMap::new();
    let conn = factory.connect(&leader_tag, connect_timeout, &props).await.ok()?;
    let rows = probe::cluster_health(conn.as_ref(), apply_delay, slave_weight).await.ok()?;
    let _ = conn.close().await;

    let candidates: Vec<String> = rows
        .into_iter()
        .filter(|(role, _)| !role.eq_ignore_ascii_case(super::entity::ROLE_LEADER))
        .filter_map(|(_, ip_port)| {
            let (host, paxos_port) = super::util::parse_host_port(&ip_port)?;
            let sql_port = probe::apply_port_gap(paxos_port, global_port_gap)?;
            Some(super::util::merge_host_port(&host, sql_port))
        })
        .collect();

    select(topology, &candidates, algo).await
}

/// `get_available_cn_with_wait` (§4.7).
#[allow(clippy::too_many_arguments)]
pub async fn get_available_cn_with_wait(
    topology: &Topology,
    timeout_ms: i64,
    zone: &str,
    min_zone_nodes: usize,
    backup_zone: &str,
    slave_read: bool,
    instance: &str,
    mpp_role: &str,
    algo: LoadBalanceAlgorithm,
) -> Option<String> {
    if timeout_ms <= 0 {
        return get_cn_internal(topology, zone, min_zone_nodes, backup_zone, slave_read, instance, mpp_role, algo)
            .await;
    }

    let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
    loop {
        if let Some(tag) =
            get_cn_internal(topology, zone, min_zone_nodes, backup_zone, slave_read, instance, mpp_role, algo).await
        {
            return Some(tag);
        }
        let now = Instant::now();
        if now >= deadline {
            return get_cn_internal(topology, zone, min_zone_nodes, backup_zone, slave_read, instance, mpp_role, algo)
                .await;
        }
        topology.wait_for_change(deadline - now).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn get_cn_internal(
    topology: &Topology,
    zone: &str,
    min_zone_nodes: usize,
    backup_zone: &str,
    slave_read: bool,
    instance: &str,
    mpp_role: &str,
    algo: LoadBalanceAlgorithm,
) -> Option<String> {
    let (valid, backup) = {
        let state = topology.read().await;
        let ClusterState::Cn(cn) = &*state else { return None };
        let zone_set: Vec<String> = if zone.is_empty() { Vec::new() } else { vec![zone.to_string()] };
        let backup_set: Vec<String> = if backup_zone.is_empty() { Vec::new() } else { vec![backup_zone.to_string()] };

        let role_ok = |role: &str| -> bool {
            if slave_read {
                !role.eq_ignore_ascii_case(super::entity::MPP_ROLE_WRITER)
                    && !mpp_role.eq_ignore_ascii_case(super::entity::MPP_ROLE_WRITER)
            } else {
                (mpp_role.is_empty() || mpp_role.eq_ignore_ascii_case(super::entity::MPP_ROLE_WRITER))
                    && role.eq_ignore_ascii_case(super::entity::MPP_ROLE_WRITER)
            }
        };

        let candidates: Vec<_> = cn
            .nodes
            .values()
            .filter(|n| n.matches_instance(instance))
            .filter(|n| role_ok(&n.role))
            .collect();

        let valid: Vec<String> = candidates
            .iter()
            .filter(|n| n.in_zone_set(&zone_set))
            .map(|n| n.tag.clone())
            .collect();
        let backup: Vec<String> = candidates
            .iter()
            .filter(|n| n.in_zone_set(&backup_set))
            .map(|n| n.tag.clone())
            .collect();
        (valid, backup)
    };

    if valid.len() >= min_zone_nodes && !valid.is_empty() {
        select(topology, &valid, algo).await
    } else {
        select(topology, &backup, algo).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::entity::MppInfo;

    fn mpp(tag: &str, role: &str, zones: &[&str]) -> MppInfo {
        MppInfo {
            tag: tag.to_string(),
            role: role.to_string(),
            instance_name: "inst".to_string(),
            zone_list: zones.iter().map(|s| s.to_string()).collect(),
            is_leader: role == "W",
        }
    }

    #[tokio::test]
    async fn least_connection_picks_lowest_and_bumps_winner() {
        let topology = Topology::new_dn();
        {
            let mut counter = topology.conn_counter.write().await;
            counter.add("a");
            counter.add("a");
        }
        let candidates = vec!["a".to_string(), "b".to_string()];
        let chosen = select(&topology, &candidates, LoadBalanceAlgorithm::LeastConnection).await;
        assert_eq!(chosen, Some("b".to_string()));
        assert_eq!(topology.conn_counter.read().await.get("b"), 1);
    }

    #[tokio::test]
    async fn zone_fallback_when_insufficient_valid_nodes() {
        let topology = Topology::new_cn();
        {
            let mut state = topology.write().await;
            if let ClusterState::Cn(cn) = &mut *state {
                cn.nodes.insert("a".into(), mpp("a", "W", &["hz2"]));
                cn.nodes.insert("b".into(), mpp("b", "W", &["hz1"]));
                cn.nodes.insert("c".into(), mpp("c", "W", &["hz1"]));
            }
        }
        let chosen = get_cn_internal(&topology, "hz2", 2, "hz1", false, "", "", LoadBalanceAlgorithm::Random).await;
        assert!(matches!(chosen.as_deref(), Some("b") | Some("c")));
    }

    #[tokio::test]
    async fn empty_candidates_returns_none() {
        let topology = Topology::new_dn();
        assert_eq!(select(&topology, &[], LoadBalanceAlgorithm::Random).await, None);
    }
}

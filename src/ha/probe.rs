//! Fixed diagnostic queries against a cluster member (C3).
//!
//! Query text is taken verbatim from `original_source/include/const.hpp`
//! and must not be reworded: it is part of the on-the-wire contract with
//! the server's own audit log (§4.4).

use super::entity::{MppInfo, NodeInfo};
use super::sql::SqlExecutor;
use crate::config::FollowerReadState;
use crate::error::{DbError, Result};
use std::sync::Arc;

const TAG: &str = "/* PolarDB-X-Driver HAMANAGER */";

pub const Q_BASIC_INFO: &str = "/* PolarDB-X-Driver HAMANAGER */ select version(), @@cluster_id, @@port;";
pub const Q_CLUSTER_LOCAL: &str =
    "/* PolarDB-X-Driver HAMANAGER */ select CURRENT_LEADER, ROLE from information_schema.alisql_cluster_local limit 1;";
pub const Q_CLUSTER_GLOBAL: &str =
    "/* PolarDB-X-Driver HAMANAGER */ select ROLE, IP_PORT from information_schema.alisql_cluster_global;";
pub const Q_LEADER_TRANSFER_FLAG: &str =
    "/* PolarDB-X-Driver HAMANAGER */ show global status like 'consensus_in_leader_transfer';";
pub const Q_SHOW_MPP: &str = "/* PolarDB-X-HA-Driver HAMANAGER */ show mpp;";
pub const Q_SET_PING_MODE: &str =
    "/* PolarDB-X-Driver HAMANAGER */ set session ping_mode='IS_LEADER,NOT_IN_LEADER_TRANSFER,NO_CLUSTER_CHANGED';";

/// The three follower-read statements, issued in sequence per state
/// (`polardbx_connection.cpp::enableFollowerRead`). State 0 issues just
/// the first; states 1/2 issue all three, differing only in the final
/// consistent-read flag.
pub const SET_FOLLOWER_READ_TRUE: &str =
    "/* PolarDB-X-Driver HAMANAGER */ set session enable_in_memory_follower_read = true;";
pub const SET_FOLLOWER_READ_FALSE: &str =
    "/* PolarDB-X-Driver HAMANAGER */ set session enable_in_memory_follower_read = false;";
pub const SET_READ_WEIGHT: &str = "/* PolarDB-X-Driver HAMANAGER */ set session FOLLOWER_READ_WEIGHT = 100;";
pub const ENABLE_CONSISTENT_READ_TRUE: &str =
    "/* PolarDB-X-Driver HAMANAGER */ set session ENABLE_CONSISTENT_REPLICA_READ = true;";
pub const ENABLE_CONSISTENT_READ_FALSE: &str =
    "/* PolarDB-X-Driver HAMANAGER */ set session ENABLE_CONSISTENT_REPLICA_READ = false;";

pub fn q_cluster_health(apply_delay: i32, slave_weight: i32) -> String {
    format!(
        "{TAG} select a.Role, a.IP_PORT from information_schema.alisql_cluster_health a \
         join information_schema.alisql_cluster_global b on a.IP_PORT = b.IP_PORT \
         where a.APPLY_RUNNING='Yes' and a.APPLY_DELAY_SECONDS <= {apply_delay} \
         and b.ELECTION_WEIGHT > {slave_weight};"
    )
}

pub fn q_record_dsn(jdbc_url: &str) -> String {
    format!("{TAG} call dbms_conn.comment_connection('{jdbc_url}');")
}

/// The ordered statement sequence for `enableFollowerRead` (§4.4, §6.3).
/// Empty for [`FollowerReadState::NoOp`].
pub fn q_follower_read(state: FollowerReadState) -> &'static [&'static str] {
    match state {
        FollowerReadState::NoOp => &[],
        FollowerReadState::Disabled => &[SET_FOLLOWER_READ_FALSE],
        FollowerReadState::Enabled => &[SET_FOLLOWER_READ_TRUE, SET_READ_WEIGHT, ENABLE_CONSISTENT_READ_FALSE],
        FollowerReadState::EnabledConsistent => {
            &[SET_FOLLOWER_READ_TRUE, SET_READ_WEIGHT, ENABLE_CONSISTENT_READ_TRUE]
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicInfo {
    pub version: String,
    pub cluster_id: i64,
    pub port: u16,
}

impl BasicInfo {
    pub fn is_cn(&self) -> bool {
        self.version.contains("-TDDL-")
    }
}

fn row0(rows: &[Vec<String>]) -> Result<&Vec<String>> {
    rows.first()
        .ok_or_else(|| DbError::Network("empty result set".to_string()))
}

fn col<'a>(row: &'a [String], idx: usize) -> Result<&'a str> {
    row.get(idx)
        .map(String::as_str)
        .ok_or_else(|| DbError::Network(format!("missing column {idx}")))
}

/// Runs the Basic Info probe against a freshly opened connection.
pub async fn basic_info(executor: &dyn SqlExecutor) -> Result<BasicInfo> {
    let rows = executor.query(Q_BASIC_INFO).await?;
    let row = row0(&rows)?;
    let version = col(row, 0)?.to_string();
    let cluster_id = col(row, 1)?.parse().unwrap_or(-1);
    let port = col(row, 2)?
        .parse()
        .map_err(|_| DbError::Network("invalid @@port".to_string()))?;
    Ok(BasicInfo { version, cluster_id, port })
}

/// Result of the Cluster Local probe: the node's own view of the leader
/// tag and its own role.
#[derive(Debug, Clone)]
pub struct ClusterLocal {
    pub current_leader: String,
    pub role: String,
}

pub async fn cluster_local(executor: &dyn SqlExecutor) -> Result<ClusterLocal> {
    let rows = executor.query(Q_CLUSTER_LOCAL).await?;
    let row = row0(&rows)?;
    Ok(ClusterLocal {
        current_leader: col(row, 0)?.to_string(),
        role: col(row, 1)?.to_string(),
    })
}

/// `(role, ip_port)` rows from Cluster Global, run against the leader.
pub async fn cluster_global(executor: &dyn SqlExecutor) -> Result<Vec<(String, String)>> {
    let rows = executor.query(Q_CLUSTER_GLOBAL).await?;
    rows.iter()
        .map(|r| Ok((col(r, 0)?.to_string(), col(r, 1)?.to_string())))
        .collect()
}

pub async fn leader_transfer_flag(executor: &dyn SqlExecutor) -> Result<bool> {
    let rows = executor.query(Q_LEADER_TRANSFER_FLAG).await?;
    let row = row0(&rows)?;
    let value = col(row, 1)?;
    Ok(value == "1" || value.eq_ignore_ascii_case("on"))
}

pub async fn cluster_health(
    executor: &dyn SqlExecutor,
    apply_delay: i32,
    slave_weight: i32,
) -> Result<Vec<(String, String)>> {
    let rows = executor.query(&q_cluster_health(apply_delay, slave_weight)).await?;
    rows.iter()
        .map(|r| Ok((col(r, 0)?.to_string(), col(r, 1)?.to_string())))
        .collect()
}

pub async fn show_mpp(executor: &dyn SqlExecutor) -> Result<Vec<MppInfo>> {
    let rows = executor.query(Q_SHOW_MPP).await?;
    rows.iter()
        .map(|r| {
            let instance_name = col(r, 0)?.to_string();
            let tag = col(r, 1)?.to_string();
            let role = col(r, 2)?.to_string();
            let is_leader = col(r, 3)?.eq_ignore_ascii_case("y") || col(r, 3)? == "1";
            let zone_list = col(r, 4)?
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            Ok(MppInfo { tag, role, instance_name, zone_list, is_leader })
        })
        .collect()
}

pub async fn apply_ping_mode(executor: &dyn SqlExecutor) -> Result<()> {
    executor.execute(Q_SET_PING_MODE).await
}

pub async fn record_jdbc_url(executor: &dyn SqlExecutor, jdbc_url: &str) -> Result<()> {
    executor.execute(&q_record_dsn(jdbc_url)).await
}

pub async fn apply_follower_read(executor: &dyn SqlExecutor, state: FollowerReadState) -> Result<()> {
    for sql in q_follower_read(state) {
        executor.execute(sql).await?;
    }
    Ok(())
}

/// Derives a peer's SQL port from its advertised Paxos port and the
/// cluster's learned `globalPortGap` (§3.1, §4.5).
pub fn apply_port_gap(paxos_port: u16, global_port_gap: i32) -> Option<u16> {
    let sql_port = paxos_port as i32 + global_port_gap;
    u16::try_from(sql_port).ok()
}

/// Builds the synthetic [`NodeInfo`] for a confirmed leader plus its peers
/// from a Cluster Global sweep.
pub fn build_leader_with_peers(
    leader_tag: &str,
    global_rows: &[(String, String)],
    global_port_gap: i32,
) -> Result<NodeInfo> {
    let (host, port) =
        super::util::parse_host_port(leader_tag).ok_or_else(|| DbError::Network(format!("bad tag: {leader_tag}")))?;
    let mut leader = NodeInfo::new(host, port, super::entity::ROLE_LEADER);
    for (role, ip_port) in global_rows {
        if super::util::case_insensitive_eq(role, super::entity::ROLE_LEADER) {
            continue;
        }
        let (peer_host, peer_paxos_port) = match super::util::parse_host_port(ip_port) {
            Some(v) => v,
            None => continue,
        };
        let peer_sql_port = match apply_port_gap(peer_paxos_port, global_port_gap) {
            Some(p) => p,
            None => continue,
        };
        leader.peers.push(NodeInfo::new(peer_host, peer_sql_port, role.clone()));
    }
    Ok(leader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::sql::mock::{MockExecutor};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn exec(rows: HashMap<String, Vec<Vec<String>>>) -> MockExecutor {
        MockExecutor { addr: "x".into(), rows, executed: Mutex::new(Vec::new()) }
    }

    #[tokio::test]
    async fn parses_basic_info_and_detects_cn() {
        let mut rows = HashMap::new();
        rows.insert(
            Q_BASIC_INFO.to_string(),
            vec![vec!["8.0.27-TDDL-5.4.15".into(), "7".into(), "3306".into()]],
        );
        let info = basic_info(&exec(rows)).await.unwrap();
        assert!(info.is_cn());
        assert_eq!(info.cluster_id, 7);
    }

    #[tokio::test]
    async fn parses_leader_transfer_flag() {
        let mut rows = HashMap::new();
        rows.insert(
            Q_LEADER_TRANSFER_FLAG.to_string(),
            vec![vec!["consensus_in_leader_transfer".into(), "1".into()]],
        );
        assert!(leader_transfer_flag(&exec(rows)).await.unwrap());
    }

    #[test]
    fn port_gap_applies_signed_offset() {
        assert_eq!(apply_port_gap(11306, -8000), Some(3306));
    }

    #[test]
    fn queries_carry_the_server_audit_tag() {
        for q in [Q_BASIC_INFO, Q_CLUSTER_LOCAL, Q_CLUSTER_GLOBAL, Q_LEADER_TRANSFER_FLAG, Q_SET_PING_MODE] {
            assert!(q.starts_with("/* PolarDB-X-Driver HAMANAGER */"));
        }
        assert!(Q_SHOW_MPP.starts_with("/* PolarDB-X-HA-Driver HAMANAGER */"));
        assert!(q_cluster_health(3, 1).starts_with("/* PolarDB-X-Driver HAMANAGER */"));
        assert!(q_record_dsn("jdbc:x").starts_with("/* PolarDB-X-Driver HAMANAGER */"));
    }

    #[tokio::test]
    async fn follower_read_disabled_issues_single_statement() {
        let executor = exec(HashMap::new());
        apply_follower_read(&executor, FollowerReadState::Disabled).await.unwrap();
        assert_eq!(executor.executed.lock().unwrap().as_slice(), &[SET_FOLLOWER_READ_FALSE]);
    }

    #[tokio::test]
    async fn follower_read_enabled_issues_three_statements_in_order() {
        let executor = exec(HashMap::new());
        apply_follower_read(&executor, FollowerReadState::Enabled).await.unwrap();
        assert_eq!(
            executor.executed.lock().unwrap().as_slice(),
            &[SET_FOLLOWER_READ_TRUE, SET_READ_WEIGHT, ENABLE_CONSISTENT_READ_FALSE]
        );
    }

    #[tokio::test]
    async fn follower_read_enabled_consistent_sets_consistent_flag_true() {
        let executor = exec(HashMap::new());
        apply_follower_read(&executor, FollowerReadState::EnabledConsistent).await.unwrap();
        assert_eq!(
            executor.executed.lock().unwrap().as_slice(),
            &[SET_FOLLOWER_READ_TRUE, SET_READ_WEIGHT, ENABLE_CONSISTENT_READ_TRUE]
        );
    }

    #[tokio::test]
    async fn follower_read_noop_issues_nothing() {
        let executor = exec(HashMap::new());
        apply_follower_read(&executor, FollowerReadState::NoOp).await.unwrap();
        assert!(executor.executed.lock().unwrap().is_empty());
    }

    #[test]
    fn builds_leader_with_peers_from_global_rows() {
        let rows = vec![
            ("Leader".to_string(), "10.0.0.1:11306".to_string()),
            ("Follower".to_string(), "10.0.0.2:11306".to_string()),
        ];
        let leader = build_leader_with_peers("10.0.0.1:3306", &rows, -8000).unwrap();
        assert_eq!(leader.peers.len(), 1);
        assert_eq!(leader.peers[0].tag, "10.0.0.2:3306");
        assert!(leader.peers[0].peers.is_empty());
    }
}

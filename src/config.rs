//! Typed, already-validated configuration structs.
//!
//! Parsing a raw `key=value` option map into these structs is an
//! out-of-scope, external concern (§1/§6.2 of the design doc): embedders
//! are expected to hand the manager a [`PolarConfig`]/[`ConnectionConfig`]
//! pair that is already type-checked. What lives here is the shape those
//! structs take plus the handful of validations that belong to the
//! manager's own boundary (e.g. the follower-read state, §7
//! `invalid_follower_read_state`).

use crate::error::{DbError, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-cluster tuning, shared by every connection routed to the same
/// cluster (§3.1).
#[derive(Debug, Clone)]
pub struct PolarConfig {
    pub addr: String,
    pub cluster_id: i64,
    pub ha_check_interval_ms: u64,
    pub check_leader_transferring_interval_ms: u64,
    pub leader_transferring_wait_timeout_ms: u64,
    pub ha_check_connect_timeout_ms: u64,
    pub ha_check_socket_timeout_ms: u64,
    pub smooth_switchover: bool,
    pub ignore_vip: Arc<AtomicBool>,
    pub json_file: Option<PathBuf>,
    pub enable_log: bool,
}

impl PolarConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        PolarConfig {
            addr: addr.into(),
            cluster_id: -1,
            ha_check_interval_ms: 5000,
            check_leader_transferring_interval_ms: 100,
            leader_transferring_wait_timeout_ms: 5000,
            ha_check_connect_timeout_ms: 3000,
            ha_check_socket_timeout_ms: 3000,
            smooth_switchover: false,
            ignore_vip: Arc::new(AtomicBool::new(true)),
            json_file: None,
            enable_log: false,
        }
    }

    pub fn ignore_vip(&self) -> bool {
        self.ignore_vip.load(Ordering::Relaxed)
    }

    pub fn set_ignore_vip(&self, value: bool) {
        self.ignore_vip.store(value, Ordering::Relaxed);
    }
}

/// Per-request routing policy (§3.1).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub connect_timeout_ms: u64,
    pub slave_only: bool,
    pub slave_read: bool,
    pub slave_weight_threshold: i32,
    pub apply_delay_threshold: i32,
    pub load_balance_algorithm: LoadBalanceAlgorithm,
    pub zone_name: Option<String>,
    pub min_zone_nodes: usize,
    pub backup_zone_name: Option<String>,
    pub instance_name: String,
    pub mpp_role: String,
    pub enable_follower_read: FollowerReadState,
    pub record_jdbc_url: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            connect_timeout_ms: 5000,
            slave_only: false,
            slave_read: false,
            slave_weight_threshold: 1,
            apply_delay_threshold: 3,
            load_balance_algorithm: LoadBalanceAlgorithm::Random,
            zone_name: None,
            min_zone_nodes: 0,
            backup_zone_name: None,
            instance_name: String::new(),
            mpp_role: String::new(),
            enable_follower_read: FollowerReadState::NoOp,
            record_jdbc_url: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalanceAlgorithm {
    Random,
    LeastConnection,
    Fallback,
}

impl From<&str> for LoadBalanceAlgorithm {
    fn from(s: &str) -> Self {
        match s {
            "random" => LoadBalanceAlgorithm::Random,
            "least_connection" | "least_conn" => LoadBalanceAlgorithm::LeastConnection,
            _ => LoadBalanceAlgorithm::Fallback,
        }
    }
}

/// `enableFollowerRead` (§3.1, §7). −1 means "leave as-is"; the remaining
/// three values are issued as `SET` statements against the chosen
/// connection (§4.4, §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerReadState {
    NoOp,
    Disabled,
    Enabled,
    EnabledConsistent,
}

impl FollowerReadState {
    pub fn from_i32(v: i32) -> Result<Self> {
        match v {
            -1 => Ok(FollowerReadState::NoOp),
            0 => Ok(FollowerReadState::Disabled),
            1 => Ok(FollowerReadState::Enabled),
            2 => Ok(FollowerReadState::EnabledConsistent),
            other => Err(DbError::InvalidArgument(format!(
                "invalid enableFollowerRead state: {other}, expected one of -1,0,1,2"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_follower_read_state() {
        assert!(FollowerReadState::from_i32(3).is_err());
        assert!(FollowerReadState::from_i32(-2).is_err());
    }

    #[test]
    fn accepts_all_documented_follower_read_states() {
        for v in [-1, 0, 1, 2] {
            assert!(FollowerReadState::from_i32(v).is_ok());
        }
    }

    #[test]
    fn load_balance_algorithm_falls_back_on_unknown_string() {
        assert_eq!(LoadBalanceAlgorithm::from("bogus"), LoadBalanceAlgorithm::Fallback);
        assert_eq!(LoadBalanceAlgorithm::from("random"), LoadBalanceAlgorithm::Random);
    }
}

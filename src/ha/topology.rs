//! The shared topology store (C1): single-writer/multi-reader state plus
//! the broadcast "topology changed" signal the selector waits on.
//!
//! Grounded in the locking discipline of
//! `networking/discovery/registry.rs` (`SharedDiscoveryState`,
//! `Arc<RwLock<..>>` guarding a background-refreshed map) generalized to
//! the DN/CN split described in §3/§4.2. The wake primitive is
//! `tokio::sync::Notify::notify_waiters`, the async analogue of the
//! broadcast condition variable in §4.2: it has no memory of missed
//! notifications, so every waiter re-checks the store after waking.

use super::entity::{LeaderTransferMark, MppInfo, NodeInfo};
use super::sql::SqlExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};

#[derive(Default)]
pub struct DnState {
    pub leader: Option<NodeInfo>,
    pub transfer: Option<LeaderTransferMark>,
    pub global_port_gap: i32,
    pub long_connection: Option<Arc<dyn SqlExecutor>>,
}

impl DnState {
    fn new() -> Self {
        DnState { global_port_gap: -8000, ..Default::default() }
    }
}

impl std::fmt::Debug for DnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnState")
            .field("leader", &self.leader)
            .field("transfer", &self.transfer.as_ref().map(|t| t.age()))
            .field("global_port_gap", &self.global_port_gap)
            .field("has_long_connection", &self.long_connection.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct CnState {
    pub nodes: HashMap<String, MppInfo>,
}

#[derive(Debug)]
pub enum ClusterState {
    Dn(DnState),
    Cn(CnState),
}

/// Shared, lock-protected cluster topology plus the per-cluster
/// connection-address seed list and connection counter (§4.2, §5).
pub struct Topology {
    state: RwLock<ClusterState>,
    changed: Notify,
    /// Seeded once from the warm-start file union `cfg.Addr`; per the
    /// design notes this list never grows again once non-empty.
    connection_addresses: RwLock<Vec<String>>,
    pub conn_counter: RwLock<super::conn_counter::ConnCounter>,
}

impl Topology {
    pub fn new_dn() -> Self {
        Topology {
            state: RwLock::new(ClusterState::Dn(DnState::new())),
            changed: Notify::new(),
            connection_addresses: RwLock::new(Vec::new()),
            conn_counter: RwLock::new(super::conn_counter::ConnCounter::new()),
        }
    }

    pub fn new_cn() -> Self {
        Topology {
            state: RwLock::new(ClusterState::Cn(CnState::default())),
            changed: Notify::new(),
            connection_addresses: RwLock::new(Vec::new()),
            conn_counter: RwLock::new(super::conn_counter::ConnCounter::new()),
        }
    }

    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, ClusterState> {
        self.state.read().await
    }

    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, ClusterState> {
        self.state.write().await
    }

    /// Wakes every waiter blocked in [`Topology::wait_for_change`]. Must be
    /// called after every mutation that could make a blocked selector call
    /// succeed.
    pub fn notify_change(&self) {
        self.changed.notify_waiters();
    }

    /// Blocks until either a change is signaled or `timeout` elapses.
    /// Callers must re-check the store regardless of which happened — a
    /// wakeup is not a guarantee that *their* condition became true.
    pub async fn wait_for_change(&self, timeout: Duration) {
        let notified = self.changed.notified();
        let _ = tokio::time::timeout(timeout, notified).await;
    }

    /// Seeds `connection_addresses` the first time it is empty; a no-op on
    /// every subsequent call (see `DESIGN.md`'s grounding note on
    /// `update_connection_addresses`).
    pub async fn seed_addresses_if_empty(&self, candidates: Vec<String>) {
        let mut addrs = self.connection_addresses.write().await;
        if addrs.is_empty() {
            *addrs = candidates;
        }
    }

    pub async fn addresses(&self) -> Vec<String> {
        self.connection_addresses.read().await.clone()
    }
}

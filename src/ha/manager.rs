//! The per-cluster HA Manager tying together the topology store, the
//! background health loop, and the selector (§2, §3.3).
//!
//! Grounded in `original_source/include/ha_manager.h`'s `HaManager` class
//! shape, and in the start/stop/background-task-handle pattern of
//! `networking/discovery/registry.rs`'s `Registry`.

use super::cn_health::CnHealthLoop;
use super::dn_health::DnHealthLoop;
use super::probe::{self, BasicInfo};
use super::selector;
use super::sql::SqlExecutorFactory;
use super::topology::Topology;
use crate::config::{ConnectionConfig, FollowerReadState, PolarConfig};
use crate::error::{DbError, Result};
use crate::logging::Logger;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub struct HaManager {
    pub is_dn: bool,
    pub use_ipv6: bool,
    pub cfg: PolarConfig,
    pub json_path: PathBuf,
    pub topology: Arc<Topology>,
    factory: Arc<dyn SqlExecutorFactory>,
    logger_driver: Logger,
    logger_monitor: Logger,
    stop: Arc<Notify>,
    loop_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl HaManager {
    pub(super) fn new(
        is_dn: bool,
        use_ipv6: bool,
        cfg: PolarConfig,
        json_path: PathBuf,
        factory: Arc<dyn SqlExecutorFactory>,
    ) -> Arc<Self> {
        let topology = if is_dn { Topology::new_dn() } else { Topology::new_cn() };
        let enable_log = cfg.enable_log;
        Arc::new(HaManager {
            is_dn,
            use_ipv6,
            cfg,
            json_path,
            topology: Arc::new(topology),
            factory,
            logger_driver: Logger::driver(enable_log),
            logger_monitor: Logger::monitor(enable_log),
            stop: Arc::new(Notify::new()),
            loop_handle: tokio::sync::Mutex::new(None),
        })
    }

    /// Starts the background health loop. Idempotent: a second call while
    /// a loop is already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut handle_slot = self.loop_handle.lock().await;
        if handle_slot.is_some() {
            return;
        }
        let stop = self.stop.clone();
        let logger = Logger::monitor(self.cfg.enable_log);
        let handle = if self.is_dn {
            let health_loop = DnHealthLoop {
                cfg: self.cfg.clone(),
                topology: self.topology.clone(),
                factory: self.factory.clone(),
                json_path: self.json_path.clone(),
                logger,
                stop,
            };
            tokio::spawn(health_loop.run())
        } else {
            let health_loop = CnHealthLoop {
                cfg: self.cfg.clone(),
                topology: self.topology.clone(),
                factory: self.factory.clone(),
                json_path: self.json_path.clone(),
                logger,
                stop,
            };
            tokio::spawn(health_loop.run())
        };
        *handle_slot = Some(handle);
    }

    /// Signals the background loop to stop and joins it.
    pub async fn shutdown(&self) {
        self.stop.notify_waiters();
        let handle = self.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub async fn get_available_dn_with_wait(&self, conn_cfg: &ConnectionConfig) -> Result<String> {
        let connect_timeout = Duration::from_millis(self.cfg.ha_check_connect_timeout_ms);
        selector::get_available_dn_with_wait(
            &self.topology,
            self.factory.as_ref(),
            conn_cfg.connect_timeout_ms as i64,
            conn_cfg.slave_only,
            conn_cfg.apply_delay_threshold,
            conn_cfg.slave_weight_threshold,
            conn_cfg.load_balance_algorithm,
            connect_timeout,
        )
        .await
        .ok_or_else(|| DbError::Unavailable("no available dn endpoint".to_string()))
    }

    pub async fn get_available_cn_with_wait(&self, conn_cfg: &ConnectionConfig) -> Result<String> {
        selector::get_available_cn_with_wait(
            &self.topology,
            conn_cfg.connect_timeout_ms as i64,
            conn_cfg.zone_name.as_deref().unwrap_or(""),
            conn_cfg.min_zone_nodes,
            conn_cfg.backup_zone_name.as_deref().unwrap_or(""),
            conn_cfg.slave_read,
            &conn_cfg.instance_name,
            &conn_cfg.mpp_role,
            conn_cfg.load_balance_algorithm,
        )
        .await
        .ok_or_else(|| DbError::Unavailable("no available cn endpoint".to_string()))
    }

    pub async fn add_conn_count(&self, tag: &str) {
        self.topology.conn_counter.write().await.add(tag);
    }

    pub async fn drop_conn_count(&self, tag: &str) {
        self.topology.conn_counter.write().await.drop(tag);
    }

    /// Applies `recordJdbcUrl` (§6.3) on the already-connected executor.
    pub async fn record_jdbc_url(&self, executor: &dyn super::sql::SqlExecutor, jdbc_url: &str) -> Result<()> {
        self.logger_driver.debug(format!("recording jdbc url: {jdbc_url}"));
        probe::record_jdbc_url(executor, jdbc_url).await
    }

    /// Applies the follower-read toggle (§6.3, §7 `invalid_follower_read_state`).
    pub async fn apply_follower_read(
        &self,
        executor: &dyn super::sql::SqlExecutor,
        state: FollowerReadState,
    ) -> Result<()> {
        probe::apply_follower_read(executor, state).await
    }
}

/// Runs the bootstrap Basic-Info probe against the first address (§4.1
/// step 2). Used by the registry before a manager exists.
pub async fn bootstrap_probe(
    factory: &dyn SqlExecutorFactory,
    first_addr: &str,
    connect_timeout: Duration,
) -> Result<BasicInfo> {
    let props = HashMap::new();
    let conn = factory.connect(first_addr, connect_timeout, &props).await?;
    let info = probe::basic_info(conn.as_ref()).await;
    let _ = conn.close().await;
    info
}

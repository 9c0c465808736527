//! High-availability client-side router for DN (Paxos replica set) and
//! CN (stateless compute-node pool) clusters.
//!
//! ```rust,ignore
//! let cfg = PolarConfig::new("10.0.0.1:3306,10.0.0.2:3306");
//! let manager = ha::registry::get_manager(cfg, factory).await?;
//! let endpoint = manager.get_available_dn_with_wait(&ConnectionConfig::default()).await?;
//! ```

pub mod cn_health;
pub mod conn_counter;
pub mod dn_health;
pub mod entity;
pub mod manager;
pub mod persistence;
pub mod probe;
pub mod registry;
pub mod selector;
pub mod sql;
pub mod topology;
pub mod util;

pub use manager::HaManager;

//! Client-side high-availability router for Paxos-replicated data-node
//! clusters and stateless compute-node pools.

pub mod config;
pub mod error;
pub mod ha;
pub mod logging;

pub use config::{ConnectionConfig, FollowerReadState, LoadBalanceAlgorithm, PolarConfig};
pub use error::{DbError, Result};
pub use ha::HaManager;

/// Initializes the crate's `tracing` subscriber for library-internal
/// diagnostics (background-loop ticks, lock waits). Distinct from the
/// [`logging::Logger`] driver/monitor channels, which embedders rely on
/// for colorized stdout output; this is ordinary structured logging,
/// wired the way the reference codebase wires its own binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .try_init()
        .ok();
}


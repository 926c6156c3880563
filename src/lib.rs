//! Crowdsim Core - Concurrent Quadtree Crowd Simulation
//!
//! Agents walk a discrete grid and bounce off each other when their moves
//! collide. Collision candidates come from a region quadtree that many
//! worker threads insert into and remove from concurrently, and which is
//! kept current incrementally as agents move.

pub mod core;
pub mod crowd;
pub mod utils;

pub use core::agent::{Agent, AgentId, AgentStore, Cell, Direction};
pub use core::config::{DetectionMode, EdgePolicy, QuadtreeConfig, SimConfig};
pub use core::error::{Result, SimError};
pub use core::scenario::Scenario;
pub use crowd::{Quadtree, RunReport, Simulation, TickReport};
pub use utils::position_stream::{JsonLinesSink, PositionSink};

/// Initialize tracing for the library.
///
/// `level` is an env-filter directive such as `"info"` or
/// `"crowdsim_core=debug"`. Calling this more than once is harmless.
pub fn setup_logging(level: Option<String>) {
    let filter = level.unwrap_or_else(|| "info".to_string());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

//! Crowd Engine
//!
//! Grid crowd simulation backed by a concurrent region quadtree. Agents walk
//! the grid, detect collisions through the index and bounce off each other.

pub mod collision;
pub mod maintainer;
pub mod motion;
pub mod quadtree;
pub mod simulation;
pub mod scenario_test;

pub use quadtree::{Bounds, NodeId, NodeSnapshot, Quadrant, Quadtree};
pub use simulation::{RunReport, Simulation, TickReport};

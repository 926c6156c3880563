use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{Result, SimError};

/// How an agent on a non-corner edge picks a new heading when its current
/// one would leave the grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    /// Turn to face the interior (right edge → West, left → East,
    /// bottom → North, top → South).
    #[default]
    TowardInterior,
    /// Pick uniformly among the directions that stay on the grid.
    UniformLegal,
}

/// Candidate lookup used by collision detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    #[default]
    Quadtree,
    /// Scan every agent. Quadratic; kept as a reference oracle.
    BruteForce,
}

/// Spatial index tunables
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadtreeConfig {
    pub max_agents_per_leaf: usize,
    pub max_depth: u32,
    /// Width of the band around a midline inside which a cell is registered
    /// on both sides. Zero registers only the midline cells themselves.
    pub boundary_tolerance: i32,
}

impl Default for QuadtreeConfig {
    fn default() -> Self {
        QuadtreeConfig {
            max_agents_per_leaf: 4,
            max_depth: 5,
            boundary_tolerance: 0,
        }
    }
}

/// Main run parameters for a crowd simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub ticks: u64,
    pub threads: usize,
    pub seed: u64,
    pub edge_policy: EdgePolicy,
    pub detection: DetectionMode,
    /// Scan collision candidates in ascending identity order so that runs
    /// with the same seed replay exactly.
    pub deterministic_scan: bool,
    pub quadtree: QuadtreeConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            ticks: 100,
            threads: 4,
            seed: 0,
            edge_policy: EdgePolicy::default(),
            detection: DetectionMode::default(),
            deterministic_scan: true,
            quadtree: QuadtreeConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SimError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Rejects settings that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.ticks == 0 {
            return Err(SimError::Config("tick count must be positive".into()));
        }
        if self.threads == 0 {
            return Err(SimError::Config("thread count must be positive".into()));
        }
        if self.quadtree.max_agents_per_leaf == 0 {
            return Err(SimError::Config(
                "max_agents_per_leaf must be positive".into(),
            ));
        }
        if self.quadtree.boundary_tolerance < 0 {
            return Err(SimError::Config(
                "boundary_tolerance must not be negative".into(),
            ));
        }
        Ok(())
    }
}

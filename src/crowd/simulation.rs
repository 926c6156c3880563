//! Simulation Driver
//!
//! Owns the agent store, the quadtree and a fixed-size worker pool, and runs
//! the tick pipeline: propose, detect, resolve, commit, re-index. Every phase
//! runs inside the pool and completes before the next one starts.

use chrono::{DateTime, Utc};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::collision;
use super::maintainer;
use super::quadtree::Quadtree;
use crate::core::agent::{Agent, AgentStore};
use crate::core::config::SimConfig;
use crate::core::error::{Result, SimError};
use crate::core::scenario::Scenario;
use crate::utils::position_stream::PositionSink;

/// Counters for a single tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    /// Agents that found a collider during detection.
    pub collisions: usize,
    pub resolved_pairs: usize,
    pub reindexed: usize,
    pub clamped_moves: usize,
    pub clamped_commits: usize,
}

/// Summary of a full run. Times are in seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub ticks: u64,
    pub agents: usize,
    pub threads: usize,
    pub init_time: f64,
    pub compute_time: f64,
    pub collisions: u64,
    pub resolved_pairs: u64,
    pub reindexed: u64,
    pub clamped_moves: u64,
    pub clamped_commits: u64,
    pub nodes: usize,
}

impl RunReport {
    fn absorb(&mut self, tick: &TickReport) {
        self.ticks += 1;
        self.collisions += tick.collisions as u64;
        self.resolved_pairs += tick.resolved_pairs as u64;
        self.reindexed += tick.reindexed as u64;
        self.clamped_moves += tick.clamped_moves as u64;
        self.clamped_commits += tick.clamped_commits as u64;
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::Stream(e.to_string()))
    }
}

pub struct Simulation {
    config: SimConfig,
    dim_x: i32,
    dim_y: i32,
    store: AgentStore,
    tree: Quadtree,
    pool: ThreadPool,
    tick: u64,
    init_time: Duration,
}

impl Simulation {
    /// Validates `config`, then builds the store, the worker pool and the
    /// index, and registers every agent.
    pub fn new(config: SimConfig, scenario: &Scenario) -> Result<Self> {
        config.validate()?;
        let started = Instant::now();

        info!(
            "[Crowd] Initializing {} agents on a {}x{} grid with {} threads...",
            scenario.agents.len(),
            scenario.dim_x,
            scenario.dim_y,
            config.threads
        );

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("crowd-worker-{}", i))
            .build()
            .map_err(|e| SimError::ThreadPool(e.to_string()))?;

        let store = scenario.to_store();
        let tree = Quadtree::new(scenario.dim_x, scenario.dim_y, config.quadtree.clone())?;
        pool.install(|| maintainer::insert_all(&tree, &store))?;

        let init_time = started.elapsed();
        info!(
            "[Crowd] Index ready: {} nodes in {:.3}s",
            tree.node_count(),
            init_time.as_secs_f64()
        );

        Ok(Simulation {
            config,
            dim_x: scenario.dim_x,
            dim_y: scenario.dim_y,
            store,
            tree,
            pool,
            tick: 0,
            init_time,
        })
    }

    /// Advances the crowd by one tick.
    pub fn step(&mut self) -> Result<TickReport> {
        self.tick += 1;
        let tick = self.tick;
        let (dim_x, dim_y) = (self.dim_x, self.dim_y);
        let config = &self.config;
        let tree = &self.tree;
        let store = &mut self.store;

        let report = self.pool.install(|| -> Result<TickReport> {
            let clamped_moves = collision::propose_all(
                store.as_mut_slice(),
                dim_x,
                dim_y,
                config.edge_policy,
                config.seed,
                tick,
            );
            let colliders = collision::detect_collisions(
                store.as_slice(),
                tree,
                config.detection,
                config.deterministic_scan,
            )?;
            let resolved_pairs = collision::resolve_collisions(store.as_mut_slice(), &colliders, dim_x, dim_y);
            let clamped_commits = collision::commit_moves(store.as_mut_slice(), dim_x, dim_y);
            check_bounds(store.as_slice(), dim_x, dim_y)?;
            let reindexed = maintainer::reindex(tree, store)?;

            Ok(TickReport {
                tick,
                collisions: colliders.iter().filter(|c| c.is_some()).count(),
                resolved_pairs,
                reindexed,
                clamped_moves,
                clamped_commits,
            })
        })?;

        debug!(
            "[Crowd] Tick {}: {} colliding, {} pairs resolved, {} re-indexed",
            report.tick, report.collisions, report.resolved_pairs, report.reindexed
        );
        Ok(report)
    }

    /// Runs the configured number of ticks.
    pub fn run(&mut self) -> Result<RunReport> {
        self.run_inner(None)
    }

    /// Runs the configured number of ticks, handing positions to `sink` after
    /// every commit.
    pub fn run_with_sink(&mut self, sink: &mut dyn PositionSink) -> Result<RunReport> {
        self.run_inner(Some(sink))
    }

    fn run_inner(&mut self, mut sink: Option<&mut dyn PositionSink>) -> Result<RunReport> {
        let mut report = RunReport {
            started_at: Utc::now(),
            ticks: 0,
            agents: self.store.len(),
            threads: self.config.threads,
            init_time: self.init_time.as_secs_f64(),
            compute_time: 0.0,
            collisions: 0,
            resolved_pairs: 0,
            reindexed: 0,
            clamped_moves: 0,
            clamped_commits: 0,
            nodes: 0,
        };

        info!(
            "[Crowd] Running {} ticks for {} agents",
            self.config.ticks,
            self.store.len()
        );
        let started = Instant::now();
        for _ in 0..self.config.ticks {
            let tick = self.step()?;
            report.absorb(&tick);
            if let Some(sink) = sink.as_deref_mut() {
                sink.record(self.tick, self.store.as_slice())?;
            }
        }
        if let Some(sink) = sink.as_deref_mut() {
            sink.finish()?;
        }
        report.compute_time = started.elapsed().as_secs_f64();
        report.nodes = self.tree.node_count();

        if report.clamped_moves > 0 || report.clamped_commits > 0 {
            warn!(
                "[Crowd] {} proposals and {} commits were clamped back into the grid",
                report.clamped_moves, report.clamped_commits
            );
        }
        info!(
            "[Crowd] Finished {} ticks in {:.3}s ({} collisions, {} pairs resolved)",
            report.ticks, report.compute_time, report.collisions, report.resolved_pairs
        );
        Ok(report)
    }

    /// Drops the index and registers every agent again from its current
    /// position.
    pub fn reset_index(&mut self) -> Result<()> {
        self.tree.reset();
        let tree = &self.tree;
        let store = &self.store;
        self.pool.install(|| maintainer::insert_all(tree, store))
    }

    pub fn agents(&self) -> &[Agent] {
        self.store.as_slice()
    }

    pub fn quadtree(&self) -> &Quadtree {
        &self.tree
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn dims(&self) -> (i32, i32) {
        (self.dim_x, self.dim_y)
    }

    pub fn init_time(&self) -> Duration {
        self.init_time
    }
}

fn check_bounds(agents: &[Agent], dim_x: i32, dim_y: i32) -> Result<()> {
    match agents.iter().find(|a| !a.position.in_grid(dim_x, dim_y)) {
        Some(a) => Err(SimError::OutOfBounds {
            x: a.position.x,
            y: a.position.y,
            dim_x,
            dim_y,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::{Cell, Direction};

    fn config(ticks: u64, threads: usize) -> SimConfig {
        SimConfig {
            ticks,
            threads,
            ..SimConfig::default()
        }
    }

    #[test]
    fn invalid_config_fails_before_any_state() {
        let err = Simulation::new(config(0, 2), &Scenario::new(4, 4)).err();
        assert!(matches!(err, Some(SimError::Config(_))));
        let err = Simulation::new(config(5, 0), &Scenario::new(4, 4)).err();
        assert!(matches!(err, Some(SimError::Config(_))));
    }

    #[test]
    fn run_counts_every_tick() {
        let scenario = Scenario::random(20, 20, 80, 3);
        let mut sim = Simulation::new(config(12, 2), &scenario).unwrap();
        let report = sim.run().unwrap();
        assert_eq!(report.ticks, 12);
        assert_eq!(sim.tick(), 12);
        assert_eq!(report.agents, 80);
        assert_eq!(report.nodes, sim.quadtree().node_count());
        assert!(report.to_json().unwrap().contains("\"compute_time\""));
    }

    #[test]
    fn sink_sees_every_committed_tick() {
        let scenario = Scenario::new(6, 6)
            .with_agent(1, 1, Direction::East)
            .with_agent(4, 4, Direction::North);
        let mut sim = Simulation::new(config(5, 1), &scenario).unwrap();
        let mut history: Vec<Vec<Cell>> = Vec::new();
        sim.run_with_sink(&mut history).unwrap();
        assert_eq!(history.len(), 5);
        let last: Vec<Cell> = sim.agents().iter().map(|a| a.position).collect();
        assert_eq!(history[4], last);
    }

    #[test]
    fn reset_index_rebuilds_from_current_positions() {
        let scenario = Scenario::random(30, 30, 150, 8);
        let mut sim = Simulation::new(config(10, 2), &scenario).unwrap();
        sim.run().unwrap();
        sim.reset_index().unwrap();
        for agent in sim.agents() {
            assert_eq!(
                sim.quadtree().leaves_of(agent.id),
                sim.quadtree().leaf_ids_for(agent.position).unwrap()
            );
        }
    }
}

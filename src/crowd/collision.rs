//! Collision Protocol
//!
//! The four per-tick phases. Each one is data-parallel over agents and runs to
//! completion before the next starts, which is the only barrier the protocol
//! needs:
//!
//! 1. propose: every agent picks its next cell
//! 2. detect: look up the leaves around that cell and record one collider
//! 3. resolve: reverse both members of each colliding pair
//! 4. commit: positions take their proposed values

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use super::motion::{agent_rng, propose_move, step_or_stay};
use super::quadtree::Quadtree;
use crate::core::agent::{Agent, AgentId};
use crate::core::config::{DetectionMode, EdgePolicy};
use crate::core::error::{Result, SimError};

/// Phase 1. Returns the number of proposals that had to be clamped.
pub fn propose_all(
    agents: &mut [Agent],
    dim_x: i32,
    dim_y: i32,
    policy: EdgePolicy,
    seed: u64,
    tick: u64,
) -> usize {
    agents
        .par_iter_mut()
        .map(|agent| {
            let mut rng = agent_rng(seed, tick, agent.id);
            let proposal = propose_move(agent.position, agent.direction, dim_x, dim_y, policy, &mut rng);
            agent.next = proposal.next;
            agent.direction = proposal.direction;
            if proposal.clamped {
                warn!(
                    "[Crowd] Agent {} at ({}, {}) heading {:?} would leave the grid; holding position",
                    agent.id, agent.position.x, agent.position.y, proposal.direction
                );
                1
            } else {
                0
            }
        })
        .sum()
}

#[inline]
fn collides(me: &Agent, other: &Agent) -> bool {
    other.id != me.id && (other.position == me.next || other.next == me.next)
}

fn quadtree_collider(
    agents: &[Agent],
    tree: &Quadtree,
    me: &Agent,
    deterministic: bool,
) -> Result<Option<AgentId>> {
    let leaves = tree.leaf_ids_for(me.next)?;
    let lookup = |id: AgentId| {
        agents.get(id as usize).ok_or_else(|| {
            SimError::IndexConsistency(format!("leaf holds unknown agent {}", id))
        })
    };

    if deterministic {
        let mut candidates: Vec<AgentId> = leaves.iter().flat_map(|&leaf| tree.agents_at(leaf)).collect();
        candidates.sort_unstable();
        candidates.dedup();
        for id in candidates {
            if collides(me, lookup(id)?) {
                return Ok(Some(id));
            }
        }
    } else {
        for leaf in leaves {
            for id in tree.agents_at(leaf) {
                if collides(me, lookup(id)?) {
                    return Ok(Some(id));
                }
            }
        }
    }
    Ok(None)
}

fn brute_force_collider(agents: &[Agent], me: &Agent) -> Option<AgentId> {
    agents.iter().find(|other| collides(me, other)).map(|other| other.id)
}

/// Phase 2. Slot `i` holds the agent that agent `i` would run into: one
/// standing on its proposed cell, or one proposing the same cell. Each slot
/// is written only by the task handling that agent.
pub fn detect_collisions(
    agents: &[Agent],
    tree: &Quadtree,
    mode: DetectionMode,
    deterministic: bool,
) -> Result<Vec<Option<AgentId>>> {
    let mut colliders = vec![None; agents.len()];
    colliders
        .par_iter_mut()
        .zip(agents.par_iter())
        .try_for_each(|(slot, me)| -> Result<()> {
            *slot = match mode {
                DetectionMode::Quadtree => quadtree_collider(agents, tree, me, deterministic)?,
                DetectionMode::BruteForce => brute_force_collider(agents, me),
            };
            Ok(())
        })?;
    Ok(colliders)
}

/// Phase 3. A pair `(i, j)` is handled only from the lower identity, when
/// `colliders[i] == Some(j)` and `j > i`. Everyone in at least one handled
/// pair reverses once and steps back along the new heading, staying put at
/// a wall. Returns the number of pairs handled.
pub fn resolve_collisions(
    agents: &mut [Agent],
    colliders: &[Option<AgentId>],
    dim_x: i32,
    dim_y: i32,
) -> usize {
    let reverse: Vec<AtomicBool> = (0..agents.len()).map(|_| AtomicBool::new(false)).collect();

    let pairs = colliders
        .par_iter()
        .enumerate()
        .map(|(i, collider)| match *collider {
            Some(j) if j as usize > i && (j as usize) < reverse.len() => {
                reverse[i].store(true, Ordering::Relaxed);
                reverse[j as usize].store(true, Ordering::Relaxed);
                1
            }
            _ => 0,
        })
        .sum();

    agents
        .par_iter_mut()
        .zip(reverse.par_iter())
        .for_each(|(agent, flag)| {
            if flag.load(Ordering::Relaxed) {
                agent.direction = agent.direction.reverse();
                agent.next = step_or_stay(agent.position, agent.direction, dim_x, dim_y);
            }
        });

    pairs
}

/// Phase 4. Returns how many positions had to be clamped back into the grid.
pub fn commit_moves(agents: &mut [Agent], dim_x: i32, dim_y: i32) -> usize {
    agents
        .par_iter_mut()
        .map(|agent| {
            let clamped = if agent.next.in_grid(dim_x, dim_y) {
                0
            } else {
                let fixed = agent.next.clamped(dim_x, dim_y);
                warn!(
                    "[Crowd] Agent {} committed to ({}, {}) outside the grid; clamped to ({}, {})",
                    agent.id, agent.next.x, agent.next.y, fixed.x, fixed.y
                );
                agent.next = fixed;
                1
            };
            agent.position = agent.next;
            clamped
        })
        .sum()
}

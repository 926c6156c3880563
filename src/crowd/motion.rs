//! Motion Policy
//!
//! Maps an agent's cell and heading to a proposed next cell. Agents walk
//! straight through the interior, pick a random legal heading in corners and
//! turn away from the wall on other edge cells.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::core::agent::{AgentId, Cell, Direction};
use crate::core::config::EdgePolicy;

/// Outcome of one motion decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub next: Cell,
    pub direction: Direction,
    /// The move had to be pulled back onto the current cell.
    pub clamped: bool,
}

/// Deterministic per-agent random source for one tick.
///
/// Seeding from `(seed, tick, agent)` keeps proposals reproducible no matter
/// which worker thread handles the agent.
pub fn agent_rng(seed: u64, tick: u64, agent: AgentId) -> StdRng {
    // SplitMix64 finaliser over the packed triple.
    let mut z = seed
        ^ tick.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (agent as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    StdRng::seed_from_u64(z ^ (z >> 31))
}

fn legal_directions(cell: Cell, dim_x: i32, dim_y: i32) -> Vec<Direction> {
    Direction::ALL
        .into_iter()
        .filter(|&d| cell.step(d).in_grid(dim_x, dim_y))
        .collect()
}

fn is_corner(cell: Cell, dim_x: i32, dim_y: i32) -> bool {
    (cell.x == 0 || cell.x == dim_x - 1) && (cell.y == 0 || cell.y == dim_y - 1)
}

/// Heading pointing away from the wall an edge cell sits on.
fn toward_interior(cell: Cell, dim_x: i32, dim_y: i32, current: Direction) -> Direction {
    if cell.x == dim_x - 1 && dim_x > 1 {
        Direction::West
    } else if cell.x == 0 && dim_x > 1 {
        Direction::East
    } else if cell.y == dim_y - 1 && dim_y > 1 {
        Direction::North
    } else if cell.y == 0 && dim_y > 1 {
        Direction::South
    } else {
        // One cell wide: only travel along the strip is possible.
        legal_directions(cell, dim_x, dim_y)
            .first()
            .copied()
            .unwrap_or(current)
    }
}

/// Proposes the next cell for an agent at `cell` heading `direction`.
///
/// Never returns a cell outside the grid. If the chosen heading would still
/// leave it, the proposal stays on `cell` and is flagged `clamped`.
pub fn propose_move<R: rand::Rng + ?Sized>(
    cell: Cell,
    direction: Direction,
    dim_x: i32,
    dim_y: i32,
    policy: EdgePolicy,
    rng: &mut R,
) -> Proposal {
    let heading = if is_corner(cell, dim_x, dim_y) {
        let legal = legal_directions(cell, dim_x, dim_y);
        match legal.choose(rng) {
            Some(&d) => d,
            // 1x1 grid: nowhere to go.
            None => {
                return Proposal {
                    next: cell,
                    direction,
                    clamped: false,
                }
            }
        }
    } else if !cell.step(direction).in_grid(dim_x, dim_y) {
        match policy {
            EdgePolicy::TowardInterior => toward_interior(cell, dim_x, dim_y, direction),
            EdgePolicy::UniformLegal => legal_directions(cell, dim_x, dim_y)
                .choose(rng)
                .copied()
                .unwrap_or(direction),
        }
    } else {
        direction
    };

    let next = cell.step(heading);
    if next.in_grid(dim_x, dim_y) {
        Proposal {
            next,
            direction: heading,
            clamped: false,
        }
    } else {
        Proposal {
            next: cell,
            direction: heading,
            clamped: true,
        }
    }
}

/// Step one cell along `direction`, staying put if that leaves the grid.
/// Used after a collision reversal, where staying put is the expected outcome
/// at a wall rather than a fault.
pub fn step_or_stay(cell: Cell, direction: Direction, dim_x: i32, dim_y: i32) -> Cell {
    let next = cell.step(direction);
    if next.in_grid(dim_x, dim_y) {
        next
    } else {
        cell
    }
}

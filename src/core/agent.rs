//! Agent records and the dense agent store.

use serde::{Deserialize, Serialize};

/// Stable agent identity. Dense, assigned in load order, never reused.
pub type AgentId = u32;

/// A grid cell. `y = 0` is the top row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Cell { x, y }
    }

    /// The neighbouring cell one step in `direction`, unchecked.
    #[inline]
    pub fn step(self, direction: Direction) -> Cell {
        let (dx, dy) = direction.delta();
        Cell::new(self.x + dx, self.y + dy)
    }

    #[inline]
    pub fn in_grid(self, dim_x: i32, dim_y: i32) -> bool {
        self.x >= 0 && self.y >= 0 && self.x < dim_x && self.y < dim_y
    }

    /// Nearest cell inside the grid.
    pub fn clamped(self, dim_x: i32, dim_y: i32) -> Cell {
        Cell::new(self.x.clamp(0, dim_x - 1), self.y.clamp(0, dim_y - 1))
    }
}

impl From<(i32, i32)> for Cell {
    fn from((x, y): (i32, i32)) -> Self {
        Cell::new(x, y)
    }
}

/// Travel direction. Discriminants match the scenario file encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn from_code(code: i64) -> Option<Direction> {
        match code {
            0 => Some(Direction::North),
            1 => Some(Direction::East),
            2 => Some(Direction::South),
            3 => Some(Direction::West),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn reverse(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::East => Direction::West,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
        }
    }

    #[inline]
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }
}

/// A single simulated agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub position: Cell,
    pub direction: Direction,
    /// Proposed position for the tick in flight. Equals `position` between ticks.
    pub next: Cell,
}

impl Agent {
    pub fn new(id: AgentId, position: Cell, direction: Direction) -> Self {
        Agent {
            id,
            position,
            direction,
            next: position,
        }
    }
}

/// Read access to agent positions, as needed by the spatial index.
pub trait Locate: Sync {
    fn locate(&self, agent: AgentId) -> Option<Cell>;
}

impl Locate for [Cell] {
    fn locate(&self, agent: AgentId) -> Option<Cell> {
        self.get(agent as usize).copied()
    }
}

impl Locate for Vec<Cell> {
    fn locate(&self, agent: AgentId) -> Option<Cell> {
        self.as_slice().locate(agent)
    }
}

/// Dense, index-stable agent collection. `agents[i].id == i` always holds.
#[derive(Clone, Debug, Default)]
pub struct AgentStore {
    agents: Vec<Agent>,
}

impl AgentStore {
    pub fn new() -> Self {
        AgentStore { agents: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        AgentStore {
            agents: Vec::with_capacity(capacity),
        }
    }

    /// Appends an agent and returns its freshly assigned identity.
    pub fn push(&mut self, position: Cell, direction: Direction) -> AgentId {
        let id = self.agents.len() as AgentId;
        self.agents.push(Agent::new(id, position, direction));
        id
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id as usize)
    }

    pub fn as_slice(&self) -> &[Agent] {
        &self.agents
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = AgentId> {
        0..self.agents.len() as AgentId
    }
}

impl Locate for AgentStore {
    fn locate(&self, agent: AgentId) -> Option<Cell> {
        self.get(agent).map(|a| a.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut store = AgentStore::new();
        assert_eq!(store.push(Cell::new(1, 1), Direction::East), 0);
        assert_eq!(store.push(Cell::new(2, 3), Direction::West), 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1).map(|a| a.position), Some(Cell::new(2, 3)));
        assert_eq!(store.get(1).map(|a| a.next), Some(Cell::new(2, 3)));
        assert_eq!(store.locate(2), None);
    }

    #[test]
    fn reverse_is_an_involution() {
        for dir in Direction::ALL {
            assert_eq!(dir.reverse().reverse(), dir);
            let (dx, dy) = dir.delta();
            let (rx, ry) = dir.reverse().delta();
            assert_eq!((dx + rx, dy + ry), (0, 0));
        }
    }

    #[test]
    fn direction_codes_round_trip() {
        for dir in Direction::ALL {
            assert_eq!(Direction::from_code(dir.code() as i64), Some(dir));
        }
        assert_eq!(Direction::from_code(4), None);
        assert_eq!(Direction::from_code(-1), None);
    }

    #[test]
    fn clamping_pulls_cells_into_grid() {
        assert_eq!(Cell::new(-1, 7).clamped(5, 5), Cell::new(0, 4));
        assert!(Cell::new(4, 4).in_grid(5, 5));
        assert!(!Cell::new(5, 0).in_grid(5, 5));
    }
}

//! Scenario Input
//!
//! Loads the initial grid and agent list. The format is a stream of
//! whitespace-separated integers: `dim_x dim_y count`, followed by `count`
//! records of `x y direction` with directions encoded 0..=3 as N/E/S/W.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::info;

use super::agent::{AgentId, AgentStore, Cell, Direction};
use super::error::{Result, SimError};

/// Initial state of a run: grid dimensions plus agents in identity order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scenario {
    pub dim_x: i32,
    pub dim_y: i32,
    pub agents: Vec<(Cell, Direction)>,
}

impl Scenario {
    pub fn new(dim_x: i32, dim_y: i32) -> Self {
        Scenario {
            dim_x,
            dim_y,
            agents: Vec::new(),
        }
    }

    /// Builder-style helper used heavily by tests.
    pub fn with_agent(mut self, x: i32, y: i32, direction: Direction) -> Self {
        self.agents.push((Cell::new(x, y), direction));
        self
    }

    pub fn parse(input: &str) -> Result<Self> {
        let mut tokens = input.split_whitespace();
        let mut next_int = |record: usize, what: &str| -> Result<i64> {
            let token = tokens
                .next()
                .ok_or_else(|| SimError::parse(record, format!("missing {}", what)))?;
            token
                .parse::<i64>()
                .map_err(|_| SimError::parse(record, format!("{} is not an integer: {:?}", what, token)))
        };

        let dim_x = next_int(0, "grid width")?;
        let dim_y = next_int(0, "grid height")?;
        let count = next_int(0, "agent count")?;
        if dim_x <= 0 || dim_y <= 0 || dim_x > i32::MAX as i64 || dim_y > i32::MAX as i64 {
            return Err(SimError::parse(
                0,
                format!("grid dimensions must be positive, got {}x{}", dim_x, dim_y),
            ));
        }
        if count < 0 {
            return Err(SimError::parse(0, format!("negative agent count {}", count)));
        }
        if count > AgentId::MAX as i64 {
            return Err(SimError::parse(
                0,
                format!("agent count {} exceeds the identity range", count),
            ));
        }

        // The header count is untrusted; capacity grows with the records.
        let mut scenario = Scenario::new(dim_x as i32, dim_y as i32);
        for record in 1..=count as usize {
            let x = next_int(record, "x")?;
            let y = next_int(record, "y")?;
            let code = next_int(record, "direction")?;
            let direction = Direction::from_code(code)
                .ok_or_else(|| SimError::parse(record, format!("invalid direction code {}", code)))?;
            if x < 0 || y < 0 || x >= dim_x || y >= dim_y {
                return Err(SimError::parse(
                    record,
                    format!("position ({}, {}) outside {}x{} grid", x, y, dim_x, dim_y),
                ));
            }
            scenario.agents.push((Cell::new(x as i32, y as i32), direction));
        }
        Ok(scenario)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let scenario = Self::parse(&raw)?;
        info!(
            "[Scenario] Loaded {} agents on a {}x{} grid from {}",
            scenario.agents.len(),
            scenario.dim_x,
            scenario.dim_y,
            path.display()
        );
        Ok(scenario)
    }

    /// Agents at uniformly random cells with random headings.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is not positive.
    pub fn random(dim_x: i32, dim_y: i32, count: usize, seed: u64) -> Self {
        debug_assert!(
            dim_x > 0 && dim_y > 0,
            "random scenario needs a non-empty grid, got {}x{}",
            dim_x,
            dim_y
        );
        let mut rng = StdRng::seed_from_u64(seed);
        let mut scenario = Scenario::new(dim_x, dim_y);
        scenario.agents = (0..count)
            .map(|_| {
                let cell = Cell::new(rng.gen_range(0..dim_x), rng.gen_range(0..dim_y));
                (cell, Direction::ALL[rng.gen_range(0..4)])
            })
            .collect();
        scenario
    }

    /// Builds the agent store, assigning identities in record order.
    pub fn to_store(&self) -> AgentStore {
        let mut store = AgentStore::with_capacity(self.agents.len());
        for &(cell, direction) in &self.agents {
            store.push(cell, direction);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_header_and_records() {
        let scenario = Scenario::parse("10 8 2\n0 0 1\n9 7 3\n").unwrap();
        assert_eq!((scenario.dim_x, scenario.dim_y), (10, 8));
        assert_eq!(
            scenario.agents,
            vec![
                (Cell::new(0, 0), Direction::East),
                (Cell::new(9, 7), Direction::West)
            ]
        );
    }

    #[test]
    fn missing_records_are_reported_with_position() {
        match Scenario::parse("4 4 2\n0 0 1\n1 1") {
            Err(SimError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn bad_direction_and_out_of_grid_rejected() {
        assert!(matches!(
            Scenario::parse("4 4 1 0 0 7"),
            Err(SimError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            Scenario::parse("4 4 1 4 0 1"),
            Err(SimError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            Scenario::parse("0 4 0"),
            Err(SimError::Parse { line: 0, .. })
        ));
    }

    #[test]
    fn oversized_agent_count_is_rejected_before_reading_records() {
        assert!(matches!(
            Scenario::parse("4 4 1000000000000000000\n0 0 1"),
            Err(SimError::Parse { line: 0, .. })
        ));
        assert!(matches!(
            Scenario::parse("4 4 4294967296"),
            Err(SimError::Parse { line: 0, .. })
        ));
        // Within range but far more than the file holds.
        assert!(matches!(
            Scenario::parse("4 4 4000000000\n0 0 1"),
            Err(SimError::Parse { line: 2, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "non-empty grid")]
    fn random_rejects_empty_grid() {
        Scenario::random(0, 5, 3, 1);
    }

    #[test]
    fn load_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "3 3 1").unwrap();
        writeln!(file, "1 1 2").unwrap();
        let scenario = Scenario::load(file.path()).unwrap();
        assert_eq!(scenario.agents, vec![(Cell::new(1, 1), Direction::South)]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Scenario::load(dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, SimError::Io { .. }));
    }

    #[test]
    fn random_scenarios_are_reproducible_and_in_grid() {
        let a = Scenario::random(20, 30, 200, 9);
        let b = Scenario::random(20, 30, 200, 9);
        assert_eq!(a, b);
        assert!(a.agents.iter().all(|(c, _)| c.in_grid(20, 30)));
        let store = a.to_store();
        assert_eq!(store.len(), 200);
        assert!(store.iter().enumerate().all(|(i, agent)| agent.id as usize == i));
    }
}

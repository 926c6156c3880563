//! Position Stream
//!
//! Per-tick agent positions for an external renderer. The JSON-lines sink
//! writes one frame per line: `{"tick":3,"positions":[[x,y],...]}` with
//! positions in agent identity order.

use serde::Serialize;
use std::io::Write;

use crate::core::agent::{Agent, Cell};
use crate::core::error::{Result, SimError};

/// Receives agent positions after every committed tick.
pub trait PositionSink {
    fn record(&mut self, tick: u64, agents: &[Agent]) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct Frame {
    tick: u64,
    positions: Vec<[i32; 2]>,
}

/// Streams frames as newline-delimited JSON.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    frames: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink { writer, frames: 0 }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PositionSink for JsonLinesSink<W> {
    fn record(&mut self, tick: u64, agents: &[Agent]) -> Result<()> {
        let frame = Frame {
            tick,
            positions: agents.iter().map(|a| [a.position.x, a.position.y]).collect(),
        };
        serde_json::to_writer(&mut self.writer, &frame).map_err(|e| SimError::Stream(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| SimError::Stream(e.to_string()))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| SimError::Stream(e.to_string()))
    }
}

/// In-memory history, one position vector per tick.
impl PositionSink for Vec<Vec<Cell>> {
    fn record(&mut self, _tick: u64, agents: &[Agent]) -> Result<()> {
        self.push(agents.iter().map(|a| a.position).collect());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::Direction;

    #[test]
    fn writes_one_json_object_per_tick() {
        let agents = vec![
            Agent::new(0, Cell::new(1, 2), Direction::East),
            Agent::new(1, Cell::new(3, 4), Direction::West),
        ];
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.record(1, &agents).unwrap();
        sink.record(2, &agents).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.frames(), 2);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let frame: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(frame["tick"], 2);
        assert_eq!(frame["positions"], serde_json::json!([[1, 2], [3, 4]]));
    }

    #[test]
    fn memory_sink_keeps_history() {
        let agents = vec![Agent::new(0, Cell::new(0, 0), Direction::South)];
        let mut history: Vec<Vec<Cell>> = Vec::new();
        history.record(1, &agents).unwrap();
        assert_eq!(history, vec![vec![Cell::new(0, 0)]]);
    }
}

//! Index Maintainer
//!
//! Keeps the quadtree in step with committed positions without rebuilding it.
//! Only agents whose covering leaves changed are re-registered; in a slow
//! crowd that is a small fraction per tick.

use rayon::prelude::*;
use tracing::debug;

use super::quadtree::Quadtree;
use crate::core::agent::{AgentId, AgentStore};
use crate::core::error::Result;

/// Agents whose current cell maps to a different leaf set than the one they
/// are registered in.
pub fn stale_agents(tree: &Quadtree, store: &AgentStore) -> Result<Vec<AgentId>> {
    store
        .as_slice()
        .par_iter()
        .filter_map(|agent| match tree.leaf_ids_for(agent.position) {
            Ok(leaves) if leaves == tree.leaves_of(agent.id) => None,
            Ok(_) => Some(Ok(agent.id)),
            Err(e) => Some(Err(e)),
        })
        .collect()
}

/// Re-registers every stale agent. Returns how many were moved.
///
/// Removal and insertion run as separate parallel passes so no removal can
/// overlap a split that is displacing the same agent.
pub fn reindex(tree: &Quadtree, store: &AgentStore) -> Result<usize> {
    let stale = stale_agents(tree, store)?;
    if stale.is_empty() {
        return Ok(0);
    }

    stale.par_iter().for_each(|&id| {
        tree.remove(id);
    });
    stale.par_iter().try_for_each(|&id| tree.insert(id, store))?;

    debug!(
        "[Maintainer] Re-registered {} of {} agents ({} nodes)",
        stale.len(),
        store.len(),
        tree.node_count()
    );
    Ok(stale.len())
}

/// Registers every agent from scratch.
pub fn insert_all(tree: &Quadtree, store: &AgentStore) -> Result<()> {
    (0..store.len() as AgentId)
        .into_par_iter()
        .try_for_each(|id| tree.insert(id, store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::{Cell, Direction};
    use crate::core::config::QuadtreeConfig;
    use crate::core::scenario::Scenario;

    fn tree_for(store: &AgentStore, dim: i32) -> Quadtree {
        let tree = Quadtree::new(dim, dim, QuadtreeConfig::default()).unwrap();
        insert_all(&tree, store).unwrap();
        tree
    }

    fn move_agent(store: &mut AgentStore, id: AgentId, to: Cell) {
        let agent = &mut store.as_mut_slice()[id as usize];
        agent.position = to;
        agent.next = to;
    }

    #[test]
    fn unchanged_leaf_sets_are_skipped() {
        let mut store = Scenario::new(16, 16)
            .with_agent(1, 1, Direction::East)
            .with_agent(12, 12, Direction::West)
            .to_store();
        let tree = tree_for(&store, 16);
        // Still inside the single root leaf.
        move_agent(&mut store, 0, Cell::new(2, 1));
        assert_eq!(reindex(&tree, &store).unwrap(), 0);
    }

    #[test]
    fn movers_across_leaves_are_reregistered() {
        let mut store = Scenario::random(32, 32, 200, 4).to_store();
        let tree = tree_for(&store, 32);
        assert!(tree.node_count() > 1);

        for id in (0..200).step_by(5) {
            let cell = store.get(id).map(|a| a.position).unwrap();
            move_agent(&mut store, id, Cell::new(31 - cell.x, 31 - cell.y));
        }
        let stale_before = stale_agents(&tree, &store).unwrap();
        assert!(!stale_before.is_empty());

        let moved = reindex(&tree, &store).unwrap();
        assert_eq!(moved, stale_before.len());
        assert!(stale_agents(&tree, &store).unwrap().is_empty());
        for agent in store.iter() {
            for leaf in tree.leaves_of(agent.id) {
                assert!(tree.agents_at(leaf).contains(&agent.id));
            }
        }
    }
}

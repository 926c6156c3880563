//! End-to-end crowd scenarios.
//!
//! Small hand-built grids with a known outcome, plus a mid-sized random crowd
//! that checks the structural invariants of the index after every tick.

#[cfg(test)]
mod tests {
    use crate::core::agent::{Cell, Direction};
    use crate::core::config::{DetectionMode, QuadtreeConfig, SimConfig};
    use crate::core::scenario::Scenario;
    use crate::crowd::simulation::Simulation;
    use std::collections::HashMap;

    fn config(ticks: u64, threads: usize, seed: u64) -> SimConfig {
        SimConfig {
            ticks,
            threads,
            seed,
            ..SimConfig::default()
        }
    }

    fn positions(sim: &Simulation) -> Vec<(Cell, Direction)> {
        sim.agents().iter().map(|a| (a.position, a.direction)).collect()
    }

    fn assert_index_invariants(sim: &Simulation) {
        let tree = sim.quadtree();
        let limits = tree.limits().clone();
        let snapshot = tree.snapshot();
        let (dim_x, dim_y) = sim.dims();

        let internal = snapshot.iter().filter(|n| n.children == 4).count();
        assert!(snapshot.iter().all(|n| n.children == 0 || n.children == 4));
        assert_eq!(snapshot.len(), 1 + 4 * internal);
        assert_eq!(tree.node_count(), snapshot.len());

        let mut held: HashMap<u32, Vec<u64>> = HashMap::new();
        for node in snapshot.iter().filter(|n| n.children == 0) {
            if node.depth < limits.max_depth {
                assert!(
                    node.agents.len() <= limits.max_agents_per_leaf,
                    "leaf {} at depth {} holds {} agents",
                    node.id,
                    node.depth,
                    node.agents.len()
                );
            }
            for &agent in &node.agents {
                held.entry(agent).or_default().push(node.id);
            }
        }

        for agent in sim.agents() {
            assert!(agent.position.in_grid(dim_x, dim_y));
            let mut leaves = held.remove(&agent.id).unwrap_or_default();
            leaves.sort_unstable();
            assert_eq!(leaves, tree.leaves_of(agent.id), "agent {}", agent.id);
            assert_eq!(leaves, tree.leaf_ids_for(agent.position).unwrap());
        }
        assert!(held.is_empty(), "leaves hold unknown agents: {:?}", held.keys());
    }

    #[test]
    fn lone_agent_in_corner_moves_to_a_neighbour() {
        let scenario = Scenario::new(2, 2).with_agent(0, 0, Direction::East);
        for seed in 0..16 {
            let mut sim = Simulation::new(config(1, 1, seed), &scenario).unwrap();
            sim.run().unwrap();
            let cell = sim.agents()[0].position;
            assert!(
                cell == Cell::new(1, 0) || cell == Cell::new(0, 1),
                "seed {} ended on {:?}",
                seed,
                cell
            );
        }
    }

    #[test]
    fn head_on_pair_bounces_apart() {
        let scenario = Scenario::new(3, 3)
            .with_agent(0, 1, Direction::East)
            .with_agent(2, 1, Direction::West);
        let mut sim = Simulation::new(config(1, 2, 0), &scenario).unwrap();
        let report = sim.run().unwrap();

        let agents = sim.agents();
        assert_ne!(agents[0].position, Cell::new(1, 1));
        assert_ne!(agents[1].position, Cell::new(1, 1));
        assert_eq!(agents[0].direction, Direction::West);
        assert_eq!(agents[1].direction, Direction::East);
        assert_eq!(report.resolved_pairs, 1);
    }

    #[test]
    fn random_crowd_keeps_index_consistent() {
        let scenario = Scenario::random(100, 100, 1000, 2024);
        let mut sim = Simulation::new(config(50, 4, 2024), &scenario).unwrap();
        assert_index_invariants(&sim);
        for _ in 0..50 {
            sim.step().unwrap();
            assert_index_invariants(&sim);
        }
        assert_eq!(sim.tick(), 50);
    }

    #[test]
    fn deep_tree_with_tolerance_stays_consistent() {
        let scenario = Scenario::random(64, 64, 800, 77);
        let cfg = SimConfig {
            quadtree: QuadtreeConfig {
                max_agents_per_leaf: 2,
                max_depth: 7,
                boundary_tolerance: 1,
            },
            ..config(20, 3, 77)
        };
        let mut sim = Simulation::new(cfg, &scenario).unwrap();
        for _ in 0..20 {
            sim.step().unwrap();
        }
        assert_index_invariants(&sim);
    }

    #[test]
    fn same_seed_replays_exactly() {
        let scenario = Scenario::random(50, 50, 400, 9);
        let mut a = Simulation::new(config(30, 4, 9), &scenario).unwrap();
        let mut b = Simulation::new(config(30, 4, 9), &scenario).unwrap();
        let ra = a.run().unwrap();
        let rb = b.run().unwrap();
        assert_eq!(positions(&a), positions(&b));
        assert_eq!(ra.collisions, rb.collisions);
        assert_eq!(ra.resolved_pairs, rb.resolved_pairs);
    }

    #[test]
    fn thread_count_does_not_change_outcome() {
        let scenario = Scenario::random(50, 50, 400, 13);
        let mut single = Simulation::new(config(25, 1, 13), &scenario).unwrap();
        let mut many = Simulation::new(config(25, 4, 13), &scenario).unwrap();
        single.run().unwrap();
        many.run().unwrap();
        assert_eq!(positions(&single), positions(&many));
    }

    #[test]
    fn brute_force_mode_matches_quadtree_mode() {
        let scenario = Scenario::random(40, 40, 500, 5);
        let mut indexed = Simulation::new(config(15, 2, 5), &scenario).unwrap();
        let oracle_cfg = SimConfig {
            detection: DetectionMode::BruteForce,
            ..config(15, 2, 5)
        };
        let mut oracle = Simulation::new(oracle_cfg, &scenario).unwrap();
        indexed.run().unwrap();
        oracle.run().unwrap();
        assert_eq!(positions(&indexed), positions(&oracle));
    }
}

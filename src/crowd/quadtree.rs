//! Concurrent Region Quadtree
//!
//! Tracks which agents occupy which region of the grid. Each node guards its
//! `{leaf agents | four children}` slot with its own mutex, so threads only
//! contend on the handful of nodes a given agent touches. A split publishes
//! all four children in a single assignment under the parent's lock, so a
//! reader sees either a leaf or a fully populated internal node.
//!
//! Cells lying on a splitting midline (or within `boundary_tolerance` of it)
//! are registered on both sides, which lets collision detection find
//! neighbours that straddle a leaf boundary.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::core::agent::{AgentId, Cell, Locate};
use crate::core::config::QuadtreeConfig;
use crate::core::error::{Result, SimError};

/// Opaque node handle. Unique for the lifetime of a tree, never reused.
pub type NodeId = u64;

/// Inclusive axis-aligned rectangle of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Bounds {
    pub const fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Bounds {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Splitting midlines. Shared by the two children on either side.
    #[inline]
    pub fn mid(&self) -> (i32, i32) {
        (
            self.min_x + (self.max_x - self.min_x) / 2,
            self.min_y + (self.max_y - self.min_y) / 2,
        )
    }

    #[inline]
    pub fn contains(&self, cell: Cell) -> bool {
        cell.x >= self.min_x && cell.x <= self.max_x && cell.y >= self.min_y && cell.y <= self.max_y
    }

    pub fn quadrant(&self, quadrant: Quadrant) -> Bounds {
        let (mid_x, mid_y) = self.mid();
        match quadrant {
            Quadrant::NorthWest => Bounds::new(self.min_x, self.min_y, mid_x, mid_y),
            Quadrant::NorthEast => Bounds::new(mid_x, self.min_y, self.max_x, mid_y),
            Quadrant::SouthWest => Bounds::new(self.min_x, mid_y, mid_x, self.max_y),
            Quadrant::SouthEast => Bounds::new(mid_x, mid_y, self.max_x, self.max_y),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    NorthWest = 0,
    NorthEast = 1,
    SouthWest = 2,
    SouthEast = 3,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];
}

/// Small bitset of quadrants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuadrantSet(u8);

impl QuadrantSet {
    fn insert(&mut self, quadrant: Quadrant) {
        self.0 |= 1 << quadrant as u8;
    }

    pub fn contains(self, quadrant: Quadrant) -> bool {
        self.0 & (1 << quadrant as u8) != 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Quadrant> {
        Quadrant::ALL.into_iter().filter(move |&q| self.contains(q))
    }
}

/// Multi-quadrant membership test.
///
/// A cell off both midlines (beyond `tolerance`) maps to exactly one
/// quadrant; one on a midline maps to two; the exact centre maps to all four.
/// Never empty.
pub fn membership(bounds: &Bounds, cell: Cell, tolerance: i32) -> QuadrantSet {
    let (mid_x, mid_y) = bounds.mid();
    let west = cell.x <= mid_x.saturating_add(tolerance);
    let east = cell.x >= mid_x.saturating_sub(tolerance);
    let north = cell.y <= mid_y.saturating_add(tolerance);
    let south = cell.y >= mid_y.saturating_sub(tolerance);

    let mut set = QuadrantSet::default();
    if north && west {
        set.insert(Quadrant::NorthWest);
    }
    if north && east {
        set.insert(Quadrant::NorthEast);
    }
    if south && west {
        set.insert(Quadrant::SouthWest);
    }
    if south && east {
        set.insert(Quadrant::SouthEast);
    }
    set
}

/// Non-overlapping variant: midline cells go west / north.
pub fn single_quadrant(bounds: &Bounds, cell: Cell) -> Quadrant {
    let (mid_x, mid_y) = bounds.mid();
    match (cell.x <= mid_x, cell.y <= mid_y) {
        (true, true) => Quadrant::NorthWest,
        (false, true) => Quadrant::NorthEast,
        (true, false) => Quadrant::SouthWest,
        (false, false) => Quadrant::SouthEast,
    }
}

enum Slot {
    Leaf(Vec<AgentId>),
    Split(Arc<[QuadNode; 4]>),
}

struct QuadNode {
    id: NodeId,
    bounds: Bounds,
    depth: u32,
    slot: Mutex<Slot>,
}

impl QuadNode {
    fn leaf(id: NodeId, bounds: Bounds, depth: u32) -> Self {
        QuadNode {
            id,
            bounds,
            depth,
            slot: Mutex::new(Slot::Leaf(Vec::new())),
        }
    }
}

/// What an insertion found once it held a node's lock.
enum Visit {
    Done,
    Descend(Arc<[QuadNode; 4]>),
    Overflow(Vec<AgentId>),
}

/// Point-in-time view of one node, for invariant checks and debug dumps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub bounds: Bounds,
    pub depth: u32,
    /// Always 0 (leaf) or 4 (internal).
    pub children: usize,
    pub agents: Vec<AgentId>,
}

/// Thread-safe region quadtree over a `dim_x` x `dim_y` grid.
pub struct Quadtree {
    root: QuadNode,
    limits: QuadtreeConfig,
    dim_x: i32,
    dim_y: i32,
    next_id: AtomicU64,
    // Non-root nodes by id: the sibling array holding the node and its index.
    directory: DashMap<NodeId, (Arc<[QuadNode; 4]>, usize)>,
    // Leaf ids each agent is currently registered in.
    registrations: DashMap<AgentId, Vec<NodeId>>,
}

// Lock discipline: a node lock may be held while touching `directory` or
// `registrations`, never the other way round. Map guards are always dropped
// before a node is locked.

impl Quadtree {
    pub fn new(dim_x: i32, dim_y: i32, limits: QuadtreeConfig) -> Result<Self> {
        if dim_x <= 0 || dim_y <= 0 {
            return Err(SimError::Config(format!(
                "quadtree needs a non-empty grid, got {}x{}",
                dim_x, dim_y
            )));
        }
        if limits.max_agents_per_leaf == 0 {
            return Err(SimError::Config("max_agents_per_leaf must be positive".into()));
        }
        if limits.boundary_tolerance < 0 {
            return Err(SimError::Config("boundary_tolerance must not be negative".into()));
        }
        Ok(Quadtree {
            root: QuadNode::leaf(0, Bounds::new(0, 0, dim_x - 1, dim_y - 1), 0),
            limits,
            dim_x,
            dim_y,
            next_id: AtomicU64::new(1),
            directory: DashMap::new(),
            registrations: DashMap::new(),
        })
    }

    pub fn bounds(&self) -> Bounds {
        self.root.bounds
    }

    pub fn limits(&self) -> &QuadtreeConfig {
        &self.limits
    }

    pub fn root_id(&self) -> NodeId {
        self.root.id
    }

    pub fn node_count(&self) -> usize {
        self.directory.len() + 1
    }

    /// Number of agents with at least one leaf registration.
    pub fn registered_agents(&self) -> usize {
        self.registrations.len()
    }

    fn check(&self, cell: Cell) -> Result<()> {
        if cell.in_grid(self.dim_x, self.dim_y) {
            Ok(())
        } else {
            Err(SimError::OutOfBounds {
                x: cell.x,
                y: cell.y,
                dim_x: self.dim_x,
                dim_y: self.dim_y,
            })
        }
    }

    fn position_of<L: Locate + ?Sized>(&self, agent: AgentId, locator: &L) -> Result<Cell> {
        let cell = locator.locate(agent).ok_or(SimError::UnknownAgent(agent))?;
        self.check(cell)?;
        Ok(cell)
    }

    fn alloc_id(&self) -> NodeId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs `f` against the node with the given id, if it still exists.
    fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&QuadNode) -> R) -> Option<R> {
        if id == self.root.id {
            return Some(f(&self.root));
        }
        let (siblings, index) = self
            .directory
            .get(&id)
            .map(|entry| (Arc::clone(&entry.0), entry.1))?;
        Some(f(&siblings[index]))
    }

    /// Registers `agent` in every leaf overlapping its current cell.
    pub fn insert<L: Locate + ?Sized>(&self, agent: AgentId, locator: &L) -> Result<()> {
        let cell = self.position_of(agent, locator)?;
        self.insert_at(&self.root, agent, cell, locator)
    }

    fn insert_at<L: Locate + ?Sized>(
        &self,
        node: &QuadNode,
        agent: AgentId,
        cell: Cell,
        locator: &L,
    ) -> Result<()> {
        let mut slot = node.slot.lock();
        let visit = match &mut *slot {
            Slot::Split(children) => Visit::Descend(Arc::clone(children)),
            Slot::Leaf(agents) => {
                if !agents.contains(&agent) {
                    agents.push(agent);
                    self.registrations.entry(agent).or_default().push(node.id);
                }
                if agents.len() <= self.limits.max_agents_per_leaf
                    || node.depth >= self.limits.max_depth
                {
                    Visit::Done
                } else {
                    Visit::Overflow(agents.clone())
                }
            }
        };

        match visit {
            Visit::Done => Ok(()),
            Visit::Descend(children) => {
                drop(slot);
                for quadrant in membership(&node.bounds, cell, self.limits.boundary_tolerance).iter() {
                    self.insert_at(&children[quadrant as usize], agent, cell, locator)?;
                }
                Ok(())
            }
            Visit::Overflow(displaced) => {
                // Resolve every position before touching the structure so a
                // failed lookup leaves the leaf intact.
                let placed = displaced
                    .iter()
                    .map(|&a| {
                        if a == agent {
                            Ok((a, cell))
                        } else {
                            self.position_of(a, locator).map(|c| (a, c))
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;

                let children = self.spawn_children(node);
                for &(a, _) in &placed {
                    if let Some(mut leaves) = self.registrations.get_mut(&a) {
                        leaves.retain(|&leaf| leaf != node.id);
                    }
                }
                *slot = Slot::Split(children);
                drop(slot);

                trace!(
                    "[Quadtree] Split node {} at depth {} ({} agents displaced)",
                    node.id,
                    node.depth,
                    placed.len()
                );

                for (a, c) in placed {
                    self.insert_at(node, a, c, locator)?;
                }
                Ok(())
            }
        }
    }

    fn spawn_children(&self, parent: &QuadNode) -> Arc<[QuadNode; 4]> {
        let children = Arc::new(Quadrant::ALL.map(|quadrant| {
            QuadNode::leaf(
                self.alloc_id(),
                parent.bounds.quadrant(quadrant),
                parent.depth + 1,
            )
        }));
        for (index, child) in children.iter().enumerate() {
            self.directory.insert(child.id, (Arc::clone(&children), index));
        }
        children
    }

    /// Removes `agent` from every leaf it is registered in. Returns the
    /// number of registrations dropped; removing an absent agent returns 0.
    ///
    /// Must not race an insertion whose split is displacing the same agent.
    pub fn remove(&self, agent: AgentId) -> usize {
        let Some((_, leaves)) = self.registrations.remove(&agent) else {
            return 0;
        };
        leaves
            .into_iter()
            .map(|leaf| self.with_node(leaf, |node| self.purge(node, agent)).unwrap_or(0))
            .sum()
    }

    // A recorded leaf that has since split still holds the agent somewhere
    // below it, so the whole subtree is swept.
    fn purge(&self, node: &QuadNode, agent: AgentId) -> usize {
        let children = match &mut *node.slot.lock() {
            Slot::Leaf(agents) => {
                let before = agents.len();
                agents.retain(|&a| a != agent);
                return before - agents.len();
            }
            Slot::Split(children) => Arc::clone(children),
        };
        children.iter().map(|child| self.purge(child, agent)).sum()
    }

    /// Every leaf the membership test reaches for `cell`, in ascending id order.
    pub fn leaf_ids_for(&self, cell: Cell) -> Result<Vec<NodeId>> {
        self.check(cell)?;
        let mut leaves = Vec::with_capacity(4);
        self.collect_leaves(&self.root, cell, &mut leaves);
        if leaves.is_empty() {
            return Err(SimError::IndexConsistency(format!(
                "no leaf covers ({}, {})",
                cell.x, cell.y
            )));
        }
        leaves.sort_unstable();
        Ok(leaves)
    }

    fn collect_leaves(&self, node: &QuadNode, cell: Cell, out: &mut Vec<NodeId>) {
        let children = match &*node.slot.lock() {
            Slot::Leaf(_) => {
                out.push(node.id);
                return;
            }
            Slot::Split(children) => Arc::clone(children),
        };
        for quadrant in membership(&node.bounds, cell, self.limits.boundary_tolerance).iter() {
            self.collect_leaves(&children[quadrant as usize], cell, out);
        }
    }

    /// Exactly one leaf for `cell`, never duplicated across midlines.
    pub fn single_leaf_for(&self, cell: Cell) -> Result<NodeId> {
        self.check(cell)?;
        Ok(self.descend_single(&self.root, cell))
    }

    fn descend_single(&self, node: &QuadNode, cell: Cell) -> NodeId {
        let children = match &*node.slot.lock() {
            Slot::Leaf(_) => return node.id,
            Slot::Split(children) => Arc::clone(children),
        };
        self.descend_single(&children[single_quadrant(&node.bounds, cell) as usize], cell)
    }

    /// Agents registered at a leaf. Unknown ids and nodes that have split
    /// since the handle was obtained yield nothing.
    pub fn agents_at(&self, node: NodeId) -> Vec<AgentId> {
        self.with_node(node, |node| match &*node.slot.lock() {
            Slot::Leaf(agents) => agents.clone(),
            Slot::Split(_) => Vec::new(),
        })
        .unwrap_or_default()
    }

    /// Leaves `agent` is currently registered in, in ascending id order.
    pub fn leaves_of(&self, agent: AgentId) -> Vec<NodeId> {
        let mut leaves = self
            .registrations
            .get(&agent)
            .map(|leaves| leaves.value().clone())
            .unwrap_or_default();
        leaves.sort_unstable();
        leaves
    }

    /// Back to a single empty leaf spanning the original bounds. Node ids
    /// keep counting up, so handles from before the reset never alias.
    pub fn reset(&mut self) {
        *self.root.slot.get_mut() = Slot::Leaf(Vec::new());
        self.directory.clear();
        self.registrations.clear();
    }

    /// Depth-first view of every node, root first.
    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        let mut nodes = Vec::with_capacity(self.node_count());
        self.snapshot_into(&self.root, &mut nodes);
        nodes
    }

    fn snapshot_into(&self, node: &QuadNode, out: &mut Vec<NodeSnapshot>) {
        let (agents, children) = match &*node.slot.lock() {
            Slot::Leaf(agents) => (agents.clone(), None),
            Slot::Split(children) => (Vec::new(), Some(Arc::clone(children))),
        };
        out.push(NodeSnapshot {
            id: node.id,
            bounds: node.bounds,
            depth: node.depth,
            children: if children.is_some() { 4 } else { 0 },
            agents,
        });
        if let Some(children) = children {
            for child in children.iter() {
                self.snapshot_into(child, out);
            }
        }
    }
}

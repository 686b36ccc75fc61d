//! Flat-array graph store with version counters.
//!
//! Nodes live in a dense slot array of `max_nodes` entries with a parallel
//! active bitset; a node's ID is its slot index and stays stable until the
//! node is removed, after which the slot is reused. Outgoing edges are kept
//! in a flat buffer of `max_nodes * max_edges_per_node` entries so that a
//! node's edges occupy one contiguous region, which keeps A* expansion
//! cache-friendly.
//!
//! Two monotonic counters (`node_version`, `edge_version`) advance on every
//! structural mutation. Searches snapshot them to detect mid-search
//! mutation, and cache entries record them for invalidation.

use fixedbitset::FixedBitSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::debug;

use crate::error::{PathError, PathResult};
use crate::math::{self, Vec2};


/// Sentinel for "no node". Also returned by heap pops on empty heaps.
pub const INVALID_ID: u32 = u32::MAX;

/// Node payload. The ID is the slot index and is not stored.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Node {
    pub position: Vec2,
    /// Bumped on every position change; recorded by path-cache entries.
    pub version: u32,
}

/// Directed edge stored in the per-source region.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Edge {
    pub to: u32,
    pub cost: f32,
    /// Set on both directions when the pair was added together, so reverse
    /// existence is an O(1) check instead of a region scan.
    pub bidirectional: bool,
}

/// Edge record returned by edge enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeInfo {
    pub from: u32,
    pub to: u32,
    pub cost: f32,
    pub bidirectional: bool,
}

pub(crate) struct GraphStore {
    nodes: Vec<Node>,
    active: FixedBitSet,
    /// Flat edge buffer; node `i` owns `[i * max_edges_per_node, ..)`.
    edges: Vec<Edge>,
    edge_count: Vec<u32>,
    max_edges_per_node: u32,
    node_version: u32,
    edge_version: u32,
    active_count: u32,
    total_edges: u32,
}

impl GraphStore {
    pub fn new(max_nodes: u32, max_edges_per_node: u32) -> Self {
        let n = max_nodes as usize;
        Self {
            nodes: vec![Node::default(); n],
            active: FixedBitSet::with_capacity(n),
            edges: vec![
                Edge { to: INVALID_ID, cost: 0.0, bidirectional: false };
                n * max_edges_per_node as usize
            ],
            edge_count: vec![0; n],
            max_edges_per_node,
            node_version: 0,
            edge_version: 0,
            active_count: 0,
            total_edges: 0,
        }
    }

    #[inline]
    pub fn max_nodes(&self) -> u32 {
        self.nodes.len() as u32
    }

    #[inline]
    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    #[inline]
    pub fn total_edges(&self) -> u32 {
        self.total_edges
    }

    #[inline]
    pub fn node_version(&self) -> u32 {
        self.node_version
    }

    #[inline]
    pub fn edge_version(&self) -> u32 {
        self.edge_version
    }

    #[inline]
    pub fn is_active(&self, id: u32) -> bool {
        (id as usize) < self.nodes.len() && self.active.contains(id as usize)
    }

    pub fn position(&self, id: u32) -> Option<Vec2> {
        self.is_active(id).then(|| self.nodes[id as usize].position)
    }

    /// Per-node version for cache validation. `None` for invalid or
    /// inactive IDs, which makes stale cache entries miss.
    pub fn node_state(&self, id: u32) -> Option<u32> {
        self.is_active(id).then(|| self.nodes[id as usize].version)
    }

    #[inline]
    fn region_start(&self, id: u32) -> usize {
        id as usize * self.max_edges_per_node as usize
    }

    /// Outgoing edges of `id`. Empty slice for invalid or inactive IDs.
    pub fn outgoing(&self, id: u32) -> &[Edge] {
        if !self.is_active(id) {
            return &[];
        }
        let start = self.region_start(id);
        &self.edges[start..start + self.edge_count[id as usize] as usize]
    }

    /// Activates the first free slot. The new node's version is seeded past
    /// the current graph version so reused slots never alias the versions a
    /// cache entry recorded for the slot's previous occupant.
    pub fn add_node(&mut self, position: Vec2) -> PathResult<u32> {
        let slot = match (0..self.nodes.len()).find(|&i| !self.active.contains(i)) {
            Some(slot) => slot,
            None => {
                debug!("[GRAPH] add_node failed: all {} slots active", self.nodes.len());
                return Err(PathError::NodeFull);
            }
        };
        self.active.set(slot, true);
        self.active_count += 1;
        self.nodes[slot] = Node { position, version: self.node_version + 1 };
        self.edge_count[slot] = 0;
        self.node_version += 1;
        Ok(slot as u32)
    }

    /// Updates a node position. Returns the previous position when the node
    /// actually moved, `None` for invalid IDs or moves below [`math::EPSILON`]
    /// (which are no-ops and bump nothing).
    pub fn move_node(&mut self, id: u32, position: Vec2) -> Option<Vec2> {
        if !self.is_active(id) {
            return None;
        }
        let node = &mut self.nodes[id as usize];
        if node.position.distance(position) < math::EPSILON {
            return None;
        }
        let old = node.position;
        node.position = position;
        node.version += 1;
        self.node_version += 1;
        Some(old)
    }

    /// Deactivates a node and removes every incident edge (outgoing and
    /// incoming, via a sweep of all sources). Idempotent: returns `false`
    /// without touching versions when the ID is invalid or inactive.
    pub fn remove_node(&mut self, id: u32) -> bool {
        if !self.is_active(id) {
            return false;
        }
        self.total_edges -= self.edge_count[id as usize];
        self.edge_count[id as usize] = 0;

        // Incoming sweep: swap-and-pop every edge pointing at `id`.
        for src in 0..self.nodes.len() {
            if src == id as usize || !self.active.contains(src) {
                continue;
            }
            let start = src * self.max_edges_per_node as usize;
            let mut i = 0;
            while i < self.edge_count[src] as usize {
                if self.edges[start + i].to == id {
                    let last = self.edge_count[src] as usize - 1;
                    self.edges.swap(start + i, start + last);
                    self.edge_count[src] -= 1;
                    self.total_edges -= 1;
                } else {
                    i += 1;
                }
            }
        }

        self.active.set(id as usize, false);
        self.active_count -= 1;
        self.node_version += 1;
        self.edge_version += 1;
        true
    }

    /// Appends an edge to `from`'s region; with `bidirectional` the reverse
    /// edge is appended too and both carry the flag. Capacity of both
    /// regions is checked up front so a bidirectional add never leaves a
    /// half-inserted pair behind.
    ///
    /// Duplicate edges are not detected; every copy is traversed by the
    /// search.
    pub fn add_edge(&mut self, from: u32, to: u32, cost: f32, bidirectional: bool) -> PathResult<()> {
        if !self.is_active(from) {
            return Err(PathError::StartNodeInvalid);
        }
        if !self.is_active(to) {
            return Err(PathError::GoalNodeInvalid);
        }
        if self.edge_count[from as usize] >= self.max_edges_per_node {
            debug!("[GRAPH] add_edge {}->{} failed: source region full", from, to);
            return Err(PathError::EdgeFull);
        }
        if bidirectional && from != to && self.edge_count[to as usize] >= self.max_edges_per_node {
            debug!("[GRAPH] add_edge {}->{} failed: reverse region full", from, to);
            return Err(PathError::EdgeFull);
        }

        self.push_edge(from, Edge { to, cost, bidirectional });
        if bidirectional && from != to {
            self.push_edge(to, Edge { to: from, cost, bidirectional: true });
        }
        self.edge_version += 1;
        Ok(())
    }

    fn push_edge(&mut self, from: u32, edge: Edge) {
        let slot = self.region_start(from) + self.edge_count[from as usize] as usize;
        self.edges[slot] = edge;
        self.edge_count[from as usize] += 1;
        self.total_edges += 1;
    }

    /// Removes the first `from -> to` edge via swap-and-pop. Only the one
    /// direction is removed; callers drop the reverse explicitly. If the
    /// removed edge carried the bidirectional flag, the surviving reverse
    /// edge is downgraded to unidirectional so the flag keeps agreeing with
    /// reverse existence. Missing edges are a no-op returning `false`.
    pub fn remove_edge(&mut self, from: u32, to: u32) -> bool {
        if !self.is_active(from) {
            return false;
        }
        let start = self.region_start(from);
        let count = self.edge_count[from as usize] as usize;
        let Some(i) = self.edges[start..start + count].iter().position(|e| e.to == to) else {
            return false;
        };
        let was_bidirectional = self.edges[start + i].bidirectional;
        self.edges.swap(start + i, start + count - 1);
        self.edge_count[from as usize] -= 1;
        self.total_edges -= 1;

        if was_bidirectional && self.is_active(to) {
            let rstart = self.region_start(to);
            let rcount = self.edge_count[to as usize] as usize;
            if let Some(r) = self.edges[rstart..rstart + rcount]
                .iter()
                .position(|e| e.to == from && e.bidirectional)
            {
                self.edges[rstart + r].bidirectional = false;
            }
        }

        self.edge_version += 1;
        true
    }

    pub fn has_edge(&self, from: u32, to: u32) -> bool {
        self.outgoing(from).iter().any(|e| e.to == to)
    }

    /// Read-only edge enumeration with the engine's filter semantics.
    ///
    /// Outgoing edges are listed first. With `include_incoming`, a full scan
    /// of all sources' regions adds every edge pointing at `id`. With
    /// `include_bidirectional` false, edges carrying the flag are skipped in
    /// both directions.
    pub fn node_edges(
        &self,
        id: u32,
        include_bidirectional: bool,
        include_incoming: bool,
    ) -> SmallVec<[EdgeInfo; 8]> {
        let mut out = SmallVec::new();
        if !self.is_active(id) {
            return out;
        }
        for edge in self.outgoing(id) {
            if !include_bidirectional && edge.bidirectional {
                continue;
            }
            out.push(EdgeInfo {
                from: id,
                to: edge.to,
                cost: edge.cost,
                bidirectional: edge.bidirectional,
            });
        }
        if include_incoming {
            for src in self.active.ones() {
                if src == id as usize {
                    continue;
                }
                for edge in self.outgoing(src as u32) {
                    if edge.to != id {
                        continue;
                    }
                    if !include_bidirectional && edge.bidirectional {
                        continue;
                    }
                    out.push(EdgeInfo {
                        from: src as u32,
                        to: id,
                        cost: edge.cost,
                        bidirectional: edge.bidirectional,
                    });
                }
            }
        }
        out
    }

    /// Visits every outgoing edge of every active node.
    pub fn for_each_active_edge(&self, mut f: impl FnMut(u32, &Edge)) {
        for src in self.active.ones() {
            for edge in self.outgoing(src as u32) {
                f(src as u32, edge);
            }
        }
    }

    /// Iterator over active node IDs.
    pub fn active_nodes(&self) -> impl Iterator<Item = u32> + '_ {
        self.active.ones().map(|i| i as u32)
    }
}

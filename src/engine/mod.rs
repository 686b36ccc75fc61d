//! The `Pathfinder` instance: public API, cache orchestration, and the
//! graph-changed retry protocol.
//!
//! All state lives in the instance; multiple independent instances can run
//! side by side (callers needing parallelism shard the world across
//! instances). A single instance is single-threaded: every operation
//! completes before returning and there are no suspension points.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{error, info, warn};

use crate::astar::{self, SearchState, MAX_GRAPH_CHANGED_RETRIES};
use crate::config::{PathfinderConfig, SpatialIndexMode, AUTO_SPATIAL_INDEX_THRESHOLD};
use crate::distance_cache::{DistanceCache, DistanceCacheStats};
use crate::error::{PathError, PathResult};
use crate::graph::{EdgeInfo, GraphStore};
use crate::heap::{HeapPool, MinHeap};
use crate::math::Vec2;
use crate::path_cache::{PathCache, PathCacheStats};
use crate::spatial_index::{SpatialIndex, SpatialIndexStats};

mod projection;


/// Start of a query that may be either an existing node or an arbitrary
/// world position to be projected onto the graph.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PathAnchor {
    Node(u32),
    Point(Vec2),
}

/// Result of [`Pathfinder::find_path_from_point`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPath {
    /// Number of node IDs written to the output buffer.
    pub length: u32,
    /// Projection of the query point onto the nearest edge; the caller
    /// walks to this point before following the node path.
    pub entry_point: Vec2,
}

/// Result of [`Pathfinder::find_path_with_exit`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExitPath {
    pub length: u32,
    /// Entry projection; `None` when the query started at a node.
    pub entry_point: Option<Vec2>,
    /// Projection of the destination point onto the nearest edge; the
    /// caller leaves the graph here.
    pub exit_point: Vec2,
}

/// A 2D graph pathfinding engine with budgeted A*, path and distance
/// caches, and projected (off-graph) queries.
///
/// # Memory discipline
///
/// Every capacity is fixed by [`PathfinderConfig`] at construction and the
/// hot path allocates nothing; growing a caller's output buffer during
/// path reconstruction is the only exception.
///
/// # Heuristic contract
///
/// The A* heuristic is straight-line Euclidean distance. Searches are
/// optimal as long as every edge cost is at least the distance between its
/// endpoints (the usual convention; terrain multipliers >= 1 are fine).
/// Costs below straight-line distance make the heuristic inadmissible and
/// the engine may return suboptimal routes.
///
/// # Example
///
/// ```rust
/// use waygraph::{Pathfinder, PathfinderConfig, Vec2};
///
/// let mut pf = Pathfinder::new(PathfinderConfig::default());
/// let a = pf.add_node(Vec2::new(0.0, 0.0)).unwrap();
/// let b = pf.add_node(Vec2::new(10.0, 0.0)).unwrap();
/// let c = pf.add_node(Vec2::new(20.0, 0.0)).unwrap();
/// pf.add_edge(a, b, 10.0, true).unwrap();
/// pf.add_edge(b, c, 10.0, true).unwrap();
///
/// let mut path = Vec::new();
/// let len = pf.find_path(a, c, &mut path, 16).unwrap();
/// assert_eq!((len, path.as_slice()), (3, &[a, b, c][..]));
/// ```
pub struct Pathfinder {
    config: PathfinderConfig,
    graph: GraphStore,
    heap_pool: HeapPool,
    distance_cache: DistanceCache,
    path_cache: PathCache,
    spatial: Option<SpatialIndex>,
    search: SearchState,
}

impl Pathfinder {
    /// Allocates all engine state up front. `heap_pool_block_size` is
    /// silently clamped to `max_nodes`, the pool capacity.
    pub fn new(mut config: PathfinderConfig) -> Self {
        config.heap_pool_block_size = config.heap_pool_block_size.min(config.max_nodes);
        info!(
            "[ENGINE] init: max_nodes={} max_edges_per_node={} heap_block={} cache_path_len={}",
            config.max_nodes,
            config.max_edges_per_node,
            config.heap_pool_block_size,
            config.max_cache_path_length
        );
        Self {
            graph: GraphStore::new(config.max_nodes, config.max_edges_per_node),
            heap_pool: HeapPool::new(config.max_nodes),
            distance_cache: DistanceCache::new(config.max_nodes),
            path_cache: PathCache::new(
                config.path_cache_size,
                config.max_cache_path_length,
                config.point_cache_epsilon,
            ),
            spatial: None,
            search: SearchState::new(config.max_nodes),
            config,
        }
    }

    /// Consumes the engine. All node IDs become invalid.
    pub fn shutdown(self) {
        debug_assert_eq!(self.heap_pool.cursor(), 0, "all heap slices released at shutdown");
        info!(
            "[ENGINE] shutdown: {} nodes, {} edges",
            self.graph.active_count(),
            self.graph.total_edges()
        );
    }

    // ========================================================================
    // Node operations
    // ========================================================================

    /// Adds a node at `position`, reusing the first inactive slot.
    pub fn add_node(&mut self, position: Vec2) -> PathResult<u32> {
        self.graph.add_node(position)
    }

    /// Bulk node insertion. Failed adds are logged and skipped; the
    /// returned IDs cover the successful ones in input order.
    pub fn add_nodes(&mut self, positions: &[Vec2]) -> SmallVec<[u32; 8]> {
        let mut ids = SmallVec::new();
        for (i, &position) in positions.iter().enumerate() {
            match self.graph.add_node(position) {
                Ok(id) => ids.push(id),
                Err(e) => error!("[ENGINE] add_nodes: node {} failed: {}", i, e),
            }
        }
        ids
    }

    /// Moves a node. No-op (and no version bump) when the ID is invalid,
    /// inactive, or the move is below the position epsilon. Otherwise the
    /// node's cached distances are invalidated and the spatial index is
    /// updated; cached paths through the node expire via its version.
    pub fn move_node(&mut self, id: u32, position: Vec2) {
        if self.graph.move_node(id, position).is_some() {
            self.distance_cache.invalidate(id);
            if let Some(spatial) = &mut self.spatial {
                spatial.update_node_position(id, &self.graph);
            }
        }
    }

    /// Removes a node and every incident edge. Idempotent; invalid or
    /// inactive IDs are ignored.
    pub fn remove_node(&mut self, id: u32) {
        if !self.graph.is_active(id) {
            return;
        }
        self.distance_cache.invalidate(id);
        if let Some(spatial) = &mut self.spatial {
            spatial.invalidate_node(id);
        }
        self.graph.remove_node(id);
    }

    pub fn node_position(&self, id: u32) -> Option<Vec2> {
        self.graph.position(id)
    }

    /// Number of active nodes.
    pub fn node_count(&self) -> u32 {
        self.graph.active_count()
    }

    /// Number of directed edge records (a bidirectional pair counts twice).
    pub fn edge_count(&self) -> u32 {
        self.graph.total_edges()
    }

    /// Current `(node_version, edge_version)` counters.
    pub fn versions(&self) -> (u32, u32) {
        (self.graph.node_version(), self.graph.edge_version())
    }

    // ========================================================================
    // Edge operations
    // ========================================================================

    /// Adds a directed edge, or a flagged pair with `bidirectional`.
    /// Duplicate edges are not detected; every copy is traversed by
    /// searches.
    pub fn add_edge(&mut self, from: u32, to: u32, cost: f32, bidirectional: bool) -> PathResult<()> {
        self.graph.add_edge(from, to, cost, bidirectional)?;
        if let Some(spatial) = &mut self.spatial {
            spatial.add_edge(from, to, &self.graph);
            if bidirectional && from != to {
                spatial.add_edge(to, from, &self.graph);
            }
        }
        Ok(())
    }

    /// Bulk edge insertion with Euclidean costs computed from the current
    /// node positions. Failed adds are logged and skipped.
    pub fn add_edges(&mut self, edges: &[(u32, u32, bool)]) {
        for &(from, to, bidirectional) in edges {
            let cost = match (self.graph.position(from), self.graph.position(to)) {
                (Some(a), Some(b)) => a.distance(b),
                _ => {
                    error!("[ENGINE] add_edges: {}->{} skipped, endpoint inactive", from, to);
                    continue;
                }
            };
            if let Err(e) = self.add_edge(from, to, cost, bidirectional) {
                error!("[ENGINE] add_edges: {}->{} failed: {}", from, to, e);
            }
        }
    }

    /// Removes the first matching `from -> to` edge; the reverse direction
    /// of a bidirectional pair must be removed explicitly. Missing edges
    /// are a no-op.
    pub fn remove_edge(&mut self, from: u32, to: u32) {
        if self.graph.remove_edge(from, to) {
            if let Some(spatial) = &mut self.spatial {
                spatial.remove_edge(from, to);
            }
        }
    }

    /// Read-only edge enumeration. `include_incoming` performs a full scan
    /// of all sources.
    pub fn node_edges(
        &self,
        id: u32,
        include_bidirectional: bool,
        include_incoming: bool,
    ) -> SmallVec<[EdgeInfo; 8]> {
        self.graph.node_edges(id, include_bidirectional, include_incoming)
    }

    // ========================================================================
    // Pathfinding
    // ========================================================================

    /// Finds the optimal route from `start` to `goal`, writing node IDs
    /// (start..=goal inclusive) to `out`.
    ///
    /// `max_path` is advisory: it pre-sizes the output buffer, which still
    /// grows if the route is longer. Paths are never truncated.
    ///
    /// Consults the path cache first; a miss runs A* and caches the result
    /// (when it fits the configured cache path length).
    pub fn find_path(
        &mut self,
        start: u32,
        goal: u32,
        out: &mut Vec<u32>,
        max_path: u32,
    ) -> PathResult<u32> {
        if !self.graph.is_active(start) {
            return Err(PathError::StartNodeInvalid);
        }
        if !self.graph.is_active(goal) {
            return Err(PathError::GoalNodeInvalid);
        }
        if start == goal {
            out.clear();
            return Err(PathError::StartGoalNodeSame);
        }

        if self.path_cache.lookup(start, goal, &self.graph, out) {
            return Ok(out.len() as u32);
        }

        let length = self.run_search(start, goal, out, max_path)?;
        self.path_cache.insert(start, goal, out, &self.graph);
        Ok(length)
    }

    /// One cache-bypassing search with the graph-changed retry protocol.
    /// Acquires a heap slice per attempt and releases it before retrying,
    /// so nested searches stay LIFO on the pool.
    pub(crate) fn run_search(
        &mut self,
        start: u32,
        goal: u32,
        out: &mut Vec<u32>,
        max_path: u32,
    ) -> PathResult<u32> {
        out.clear();
        out.reserve(max_path as usize);

        for attempt in 0..=MAX_GRAPH_CHANGED_RETRIES {
            if attempt > 0 {
                warn!(
                    "[ASTAR] graph changed during search {}->{}, retry {}/{}",
                    start, goal, attempt, MAX_GRAPH_CHANGED_RETRIES
                );
            }
            let snapshot = (self.graph.node_version(), self.graph.edge_version());
            let lease = self.heap_pool.acquire(self.config.heap_pool_block_size)?;
            let result = {
                let Self { graph, heap_pool, distance_cache, search, .. } = self;
                let mut heap = MinHeap::new(heap_pool.slice_mut(&lease));
                astar::search(graph, distance_cache, search, &mut heap, start, goal, snapshot, out)
            };
            self.heap_pool.release(lease);

            match result {
                Err(PathError::GraphChanged) => continue,
                other => return other,
            }
        }
        Err(PathError::GraphChangedTooOften)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn path_cache_stats(&self) -> PathCacheStats {
        self.path_cache.stats()
    }

    pub fn distance_cache_stats(&self) -> DistanceCacheStats {
        self.distance_cache.stats()
    }

    /// `None` until the spatial index has been built (mode `Disabled`, or
    /// `Auto` below its node threshold).
    pub fn spatial_index_stats(&self) -> Option<SpatialIndexStats> {
        self.spatial.as_ref().map(|s| s.stats())
    }

    /// Switches the spatial index mode. Any existing grid is dropped and
    /// rebuilt lazily on the next projection query.
    pub fn set_spatial_index(&mut self, mode: SpatialIndexMode) {
        self.config.spatial_index = mode;
        self.spatial = None;
    }

    /// Rebuilds the spatial grid from the current graph state, recomputing
    /// bounds and cell size. Use after bulk mutations; single changes are
    /// tracked incrementally. A no-op until a grid has been built.
    pub fn rebuild_spatial_index(&mut self) {
        if let Some(spatial) = &mut self.spatial {
            let cell_size = match self.config.spatial_index {
                SpatialIndexMode::Enabled { cell_size } => cell_size,
                _ => None,
            };
            spatial.rebuild(&self.graph, cell_size);
        }
    }

    /// Drops both path tables, the distance cache, and the contents of any
    /// built spatial grid. Queries stay correct on the cleared grid via
    /// the full-scan fallback; call [`Self::rebuild_spatial_index`] to
    /// re-register the graph in one pass.
    pub fn clear_caches(&mut self) {
        self.path_cache.clear();
        self.distance_cache.clear();
        if let Some(spatial) = &mut self.spatial {
            spatial.clear();
        }
    }

    /// Builds the grid when the configured mode calls for one.
    pub(crate) fn maybe_build_spatial(&mut self) {
        if self.spatial.is_some() {
            return;
        }
        let cell_size = match self.config.spatial_index {
            SpatialIndexMode::Disabled => return,
            SpatialIndexMode::Enabled { cell_size } => cell_size,
            SpatialIndexMode::Auto => {
                if self.graph.active_count() < AUTO_SPATIAL_INDEX_THRESHOLD {
                    return;
                }
                None
            }
        };
        self.spatial = Some(SpatialIndex::build(&self.graph, cell_size));
    }

    #[cfg(test)]
    pub(crate) fn search_state_mut(&mut self) -> &mut SearchState {
        &mut self.search
    }

    #[cfg(test)]
    pub(crate) fn heap_cursor(&self) -> usize {
        self.heap_pool.cursor()
    }
}

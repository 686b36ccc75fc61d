//! Engine configuration. All capacities are fixed at construction; the hot
//! path never allocates beyond what is reserved here.

use serde::{Deserialize, Serialize};

/// Default search depth budget for virtual-node (projected) queries.
pub const DEFAULT_VIRTUAL_MAX_PATH: u32 = 64;

/// Node count at which [`SpatialIndexMode::Auto`] enables the spatial grid.
pub const AUTO_SPATIAL_INDEX_THRESHOLD: u32 = 100;

/// Controls whether edge projection queries use the uniform grid index.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SpatialIndexMode {
    /// Never build the grid; projection falls back to a full edge scan.
    Disabled,
    /// Build the grid once the graph holds at least
    /// [`AUTO_SPATIAL_INDEX_THRESHOLD`] active nodes.
    Auto,
    /// Always build the grid. `cell_size` of `None` auto-computes the cell
    /// size from the mean active-edge length.
    Enabled { cell_size: Option<f32> },
}

/// Static configuration for a [`Pathfinder`](crate::Pathfinder) instance.
///
/// These values define the memory footprint and search budgets and cannot
/// change after construction. Callers needing different capacities create a
/// new instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathfinderConfig {
    /// Maximum number of graph nodes (dense slot array size).
    pub max_nodes: u32,
    /// Maximum outgoing edges per node.
    pub max_edges_per_node: u32,
    /// Heap slice size acquired per A* search. Clamped to `max_nodes`
    /// (the pool capacity) at construction.
    pub heap_pool_block_size: u32,
    /// Longest path the path cache will store. Longer results are still
    /// returned to the caller, just not cached.
    pub max_cache_path_length: u32,
    /// Entry capacity of each path-cache table.
    pub path_cache_size: u32,
    /// Search depth budget for virtual-node queries.
    pub virtual_max_path: u32,
    /// Quantization cell for the point-to-node cache key. Start points
    /// within this distance of each other share a cache entry.
    pub point_cache_epsilon: f32,
    pub spatial_index: SpatialIndexMode,
}

impl Default for PathfinderConfig {
    fn default() -> Self {
        Self {
            max_nodes: 1024,
            max_edges_per_node: 8,
            heap_pool_block_size: 256,
            max_cache_path_length: 64,
            path_cache_size: 64,
            virtual_max_path: DEFAULT_VIRTUAL_MAX_PATH,
            point_cache_epsilon: 0.25,
            spatial_index: SpatialIndexMode::Auto,
        }
    }
}

impl PathfinderConfig {
    /// Convenience constructor mirroring the four core capacities; the
    /// remaining fields keep their defaults.
    pub fn new(
        max_nodes: u32,
        max_edges_per_node: u32,
        heap_pool_block_size: u32,
        max_cache_path_length: u32,
    ) -> Self {
        Self {
            max_nodes,
            max_edges_per_node,
            heap_pool_block_size,
            max_cache_path_length,
            ..Self::default()
        }
    }
}

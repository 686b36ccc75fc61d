//! # waygraph
//!
//! A 2D graph pathfinding engine for real-time simulations and games that
//! route hundreds to thousands of agents concurrently.
//!
//! The engine maintains a mutable weighted directed graph of positioned
//! nodes and answers shortest-path queries between node IDs, or from and
//! to arbitrary world positions that are first projected onto the graph.
//! Latency is kept deterministic by pre-allocating all state at
//! construction, and repeated queries are amortized by two caches (whole
//! paths and pairwise node distances) plus an optional uniform grid that
//! accelerates edge projection.
//!
//! ## Quick start
//!
//! ```rust
//! use waygraph::{Pathfinder, PathfinderConfig, Vec2};
//!
//! let mut pf = Pathfinder::new(PathfinderConfig::default());
//!
//! let a = pf.add_node(Vec2::new(0.0, 0.0)).unwrap();
//! let b = pf.add_node(Vec2::new(100.0, 0.0)).unwrap();
//! pf.add_edge(a, b, 100.0, true).unwrap();
//!
//! // Node-to-node query.
//! let mut path = Vec::new();
//! pf.find_path(a, b, &mut path, 16).unwrap();
//! assert_eq!(path, vec![a, b]);
//!
//! // Off-graph start: the point is projected onto the nearest edge.
//! let projected = pf.find_path_from_point(Vec2::new(50.0, 5.0), b, &mut path, 16).unwrap();
//! assert!((projected.entry_point.x - 50.0).abs() < 1e-3);
//! ```
//!
//! ## Threading
//!
//! An instance is single-threaded and every operation completes before
//! returning. Callers needing parallel queries shard their world across
//! multiple independent instances.

mod astar;
mod config;
mod distance_cache;
mod engine;
mod error;
mod graph;
mod heap;
mod math;
mod path_cache;
mod spatial_index;

pub use config::{
    PathfinderConfig, SpatialIndexMode, AUTO_SPATIAL_INDEX_THRESHOLD, DEFAULT_VIRTUAL_MAX_PATH,
};
pub use distance_cache::DistanceCacheStats;
pub use engine::{ExitPath, PathAnchor, Pathfinder, ProjectedPath};
pub use error::{PathError, PathResult};
pub use graph::{EdgeInfo, INVALID_ID};
pub use math::{project_on_segment, Vec2, EPSILON};
pub use path_cache::PathCacheStats;
pub use spatial_index::SpatialIndexStats;

//! Uniform grid over graph edges, accelerating nearest-edge projection.
//!
//! The grid covers the bounding box of all active nodes at build time. Each
//! directed edge is registered in every cell its axis-aligned bounding box
//! overlaps, so a point query only has to project onto the edges in its
//! 3x3 cell neighborhood instead of every edge in the graph. An empty
//! neighborhood falls back to the caller's full scan, so the index is an
//! accelerator only and never changes query results from "found" to
//! "not found".
//!
//! Cells hold plain vectors with swap-remove, keeping incremental updates
//! at O(cells spanned) per edge. Per-node entry lists make node moves and
//! removals O(incident entries).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::graph::GraphStore;
use crate::math::{self, Vec2};

#[cfg(test)]
mod tests;

/// Hard cap on grid cell count; the cell size grows until the grid fits.
const MAX_CELLS: usize = 1_000_000;

const MIN_CELL_SIZE: f32 = 10.0;
const MAX_CELL_SIZE: f32 = 500.0;

/// Cell size used when the graph has no edges to average over.
const FALLBACK_CELL_SIZE: f32 = 100.0;

/// Statistics exposed through
/// [`Pathfinder::spatial_index_stats`](crate::Pathfinder::spatial_index_stats).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SpatialIndexStats {
    pub cols: u32,
    pub rows: u32,
    pub cell_count: u32,
    pub edge_count: u32,
    pub avg_edges_per_cell: f32,
    pub max_edges_per_cell: u32,
}

#[derive(Clone, Copy)]
struct SpatialEdge {
    from: u32,
    to: u32,
    min: Vec2,
    max: Vec2,
}

pub(crate) struct SpatialIndex {
    origin: Vec2,
    cell_size: f32,
    cols: usize,
    rows: usize,
    /// Entry indices per cell, row-major.
    cells: Vec<Vec<u32>>,
    entries: Vec<SpatialEdge>,
    free: Vec<u32>,
    /// Entry indices per directed pair; duplicates stack.
    by_pair: HashMap<(u32, u32), SmallVec<[u32; 2]>>,
    /// Entry indices touching each node, for moves and removals.
    node_entries: Vec<SmallVec<[u32; 8]>>,
    live: u32,
}

impl SpatialIndex {
    /// Builds the grid from the current graph state and registers every
    /// active edge.
    pub fn build(graph: &GraphStore, explicit_cell_size: Option<f32>) -> Self {
        let (min, max) = bounds(graph);

        let mut cell_size = explicit_cell_size
            .unwrap_or_else(|| (mean_edge_length(graph) * 2.0).clamp(MIN_CELL_SIZE, MAX_CELL_SIZE));
        let (mut cols, mut rows) = dims(min, max, cell_size);
        while cols * rows > MAX_CELLS {
            cell_size *= 2.0;
            let d = dims(min, max, cell_size);
            cols = d.0;
            rows = d.1;
        }

        let mut index = Self {
            origin: min,
            cell_size,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
            entries: Vec::new(),
            free: Vec::new(),
            by_pair: HashMap::new(),
            node_entries: vec![SmallVec::new(); graph.max_nodes() as usize],
            live: 0,
        };
        graph.for_each_active_edge(|from, edge| index.add_edge(from, edge.to, graph));
        info!(
            "[SPATIAL_INDEX] built {}x{} grid, cell_size={:.1}, {} edge entries",
            cols, rows, cell_size, index.live
        );
        index
    }

    /// Drops all entries and re-registers the graph, recomputing bounds
    /// and (unless given explicitly) the cell size. Use after bulk
    /// changes; incremental updates are cheaper for single mutations.
    pub fn rebuild(&mut self, graph: &GraphStore, explicit_cell_size: Option<f32>) {
        *self = Self::build(graph, explicit_cell_size);
    }

    /// Drops every edge entry while keeping the grid geometry and cell
    /// allocations for reuse. A cleared grid finds nothing, so queries
    /// fall through to the caller's full scan until the grid is rebuilt
    /// or repopulated by edge mutations.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.entries.clear();
        self.free.clear();
        self.by_pair.clear();
        for list in &mut self.node_entries {
            list.clear();
        }
        self.live = 0;
    }

    fn cell_coords(&self, point: Vec2) -> (usize, usize) {
        let col = ((point.x - self.origin.x) / self.cell_size).floor() as isize;
        let row = ((point.y - self.origin.y) / self.cell_size).floor() as isize;
        (
            col.clamp(0, self.cols as isize - 1) as usize,
            row.clamp(0, self.rows as isize - 1) as usize,
        )
    }

    /// Cell range overlapped by an AABB, clamped to the grid.
    fn cell_range(&self, min: Vec2, max: Vec2) -> (usize, usize, usize, usize) {
        let (min_col, min_row) = self.cell_coords(min);
        let (max_col, max_row) = self.cell_coords(max);
        (min_col, min_row, max_col, max_row)
    }

    pub fn add_edge(&mut self, from: u32, to: u32, graph: &GraphStore) {
        let (Some(a), Some(b)) = (graph.position(from), graph.position(to)) else {
            return;
        };
        let entry = SpatialEdge {
            from,
            to,
            min: Vec2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Vec2::new(a.x.max(b.x), a.y.max(b.y)),
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.entries[idx as usize] = entry;
                idx
            }
            None => {
                self.entries.push(entry);
                (self.entries.len() - 1) as u32
            }
        };

        self.insert_into_cells(idx);
        self.by_pair.entry((from, to)).or_default().push(idx);
        self.node_entries[from as usize].push(idx);
        self.node_entries[to as usize].push(idx);
        self.live += 1;
    }

    pub fn remove_edge(&mut self, from: u32, to: u32) {
        let Some(stack) = self.by_pair.get_mut(&(from, to)) else {
            return;
        };
        let Some(idx) = stack.pop() else {
            return;
        };
        if stack.is_empty() {
            self.by_pair.remove(&(from, to));
        }
        self.remove_from_cells(idx);
        unlink(&mut self.node_entries[from as usize], idx);
        unlink(&mut self.node_entries[to as usize], idx);
        self.free.push(idx);
        self.live -= 1;
    }

    /// Re-registers every entry touching `node` after a position change.
    pub fn update_node_position(&mut self, node: u32, graph: &GraphStore) {
        if node as usize >= self.node_entries.len() {
            return;
        }
        let touched = self.node_entries[node as usize].clone();
        for idx in touched {
            self.remove_from_cells(idx);
            let entry = &mut self.entries[idx as usize];
            if let (Some(a), Some(b)) = (graph.position(entry.from), graph.position(entry.to)) {
                entry.min = Vec2::new(a.x.min(b.x), a.y.min(b.y));
                entry.max = Vec2::new(a.x.max(b.x), a.y.max(b.y));
            }
            self.insert_into_cells(idx);
        }
    }

    /// Drops every entry touching `node`. Called when the node is removed.
    pub fn invalidate_node(&mut self, node: u32) {
        if node as usize >= self.node_entries.len() {
            return;
        }
        let touched = std::mem::take(&mut self.node_entries[node as usize]);
        debug!("[SPATIAL_INDEX] invalidating node {}: {} entries", node, touched.len());
        for idx in touched {
            let entry = self.entries[idx as usize];
            self.remove_from_cells(idx);
            if let Some(stack) = self.by_pair.get_mut(&(entry.from, entry.to)) {
                unlink(stack, idx);
                if stack.is_empty() {
                    self.by_pair.remove(&(entry.from, entry.to));
                }
            }
            let other = if entry.from == node { entry.to } else { entry.from };
            unlink(&mut self.node_entries[other as usize], idx);
            self.free.push(idx);
            self.live -= 1;
        }
    }

    fn insert_into_cells(&mut self, idx: u32) {
        let entry = self.entries[idx as usize];
        let (min_col, min_row, max_col, max_row) = self.cell_range(entry.min, entry.max);
        for row in min_row..=max_row {
            for col in min_col..=max_col {
                self.cells[row * self.cols + col].push(idx);
            }
        }
    }

    fn remove_from_cells(&mut self, idx: u32) {
        let entry = self.entries[idx as usize];
        let (min_col, min_row, max_col, max_row) = self.cell_range(entry.min, entry.max);
        for row in min_row..=max_row {
            for col in min_col..=max_col {
                let cell = &mut self.cells[row * self.cols + col];
                if let Some(pos) = cell.iter().position(|&e| e == idx) {
                    cell.swap_remove(pos);
                }
            }
        }
    }

    /// Nearest edge to `point` among the 3x3 cell neighborhood. `None`
    /// when the neighborhood holds no edges; the caller then falls back to
    /// a full scan.
    pub fn query_nearest_edge(&self, point: Vec2, graph: &GraphStore) -> Option<(u32, u32, Vec2)> {
        let (col, row) = self.cell_coords(point);
        let min_col = col.saturating_sub(1);
        let min_row = row.saturating_sub(1);
        let max_col = (col + 1).min(self.cols - 1);
        let max_row = (row + 1).min(self.rows - 1);

        let mut best: Option<(u32, u32, Vec2)> = None;
        let mut best_dist_sq = f32::INFINITY;
        for r in min_row..=max_row {
            for c in min_col..=max_col {
                for &idx in &self.cells[r * self.cols + c] {
                    let entry = &self.entries[idx as usize];
                    let (Some(a), Some(b)) = (graph.position(entry.from), graph.position(entry.to))
                    else {
                        continue;
                    };
                    let (projection, dist_sq) = math::project_on_segment(point, a, b);
                    if dist_sq < best_dist_sq {
                        best_dist_sq = dist_sq;
                        best = Some((entry.from, entry.to, projection));
                    }
                }
            }
        }
        best
    }

    pub fn stats(&self) -> SpatialIndexStats {
        let total: usize = self.cells.iter().map(Vec::len).sum();
        let max = self.cells.iter().map(Vec::len).max().unwrap_or(0);
        SpatialIndexStats {
            cols: self.cols as u32,
            rows: self.rows as u32,
            cell_count: (self.cols * self.rows) as u32,
            edge_count: self.live,
            avg_edges_per_cell: if self.cells.is_empty() {
                0.0
            } else {
                total as f32 / self.cells.len() as f32
            },
            max_edges_per_cell: max as u32,
        }
    }
}

fn unlink<A: smallvec::Array<Item = u32>>(list: &mut SmallVec<A>, idx: u32) {
    if let Some(pos) = list.iter().position(|&e| e == idx) {
        list.swap_remove(pos);
    }
}

fn bounds(graph: &GraphStore) -> (Vec2, Vec2) {
    let mut min = Vec2::new(f32::INFINITY, f32::INFINITY);
    let mut max = Vec2::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
    let mut any = false;
    for id in graph.active_nodes() {
        if let Some(p) = graph.position(id) {
            any = true;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
    }
    if !any {
        (Vec2::ZERO, Vec2::ZERO)
    } else {
        (min, max)
    }
}

fn mean_edge_length(graph: &GraphStore) -> f32 {
    let mut total = 0.0f32;
    let mut count = 0u32;
    graph.for_each_active_edge(|from, edge| {
        if let (Some(a), Some(b)) = (graph.position(from), graph.position(edge.to)) {
            total += a.distance(b);
            count += 1;
        }
    });
    if count == 0 {
        FALLBACK_CELL_SIZE
    } else {
        total / count as f32
    }
}

fn dims(min: Vec2, max: Vec2, cell_size: f32) -> (usize, usize) {
    let cols = (((max.x - min.x) / cell_size).ceil() as usize).max(1);
    let rows = (((max.y - min.y) / cell_size).ceil() as usize).max(1);
    (cols, rows)
}

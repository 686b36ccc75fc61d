//! A* search core over the flat graph store.
//!
//! Scratch arrays are allocated once per engine instance and reset by a
//! generation counter stamped into each slot on first touch, so starting a
//! search costs O(nodes visited) rather than O(max_nodes).
//!
//! The open set uses lazy decrease-key: an improved f-score pushes a
//! duplicate heap entry and stale pops are skipped via the closed set.
//! Every expansion re-checks the graph version snapshot taken at search
//! start; a mismatch aborts with [`PathError::GraphChanged`] and the public
//! entry point retries.

use fixedbitset::FixedBitSet;

use crate::distance_cache::DistanceCache;
use crate::error::{PathError, PathResult};
use crate::graph::{GraphStore, INVALID_ID};
use crate::heap::MinHeap;

/// Retries the public entry points grant a search before giving up with
/// [`PathError::GraphChangedTooOften`].
pub(crate) const MAX_GRAPH_CHANGED_RETRIES: u32 = 3;

/// Per-instance search scratch, indexed by node ID.
pub(crate) struct SearchState {
    g_score: Vec<f32>,
    f_score: Vec<f32>,
    came_from: Vec<u32>,
    closed: FixedBitSet,
    generation: Vec<u32>,
    current_generation: u32,
    /// Test-only mutation simulator: called once per expansion, returns a
    /// (node_version, edge_version) skew added to the observed versions.
    /// Lets tests exercise the abort-and-retry protocol, which reentrant
    /// host callbacks would trigger in an event-loop embedding.
    #[cfg(test)]
    pub graph_change_probe: Option<Box<dyn FnMut() -> (u32, u32)>>,
}

impl SearchState {
    pub fn new(max_nodes: u32) -> Self {
        let n = max_nodes as usize;
        Self {
            g_score: vec![f32::INFINITY; n],
            f_score: vec![f32::INFINITY; n],
            came_from: vec![INVALID_ID; n],
            closed: FixedBitSet::with_capacity(n),
            generation: vec![0; n],
            current_generation: 0,
            #[cfg(test)]
            graph_change_probe: None,
        }
    }

    fn begin(&mut self) {
        self.current_generation = self.current_generation.wrapping_add(1);
        if self.current_generation == 0 {
            // Generation counter wrapped; resync every slot once.
            self.generation.fill(0);
            self.current_generation = 1;
        }
    }

    /// Lazily resets a slot the first time this search touches it.
    #[inline]
    fn touch(&mut self, id: u32) {
        let i = id as usize;
        if self.generation[i] != self.current_generation {
            self.generation[i] = self.current_generation;
            self.g_score[i] = f32::INFINITY;
            self.f_score[i] = f32::INFINITY;
            self.came_from[i] = INVALID_ID;
            self.closed.set(i, false);
        }
    }

    #[inline]
    fn is_closed(&self, id: u32) -> bool {
        self.generation[id as usize] == self.current_generation && self.closed.contains(id as usize)
    }
}

/// Runs one A* attempt from `start` to `goal` against the given version
/// snapshot. On success the reconstructed route (start..=goal inclusive)
/// is written to `out` and its length returned.
pub(crate) fn search(
    graph: &GraphStore,
    distance_cache: &mut DistanceCache,
    state: &mut SearchState,
    heap: &mut MinHeap<'_>,
    start: u32,
    goal: u32,
    snapshot: (u32, u32),
    out: &mut Vec<u32>,
) -> PathResult<u32> {
    let start_pos = graph.position(start).ok_or(PathError::StartNodeInvalid)?;
    let goal_pos = graph.position(goal).ok_or(PathError::GoalNodeInvalid)?;

    state.begin();
    state.touch(start);
    state.g_score[start as usize] = 0.0;
    let seed_f = distance_cache.get_or_compute(start, goal, start_pos, goal_pos);
    state.f_score[start as usize] = seed_f;
    heap.push(start, seed_f)?;

    while let Some(entry) = heap.pop() {
        let current = entry.node;
        if state.is_closed(current) || entry.f_score > state.f_score[current as usize] {
            // Stale duplicate from lazy decrease-key.
            continue;
        }
        if current == goal {
            return Ok(reconstruct(state, start, goal, out));
        }
        state.closed.set(current as usize, true);

        if observed_versions(graph, state) != snapshot {
            return Err(PathError::GraphChanged);
        }

        let current_g = state.g_score[current as usize];
        for edge in graph.outgoing(current) {
            let next = edge.to;
            let Some(next_pos) = graph.position(next) else {
                continue;
            };
            state.touch(next);
            if state.is_closed(next) {
                continue;
            }
            let tentative = current_g + edge.cost;
            if tentative < state.g_score[next as usize] {
                state.g_score[next as usize] = tentative;
                state.came_from[next as usize] = current;
                let h = distance_cache.get_or_compute(next, goal, next_pos, goal_pos);
                let f = tentative + h;
                state.f_score[next as usize] = f;
                heap.push(next, f)?;
            }
        }
    }

    Err(PathError::NoPath)
}

#[cfg(not(test))]
#[inline]
fn observed_versions(graph: &GraphStore, _state: &mut SearchState) -> (u32, u32) {
    (graph.node_version(), graph.edge_version())
}

/// Test builds let the expansion probe skew the observed versions, which
/// stands in for a host callback mutating the graph mid-search.
#[cfg(test)]
fn observed_versions(graph: &GraphStore, state: &mut SearchState) -> (u32, u32) {
    let mut observed = (graph.node_version(), graph.edge_version());
    if let Some(probe) = state.graph_change_probe.as_mut() {
        let (node_skew, edge_skew) = probe();
        observed.0 = observed.0.wrapping_add(node_skew);
        observed.1 = observed.1.wrapping_add(edge_skew);
    }
    observed
}

fn reconstruct(state: &SearchState, start: u32, goal: u32, out: &mut Vec<u32>) -> u32 {
    out.clear();
    let mut current = goal;
    loop {
        out.push(current);
        if current == start {
            break;
        }
        current = state.came_from[current as usize];
    }
    out.reverse();
    out.len() as u32
}

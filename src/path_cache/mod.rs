//! LRU path caches keyed by versioned graph state.
//!
//! Two fixed-capacity tables: node-to-node routes and point-to-node routes
//! (projected queries, keyed by the quantized start point). Entries record
//! the edge version and the per-node version of every node on the path at
//! insertion time; lookups validate those snapshots against the live graph
//! and treat any mismatch as a miss, evicting the stale entry. This lazy
//! strategy means mutations never have to hunt down affected entries.
//!
//! Entry storage is a slab allocated at construction; the per-entry path
//! buffers are reused across evictions so steady-state inserts do not
//! allocate.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::graph::GraphStore;
use crate::math::Vec2;

#[cfg(test)]
mod tests;

/// Counters exposed through
/// [`Pathfinder::path_cache_stats`](crate::Pathfinder::path_cache_stats).
/// Hit rate covers both tables.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PathCacheStats {
    pub node_entries: u32,
    pub point_entries: u32,
    pub capacity: u32,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f32,
}

struct CacheEntry<V> {
    path: Vec<u32>,
    node_versions: Vec<u32>,
    edge_version: u32,
    recency: u64,
    value: V,
}

struct LruTable<K: Eq + Hash + Copy, V: Copy> {
    map: HashMap<K, usize>,
    slab: Vec<CacheEntry<V>>,
    free: Vec<usize>,
}

impl<K: Eq + Hash + Copy, V: Copy> LruTable<K, V> {
    fn new(capacity: usize, max_path_length: usize, default_value: V) -> Self {
        let mut slab = Vec::with_capacity(capacity);
        let mut free = Vec::with_capacity(capacity);
        for i in 0..capacity {
            slab.push(CacheEntry {
                path: Vec::with_capacity(max_path_length),
                node_versions: Vec::with_capacity(max_path_length),
                edge_version: 0,
                recency: 0,
                value: default_value,
            });
            free.push(capacity - 1 - i);
        }
        Self { map: HashMap::with_capacity(capacity), slab, free }
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    /// Validated lookup. Copies the path into `out` and bumps recency on a
    /// hit; drops the entry and reports a miss when its snapshots disagree
    /// with the live graph.
    fn lookup(&mut self, key: K, graph: &GraphStore, tick: u64, out: &mut Vec<u32>) -> Option<V> {
        let slot = *self.map.get(&key)?;
        let entry = &self.slab[slot];

        let stale = entry.edge_version != graph.edge_version()
            || entry
                .path
                .iter()
                .zip(&entry.node_versions)
                .any(|(&node, &version)| graph.node_state(node) != Some(version));
        if stale {
            self.map.remove(&key);
            self.free.push(slot);
            return None;
        }

        let entry = &mut self.slab[slot];
        entry.recency = tick;
        out.clear();
        out.extend_from_slice(&entry.path);
        Some(entry.value)
    }

    fn insert(&mut self, key: K, path: &[u32], value: V, graph: &GraphStore, tick: u64) {
        let slot = if let Some(&slot) = self.map.get(&key) {
            slot
        } else if let Some(slot) = self.free.pop() {
            self.map.insert(key, slot);
            slot
        } else {
            // Evict the least recently used entry and take its slot.
            let (&old_key, &slot) = self
                .map
                .iter()
                .min_by_key(|(_, &slot)| self.slab[slot].recency)
                .expect("full table has entries");
            self.map.remove(&old_key);
            self.map.insert(key, slot);
            slot
        };

        let entry = &mut self.slab[slot];
        entry.path.clear();
        entry.path.extend_from_slice(path);
        entry.node_versions.clear();
        entry
            .node_versions
            .extend(path.iter().map(|&node| graph.node_state(node).unwrap_or(u32::MAX)));
        entry.edge_version = graph.edge_version();
        entry.recency = tick;
        entry.value = value;
    }

    fn clear(&mut self) {
        let slots: Vec<usize> = self.map.drain().map(|(_, slot)| slot).collect();
        self.free.extend(slots);
    }
}

/// Quantized point key: starts within one epsilon cell share an entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct QuantizedPoint(i32, i32);

fn quantize(point: Vec2, epsilon: f32) -> QuantizedPoint {
    QuantizedPoint((point.x / epsilon).floor() as i32, (point.y / epsilon).floor() as i32)
}

pub(crate) struct PathCache {
    node_table: LruTable<(u32, u32), ()>,
    point_table: LruTable<(QuantizedPoint, u32), Vec2>,
    max_path_length: usize,
    point_epsilon: f32,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl PathCache {
    pub fn new(capacity: u32, max_path_length: u32, point_epsilon: f32) -> Self {
        let capacity = capacity as usize;
        let max_path_length = max_path_length as usize;
        Self {
            node_table: LruTable::new(capacity, max_path_length, ()),
            point_table: LruTable::new(capacity, max_path_length, Vec2::ZERO),
            max_path_length,
            point_epsilon,
            tick: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn lookup(&mut self, start: u32, goal: u32, graph: &GraphStore, out: &mut Vec<u32>) -> bool {
        self.tick += 1;
        let hit = self
            .node_table
            .lookup((start, goal), graph, self.tick, out)
            .is_some();
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        hit
    }

    /// Caches a node-to-node route. Paths longer than the configured limit
    /// are returned to the caller uncached.
    pub fn insert(&mut self, start: u32, goal: u32, path: &[u32], graph: &GraphStore) {
        if path.len() > self.max_path_length {
            trace!(
                "[PATH_CACHE] skip caching {}-node path {}->{} (limit {})",
                path.len(),
                start,
                goal,
                self.max_path_length
            );
            return;
        }
        self.tick += 1;
        self.node_table.insert((start, goal), path, (), graph, self.tick);
    }

    /// Point-to-node lookup. On a hit returns the stored entry point and
    /// copies the path into `out`.
    pub fn lookup_projected(
        &mut self,
        start: Vec2,
        goal: u32,
        graph: &GraphStore,
        out: &mut Vec<u32>,
    ) -> Option<Vec2> {
        self.tick += 1;
        let key = (quantize(start, self.point_epsilon), goal);
        let entry_point = self.point_table.lookup(key, graph, self.tick, out);
        if entry_point.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        entry_point
    }

    pub fn insert_projected(
        &mut self,
        start: Vec2,
        goal: u32,
        path: &[u32],
        entry_point: Vec2,
        graph: &GraphStore,
    ) {
        if path.len() > self.max_path_length {
            return;
        }
        self.tick += 1;
        let key = (quantize(start, self.point_epsilon), goal);
        self.point_table.insert(key, path, entry_point, graph, self.tick);
    }

    pub fn clear(&mut self) {
        self.node_table.clear();
        self.point_table.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> PathCacheStats {
        let lookups = self.hits + self.misses;
        PathCacheStats {
            node_entries: self.node_table.len() as u32,
            point_entries: self.point_table.len() as u32,
            capacity: self.node_table.slab.len() as u32,
            hits: self.hits,
            misses: self.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f32 / lookups as f32
            },
        }
    }
}

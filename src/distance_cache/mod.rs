//! Pairwise Euclidean distance cache backing the A* heuristic.
//!
//! A fixed-size hash table with linear probing. Keys are unordered node
//! pairs hashed commutatively, so `get(a, b)` and `get(b, a)` land on the
//! same slot. Every live entry is linked into an intrusive chain per
//! endpoint, which makes invalidating one node O(entries touching it)
//! instead of a table sweep.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::INVALID_ID;
use crate::math::Vec2;


/// Probe window for lookups and inserts. A miss past this many occupied
/// slots falls through to a raw computation without caching.
const MAX_PROBES: usize = 8;

/// Upper bound on table size regardless of node count.
const MAX_TABLE_SIZE: u32 = 65_536;

/// Entries preserved across a resize; more than this and the table is
/// simply dropped to keep the scratch buffer bounded.
const RESIZE_PRESERVE_LIMIT: usize = 1024;

const NO_ENTRY: u32 = u32::MAX;

#[derive(Clone, Copy)]
struct Entry {
    /// Smaller node ID of the pair; `NO_ENTRY` marks a free slot.
    lo: u32,
    hi: u32,
    distance: f32,
    /// Next entry index in `lo`'s invalidation chain.
    next_lo: u32,
    /// Next entry index in `hi`'s invalidation chain.
    next_hi: u32,
}

impl Entry {
    const EMPTY: Self = Self {
        lo: NO_ENTRY,
        hi: NO_ENTRY,
        distance: 0.0,
        next_lo: NO_ENTRY,
        next_hi: NO_ENTRY,
    };

    #[inline]
    fn occupied(&self) -> bool {
        self.lo != NO_ENTRY
    }
}

/// Usage and performance counters, exposed through
/// [`Pathfinder::distance_cache_stats`](crate::Pathfinder::distance_cache_stats).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct DistanceCacheStats {
    pub size: u32,
    pub entries: u32,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f32,
}

pub(crate) struct DistanceCache {
    entries: Vec<Entry>,
    /// Head of each node's invalidation chain, indexed by node ID.
    heads: Vec<u32>,
    mask: u32,
    live: u32,
    hits: u64,
    misses: u64,
}

fn table_size(node_count: u32) -> u32 {
    (node_count.saturating_mul(8))
        .clamp(1, MAX_TABLE_SIZE)
        .next_power_of_two()
}

/// Commutative pair hash: callers pass `(min, max)` so h(a,b) == h(b,a).
#[inline]
fn pair_hash(lo: u32, hi: u32) -> u32 {
    let mut h = lo.wrapping_mul(0x9E37_79B1) ^ hi.wrapping_mul(0x85EB_CA77);
    h ^= h >> 16;
    h = h.wrapping_mul(0xC2B2_AE3D);
    h ^ (h >> 13)
}

impl DistanceCache {
    pub fn new(node_count: u32) -> Self {
        let size = table_size(node_count);
        Self {
            entries: vec![Entry::EMPTY; size as usize],
            heads: vec![NO_ENTRY; node_count as usize],
            mask: size - 1,
            live: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Cached distance between `a` and `b`, computing and inserting on a
    /// miss. The sentinel ID short-circuits to 0 and is never cached. When
    /// the probe window is saturated with unrelated pairs the distance is
    /// computed without caching.
    pub fn get_or_compute(&mut self, a: u32, b: u32, pos_a: Vec2, pos_b: Vec2) -> f32 {
        if a == INVALID_ID || b == INVALID_ID {
            return 0.0;
        }
        if a == b {
            return 0.0;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let base = pair_hash(lo, hi) & self.mask;

        let mut free_slot = None;
        for probe in 0..MAX_PROBES.min(self.entries.len()) {
            let slot = ((base as usize) + probe) & self.mask as usize;
            let entry = &self.entries[slot];
            if !entry.occupied() {
                if free_slot.is_none() {
                    free_slot = Some(slot);
                }
                continue;
            }
            if entry.lo == lo && entry.hi == hi {
                self.hits += 1;
                return entry.distance;
            }
        }

        self.misses += 1;
        let distance = pos_a.distance(pos_b);
        if let Some(slot) = free_slot {
            self.entries[slot] = Entry {
                lo,
                hi,
                distance,
                next_lo: self.heads[lo as usize],
                next_hi: self.heads[hi as usize],
            };
            self.heads[lo as usize] = slot as u32;
            self.heads[hi as usize] = slot as u32;
            self.live += 1;
        }
        distance
    }

    /// Invalidates every cached pair touching `node` by walking its chain.
    /// Entries are unlinked from both endpoints' chains so their slots can
    /// be reused immediately.
    pub fn invalidate(&mut self, node: u32) {
        if node as usize >= self.heads.len() {
            return;
        }
        let mut cursor = self.heads[node as usize];
        while cursor != NO_ENTRY {
            let entry = self.entries[cursor as usize];
            let other = if entry.lo == node { entry.hi } else { entry.lo };
            let next = if entry.lo == node { entry.next_lo } else { entry.next_hi };
            self.unlink_from_chain(other, cursor);
            self.entries[cursor as usize] = Entry::EMPTY;
            self.live -= 1;
            cursor = next;
        }
        self.heads[node as usize] = NO_ENTRY;
    }

    fn unlink_from_chain(&mut self, node: u32, slot: u32) {
        let mut cursor = self.heads[node as usize];
        if cursor == slot {
            self.heads[node as usize] = self.next_for(slot, node);
            return;
        }
        while cursor != NO_ENTRY {
            let next = self.next_for(cursor, node);
            if next == slot {
                let skip = self.next_for(slot, node);
                self.set_next_for(cursor, node, skip);
                return;
            }
            cursor = next;
        }
    }

    #[inline]
    fn next_for(&self, slot: u32, node: u32) -> u32 {
        let entry = &self.entries[slot as usize];
        if entry.lo == node {
            entry.next_lo
        } else {
            entry.next_hi
        }
    }

    #[inline]
    fn set_next_for(&mut self, slot: u32, node: u32, next: u32) {
        let entry = &mut self.entries[slot as usize];
        if entry.lo == node {
            entry.next_lo = next;
        } else {
            entry.next_hi = next;
        }
    }

    /// Rebuilds the table for a new node count. Live entries are carried
    /// over when there are at most [`RESIZE_PRESERVE_LIMIT`] of them;
    /// beyond that the table restarts cold.
    #[allow(dead_code)]
    pub fn resize(&mut self, new_node_count: u32) {
        let kept: Vec<(u32, u32, f32)> = if (self.live as usize) <= RESIZE_PRESERVE_LIMIT {
            self.entries
                .iter()
                .filter(|e| e.occupied())
                .map(|e| (e.lo, e.hi, e.distance))
                .collect()
        } else {
            debug!("[DIST_CACHE] resize dropping {} entries", self.live);
            Vec::new()
        };

        let size = table_size(new_node_count);
        self.entries = vec![Entry::EMPTY; size as usize];
        self.heads = vec![NO_ENTRY; new_node_count as usize];
        self.mask = size - 1;
        self.live = 0;

        for (lo, hi, distance) in kept {
            if hi >= new_node_count {
                continue;
            }
            self.reinsert(lo, hi, distance);
        }
    }

    fn reinsert(&mut self, lo: u32, hi: u32, distance: f32) {
        let base = pair_hash(lo, hi) & self.mask;
        for probe in 0..MAX_PROBES.min(self.entries.len()) {
            let slot = ((base as usize) + probe) & self.mask as usize;
            if !self.entries[slot].occupied() {
                self.entries[slot] = Entry {
                    lo,
                    hi,
                    distance,
                    next_lo: self.heads[lo as usize],
                    next_hi: self.heads[hi as usize],
                };
                self.heads[lo as usize] = slot as u32;
                self.heads[hi as usize] = slot as u32;
                self.live += 1;
                return;
            }
        }
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&mut self) {
        self.entries.fill(Entry::EMPTY);
        self.heads.fill(NO_ENTRY);
        self.live = 0;
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> DistanceCacheStats {
        let lookups = self.hits + self.misses;
        DistanceCacheStats {
            size: self.entries.len() as u32,
            entries: self.live,
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

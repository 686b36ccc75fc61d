use super::*;
use crate::graph::GraphStore;

fn chain_graph(count: u32) -> GraphStore {
    let mut graph = GraphStore::new(count, 4);
    for i in 0..count {
        graph.add_node(Vec2::new(i as f32 * 10.0, 0.0)).unwrap();
    }
    for i in 0..count - 1 {
        graph.add_edge(i, i + 1, 10.0, true).unwrap();
    }
    graph
}

#[test]
fn test_hit_returns_identical_path() {
    let graph = chain_graph(4);
    let mut cache = PathCache::new(8, 16, 0.25);
    cache.insert(0, 3, &[0, 1, 2, 3], &graph);

    let mut out = Vec::new();
    assert!(cache.lookup(0, 3, &graph, &mut out));
    assert_eq!(out, vec![0, 1, 2, 3]);

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.node_entries), (1, 1));
}

#[test]
fn test_moving_a_path_node_invalidates_the_entry() {
    let mut graph = chain_graph(4);
    let mut cache = PathCache::new(8, 16, 0.25);
    cache.insert(0, 3, &[0, 1, 2, 3], &graph);

    graph.move_node(2, Vec2::new(25.0, 5.0));

    let mut out = Vec::new();
    assert!(!cache.lookup(0, 3, &graph, &mut out), "Per-node version mismatch must miss");
    assert_eq!(cache.stats().node_entries, 0, "Stale entry is evicted on lookup");
}

#[test]
fn test_edge_mutation_invalidates_all_entries() {
    let mut graph = chain_graph(4);
    let mut cache = PathCache::new(8, 16, 0.25);
    cache.insert(0, 3, &[0, 1, 2, 3], &graph);
    cache.insert(1, 3, &[1, 2, 3], &graph);

    // Any edge_version bump invalidates lazily at the next lookup.
    graph.remove_edge(0, 1);

    let mut out = Vec::new();
    assert!(!cache.lookup(0, 3, &graph, &mut out));
    assert!(!cache.lookup(1, 3, &graph, &mut out));
}

#[test]
fn test_removed_node_invalidates_entry() {
    let mut graph = chain_graph(4);
    let mut cache = PathCache::new(8, 16, 0.25);
    cache.insert(0, 2, &[0, 1, 2], &graph);

    graph.remove_node(1);

    let mut out = Vec::new();
    assert!(!cache.lookup(0, 2, &graph, &mut out), "Inactive path node must miss");
}

#[test]
fn test_paths_over_limit_are_not_cached() {
    let graph = chain_graph(6);
    let mut cache = PathCache::new(8, 3, 0.25);
    cache.insert(0, 5, &[0, 1, 2, 3, 4, 5], &graph);
    assert_eq!(cache.stats().node_entries, 0);
}

#[test]
fn test_lru_eviction_drops_least_recently_used() {
    let graph = chain_graph(6);
    let mut cache = PathCache::new(2, 16, 0.25);
    let mut out = Vec::new();

    cache.insert(0, 1, &[0, 1], &graph);
    cache.insert(1, 2, &[1, 2], &graph);

    // Touch (0,1) so (1,2) becomes the LRU victim.
    assert!(cache.lookup(0, 1, &graph, &mut out));
    cache.insert(2, 3, &[2, 3], &graph);

    assert!(cache.lookup(0, 1, &graph, &mut out), "Recently used entry survives");
    assert!(!cache.lookup(1, 2, &graph, &mut out), "LRU entry was evicted");
    assert!(cache.lookup(2, 3, &graph, &mut out));
}

#[test]
fn test_projected_lookup_quantizes_start_point() {
    let graph = chain_graph(3);
    let mut cache = PathCache::new(8, 16, 0.5);
    let entry_point = Vec2::new(5.0, 0.0);
    cache.insert_projected(Vec2::new(5.1, 0.1), 2, &[1, 2], entry_point, &graph);

    let mut out = Vec::new();
    // Same quantization cell: hit.
    let hit = cache.lookup_projected(Vec2::new(5.3, 0.3), 2, &graph, &mut out);
    assert_eq!(hit, Some(entry_point));
    assert_eq!(out, vec![1, 2]);

    // Far away point: different cell, miss.
    assert!(cache
        .lookup_projected(Vec2::new(50.0, 0.0), 2, &graph, &mut out)
        .is_none());
}

#[test]
fn test_projected_entries_validate_versions_too() {
    let mut graph = chain_graph(3);
    let mut cache = PathCache::new(8, 16, 0.5);
    cache.insert_projected(Vec2::new(5.0, 0.0), 2, &[1, 2], Vec2::new(5.0, 0.0), &graph);

    graph.move_node(1, Vec2::new(11.0, 3.0));

    let mut out = Vec::new();
    assert!(cache
        .lookup_projected(Vec2::new(5.0, 0.0), 2, &graph, &mut out)
        .is_none());
}

#[test]
fn test_clear_empties_both_tables() {
    let graph = chain_graph(3);
    let mut cache = PathCache::new(8, 16, 0.25);
    cache.insert(0, 2, &[0, 1, 2], &graph);
    cache.insert_projected(Vec2::ZERO, 2, &[1, 2], Vec2::ZERO, &graph);

    cache.clear();
    let stats = cache.stats();
    assert_eq!((stats.node_entries, stats.point_entries), (0, 0));

    // Slots are reusable after clear.
    cache.insert(0, 2, &[0, 1, 2], &graph);
    let mut out = Vec::new();
    assert!(cache.lookup(0, 2, &graph, &mut out));
}

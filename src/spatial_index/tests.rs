use super::*;

fn grid_graph() -> GraphStore {
    // A 100x100 square of four nodes with edges along the sides.
    let mut graph = GraphStore::new(16, 4);
    graph.add_node(Vec2::new(0.0, 0.0)).unwrap(); // 0
    graph.add_node(Vec2::new(100.0, 0.0)).unwrap(); // 1
    graph.add_node(Vec2::new(100.0, 100.0)).unwrap(); // 2
    graph.add_node(Vec2::new(0.0, 100.0)).unwrap(); // 3
    graph.add_edge(0, 1, 100.0, true).unwrap();
    graph.add_edge(1, 2, 100.0, true).unwrap();
    graph.add_edge(2, 3, 100.0, true).unwrap();
    graph.add_edge(3, 0, 100.0, true).unwrap();
    graph
}

#[test]
fn test_build_registers_all_directed_edges() {
    let graph = grid_graph();
    let index = SpatialIndex::build(&graph, None);
    let stats = index.stats();
    assert_eq!(stats.edge_count, 8, "Four bidirectional pairs register both directions");
    assert!(stats.cell_count >= 1);
}

#[test]
fn test_query_returns_nearest_edge_projection() {
    let graph = grid_graph();
    let index = SpatialIndex::build(&graph, Some(50.0));

    // Just above the bottom side: nearest edge is 0<->1, projection (40, 0).
    let (from, to, projection) = index
        .query_nearest_edge(Vec2::new(40.0, 5.0), &graph)
        .expect("neighborhood should contain the bottom edge");
    assert!(
        (from == 0 && to == 1) || (from == 1 && to == 0),
        "Expected the bottom edge, got {}->{}",
        from,
        to
    );
    assert!((projection.x - 40.0).abs() < 1e-3);
    assert!(projection.y.abs() < 1e-3);
}

#[test]
fn test_query_from_outside_bounds_clamps_into_grid() {
    let graph = grid_graph();
    let index = SpatialIndex::build(&graph, Some(50.0));

    let result = index.query_nearest_edge(Vec2::new(50.0, -500.0), &graph);
    let (from, to, _) = result.expect("clamped query should still find border edges");
    assert!((from == 0 && to == 1) || (from == 1 && to == 0));
}

#[test]
fn test_remove_edge_removes_one_direction_only() {
    let graph = grid_graph();
    let mut index = SpatialIndex::build(&graph, None);

    index.remove_edge(0, 1);
    assert_eq!(index.stats().edge_count, 7);

    index.remove_edge(1, 0);
    assert_eq!(index.stats().edge_count, 6);

    // Removing a missing pair is a no-op.
    index.remove_edge(0, 1);
    assert_eq!(index.stats().edge_count, 6);
}

#[test]
fn test_invalidate_node_drops_all_incident_entries() {
    let graph = grid_graph();
    let mut index = SpatialIndex::build(&graph, None);

    // Node 0 touches the pairs (0,1), (1,0), (3,0), (0,3).
    index.invalidate_node(0);
    assert_eq!(index.stats().edge_count, 4);

    let (from, to, _) = index
        .query_nearest_edge(Vec2::new(50.0, 95.0), &graph)
        .expect("top edge still registered");
    assert!((from == 2 && to == 3) || (from == 3 && to == 2));
}

#[test]
fn test_update_node_position_moves_entries_between_cells() {
    let mut graph = grid_graph();
    let mut index = SpatialIndex::build(&graph, Some(25.0));

    // Drag the bottom-right corner far right; the bottom edge now spans
    // new cells and a query near the new corner must see it.
    graph.move_node(1, Vec2::new(300.0, 0.0));
    index.update_node_position(1, &graph);

    let (from, to, projection) = index
        .query_nearest_edge(Vec2::new(290.0, 10.0), &graph)
        .expect("stretched edge should be discoverable near its new extent");
    assert!(from == 1 || to == 1);
    assert!((projection.y - 0.0).abs() < 1e-3 || projection.x >= 100.0);
}

#[test]
fn test_duplicate_edges_stack_and_unstack() {
    let mut graph = GraphStore::new(4, 4);
    graph.add_node(Vec2::new(0.0, 0.0)).unwrap();
    graph.add_node(Vec2::new(10.0, 0.0)).unwrap();
    graph.add_edge(0, 1, 10.0, false).unwrap();
    graph.add_edge(0, 1, 10.0, false).unwrap();

    let mut index = SpatialIndex::build(&graph, None);
    assert_eq!(index.stats().edge_count, 2);

    index.remove_edge(0, 1);
    assert_eq!(index.stats().edge_count, 1);
    assert!(index.query_nearest_edge(Vec2::new(5.0, 1.0), &graph).is_some());
}

#[test]
fn test_cell_size_grows_to_respect_cell_cap() {
    let mut graph = GraphStore::new(4, 4);
    graph.add_node(Vec2::new(0.0, 0.0)).unwrap();
    graph.add_node(Vec2::new(1.0e6, 1.0e6)).unwrap();
    graph.add_edge(0, 1, 1.5e6, false).unwrap();

    // An explicit 10-unit cell over a 1e6 square would need 1e10 cells.
    let index = SpatialIndex::build(&graph, Some(10.0));
    assert!(index.stats().cell_count as usize <= MAX_CELLS);
}

#[test]
fn test_rebuild_matches_fresh_build() {
    let graph = grid_graph();
    let mut index = SpatialIndex::build(&graph, None);
    index.invalidate_node(0);

    index.rebuild(&graph, None);
    assert_eq!(index.stats().edge_count, 8);
}

#[test]
fn test_rebuild_honors_explicit_cell_size() {
    let graph = grid_graph();
    let mut index = SpatialIndex::build(&graph, None);
    index.rebuild(&graph, Some(50.0));

    let stats = index.stats();
    assert_eq!(stats.edge_count, 8);
    assert_eq!((stats.cols, stats.rows), (2, 2));
}

#[test]
fn test_clear_empties_grid_but_keeps_geometry() {
    let graph = grid_graph();
    let mut index = SpatialIndex::build(&graph, Some(50.0));
    let cells_before = index.stats().cell_count;

    index.clear();

    let stats = index.stats();
    assert_eq!(stats.edge_count, 0);
    assert_eq!(stats.max_edges_per_cell, 0);
    assert_eq!(stats.cell_count, cells_before, "Grid geometry survives a clear");
    assert!(
        index.query_nearest_edge(Vec2::new(40.0, 5.0), &graph).is_none(),
        "Cleared grid finds nothing; callers fall back to a full scan"
    );

    // The cleared grid accepts fresh registrations.
    index.add_edge(0, 1, &graph);
    assert_eq!(index.stats().edge_count, 1);
    assert!(index.query_nearest_edge(Vec2::new(40.0, 5.0), &graph).is_some());
}

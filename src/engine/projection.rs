//! Projected queries and the virtual-node protocol.
//!
//! Off-graph start or end positions are projected onto the nearest edge,
//! where a transient "virtual" node is installed in a regular graph slot
//! and wired to the edge's endpoints with Euclidean costs. A* then runs
//! against the augmented graph and the virtual node is removed on every
//! exit path, success or failure, before the result is returned. Returned
//! paths never contain a virtual node; callers receive the projection
//! points separately and walk to them before following the node route.

use tracing::debug;

use crate::error::{PathError, PathResult};
use crate::math::Vec2;

use super::{ExitPath, PathAnchor, Pathfinder, ProjectedPath};

/// Which way a virtual node is wired to its host edge `u -> v`.
///
/// Travel toward `u` (for starts) or from `v` (for ends) goes against the
/// edge direction and is only wired when the reverse edge `v -> u` exists.
enum VirtualLink {
    /// Start virtual: edges lead out of the virtual node onto the graph.
    FromVirtual,
    /// Exit virtual: edges lead from the endpoints into the virtual node.
    IntoVirtual,
}

impl Pathfinder {
    /// Finds a route from an arbitrary world position to `goal`.
    ///
    /// The returned path excludes the transient start; `entry_point` is
    /// the projection of `point` onto the nearest edge. Results are cached
    /// in the point-to-node table keyed by the quantized start, so nearby
    /// repeat queries skip the whole protocol.
    pub fn find_path_from_point(
        &mut self,
        point: Vec2,
        goal: u32,
        out: &mut Vec<u32>,
        max_path: u32,
    ) -> PathResult<ProjectedPath> {
        if let Some(entry_point) = self.path_cache.lookup_projected(point, goal, &self.graph, out) {
            return Ok(ProjectedPath { length: out.len() as u32, entry_point });
        }

        // An edgeless graph cannot be projected onto; that outranks goal
        // validation, so an empty graph reports NoProjection.
        let (edge_from, edge_to, entry_point) =
            self.nearest_edge(point).ok_or(PathError::NoProjection)?;
        if !self.graph.is_active(goal) {
            return Err(PathError::GoalNodeInvalid);
        }
        let budget = max_path.max(self.config.virtual_max_path);

        let virtual_id =
            self.install_virtual_node(entry_point, edge_from, edge_to, VirtualLink::FromVirtual)?;
        let result = self.run_search(virtual_id, goal, out, budget);
        self.remove_node(virtual_id);

        result?;
        if out.first() == Some(&virtual_id) {
            out.remove(0);
        }
        self.path_cache.insert_projected(point, goal, out, entry_point, &self.graph);
        Ok(ProjectedPath { length: out.len() as u32, entry_point })
    }

    /// Finds a route ending at an arbitrary world position, starting from
    /// either a node or a second arbitrary position.
    ///
    /// Node starts install one virtual exit node; point starts install a
    /// virtual node at each projection. Both are removed on every exit
    /// path and never appear in the returned route.
    pub fn find_path_with_exit(
        &mut self,
        start: PathAnchor,
        end_point: Vec2,
        out: &mut Vec<u32>,
        max_path: u32,
    ) -> PathResult<ExitPath> {
        let budget = max_path.max(self.config.virtual_max_path);
        match start {
            PathAnchor::Node(start_id) => {
                if !self.graph.is_active(start_id) {
                    return Err(PathError::StartNodeInvalid);
                }
                let (exit_from, exit_to, exit_point) =
                    self.nearest_edge(end_point).ok_or(PathError::NoProjection)?;

                let exit_id = self.install_virtual_node(
                    exit_point,
                    exit_from,
                    exit_to,
                    VirtualLink::IntoVirtual,
                )?;
                let result = self.run_search(start_id, exit_id, out, budget);
                self.remove_node(exit_id);

                result?;
                if out.last() == Some(&exit_id) {
                    out.pop();
                }
                Ok(ExitPath { length: out.len() as u32, entry_point: None, exit_point })
            }
            PathAnchor::Point(start_point) => {
                // Both projections are taken before any virtual geometry
                // exists, so neither can land on a transient edge.
                let (entry_from, entry_to, entry_point) =
                    self.nearest_edge(start_point).ok_or(PathError::NoProjection)?;
                let (exit_from, exit_to, exit_point) =
                    self.nearest_edge(end_point).ok_or(PathError::NoProjection)?;

                let entry_id = self.install_virtual_node(
                    entry_point,
                    entry_from,
                    entry_to,
                    VirtualLink::FromVirtual,
                )?;
                let exit_id = match self.install_virtual_node(
                    exit_point,
                    exit_from,
                    exit_to,
                    VirtualLink::IntoVirtual,
                ) {
                    Ok(id) => id,
                    Err(e) => {
                        self.remove_node(entry_id);
                        return Err(e);
                    }
                };

                let result = self.run_search(entry_id, exit_id, out, budget);
                self.remove_node(exit_id);
                self.remove_node(entry_id);

                result?;
                if out.first() == Some(&entry_id) {
                    out.remove(0);
                }
                if out.last() == Some(&exit_id) {
                    out.pop();
                }
                Ok(ExitPath {
                    length: out.len() as u32,
                    entry_point: Some(entry_point),
                    exit_point,
                })
            }
        }
    }

    /// Nearest active edge to `point`: grid neighborhood first, then a
    /// full scan over all active edges. `None` only when the graph has no
    /// edges at all.
    fn nearest_edge(&mut self, point: Vec2) -> Option<(u32, u32, Vec2)> {
        self.maybe_build_spatial();
        if let Some(spatial) = &self.spatial {
            if let Some(hit) = spatial.query_nearest_edge(point, &self.graph) {
                return Some(hit);
            }
        }

        let mut best: Option<(u32, u32, Vec2)> = None;
        let mut best_dist_sq = f32::INFINITY;
        let graph = &self.graph;
        graph.for_each_active_edge(|from, edge| {
            let (Some(a), Some(b)) = (graph.position(from), graph.position(edge.to)) else {
                return;
            };
            let (projection, dist_sq) = crate::math::project_on_segment(point, a, b);
            if dist_sq < best_dist_sq {
                best_dist_sq = dist_sq;
                best = Some((from, edge.to, projection));
            }
        });
        best
    }

    /// Installs a transient node at `position` wired to the host edge per
    /// `link`. Rolls the node (and any partial edges) back on failure.
    fn install_virtual_node(
        &mut self,
        position: Vec2,
        edge_from: u32,
        edge_to: u32,
        link: VirtualLink,
    ) -> PathResult<u32> {
        let id = self.add_node(position)?;
        if let Err(e) = self.connect_virtual(id, position, edge_from, edge_to, link) {
            debug!("[PROJECTION] rolling back virtual node {}: {}", id, e);
            self.remove_node(id);
            return Err(e);
        }
        Ok(id)
    }

    fn connect_virtual(
        &mut self,
        id: u32,
        position: Vec2,
        edge_from: u32,
        edge_to: u32,
        link: VirtualLink,
    ) -> PathResult<()> {
        let (Some(from_pos), Some(to_pos)) =
            (self.graph.position(edge_from), self.graph.position(edge_to))
        else {
            return Err(PathError::VirtualNodeFailed);
        };
        // Capacity problems surface as-is; anything else wiring a virtual
        // node is a protocol failure.
        let wire = |e: PathError| match e {
            PathError::EdgeFull | PathError::NodeFull => e,
            _ => PathError::VirtualNodeFailed,
        };
        let reverse_exists = self.graph.has_edge(edge_to, edge_from);

        match link {
            VirtualLink::FromVirtual => {
                self.add_edge(id, edge_to, position.distance(to_pos), false).map_err(wire)?;
                if reverse_exists {
                    self.add_edge(id, edge_from, position.distance(from_pos), false)
                        .map_err(wire)?;
                }
            }
            VirtualLink::IntoVirtual => {
                self.add_edge(edge_from, id, from_pos.distance(position), false).map_err(wire)?;
                if reverse_exists {
                    self.add_edge(edge_to, id, to_pos.distance(position), false).map_err(wire)?;
                }
            }
        }
        Ok(())
    }
}

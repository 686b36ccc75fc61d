//! Status taxonomy for all fallible engine operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the engine. A successful operation is `Ok`;
/// every failure is one of the closed set of [`PathError`] variants.
pub type PathResult<T> = Result<T, PathError>;

/// Failure statuses for graph mutation and pathfinding operations.
///
/// The set is closed: no operation produces an error outside this enum.
/// `GraphChanged` is recovered internally by the retry protocol and only
/// escapes as [`PathError::GraphChangedTooOften`] after the retry budget
/// is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum PathError {
    #[error("no valid path found between start and goal nodes")]
    NoPath,

    #[error("start node ID and goal node ID are the same")]
    StartGoalNodeSame,

    #[error("invalid or inactive start node ID")]
    StartNodeInvalid,

    #[error("invalid or inactive goal node ID")]
    GoalNodeInvalid,

    #[error("node capacity reached, cannot add more nodes")]
    NodeFull,

    #[error("edge capacity reached, cannot add more edges")]
    EdgeFull,

    #[error("heap pool exhausted during pathfinding (increase pool block size)")]
    HeapFull,

    /// Reserved. Paths are never truncated; the output buffer grows instead.
    #[error("path exceeds maximum allowed length")]
    PathTooLong,

    #[error("graph modified during pathfinding, retrying")]
    GraphChanged,

    #[error("graph changed too often during pathfinding (>3 retries)")]
    GraphChangedTooOften,

    #[error("cannot project point onto graph (no edges exist)")]
    NoProjection,

    #[error("failed to create or connect virtual node")]
    VirtualNodeFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_strings_are_stable() {
        assert_eq!(
            PathError::NoPath.to_string(),
            "no valid path found between start and goal nodes"
        );
        assert_eq!(
            PathError::GraphChangedTooOften.to_string(),
            "graph changed too often during pathfinding (>3 retries)"
        );
    }
}

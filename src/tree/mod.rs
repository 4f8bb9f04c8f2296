//! Pure nested-set arithmetic.
//!
//! Nothing in this module performs I/O. The repository and service layers feed
//! it boundary values read inside a transaction and apply the deltas it returns.

pub mod arithmetic;
pub mod rebuild;
pub mod verify;

use uuid::Uuid;

pub use arithmetic::{
    compute_deletion_boundaries, compute_insertion_boundaries, compute_move_boundaries,
    compute_subtree_width, Bounds, DeletionBoundaries, InsertionBoundaries, MoveBoundaries,
    Position,
};
pub use rebuild::{number_forest, FlatNode, NumberedNode};
pub use verify::{check_forest, NodeSnapshot, TreeViolation, ViolationKind};

/// Errors raised by the pure tree computations. All of them describe malformed
/// input and surface to callers as validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("invalid boundaries: left {left} must be smaller than right {right}")]
    InvalidBounds { left: i32, right: i32 },

    #[error("target position {target} lies inside the moved subtree [{left}, {right}]")]
    TargetInsideSubtree { target: i32, left: i32, right: i32 },

    #[error("invalid position '{0}', expected 'first' or 'last'")]
    InvalidPosition(String),

    #[error("category {id} references unknown parent {parent_id}")]
    UnknownParent { id: Uuid, parent_id: Uuid },

    #[error("category {0} appears more than once")]
    DuplicateId(Uuid),

    #[error("parent links form a cycle involving {count} categories (e.g. {sample})")]
    Cycle { sample: Uuid, count: usize },
}

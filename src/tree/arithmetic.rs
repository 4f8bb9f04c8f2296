use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::TreeError;

/// Width every freshly inserted leaf occupies.
pub const LEAF_WIDTH: i32 = 2;

/// Where a node lands among its new siblings.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Position {
    /// Immediately after the parent's own `left`.
    First,
    /// Immediately before the parent's own `right`, after all existing children.
    #[default]
    Last,
}

impl FromStr for Position {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Position::First),
            "last" => Ok(Position::Last),
            _ => Err(TreeError::InvalidPosition(s.to_string())),
        }
    }
}

/// The `(left, right)` pair of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub right: i32,
}

impl Bounds {
    pub fn new(left: i32, right: i32) -> Result<Self, TreeError> {
        if left >= right {
            return Err(TreeError::InvalidBounds { left, right });
        }
        Ok(Self { left, right })
    }

    /// A virtual parent enclosing the whole forest. Roots are inserted and
    /// moved relative to it, so root placement uses the same arithmetic as
    /// child placement. `max_right` is the largest live `right` (0 when empty).
    pub fn virtual_root(max_right: i32) -> Self {
        Self {
            left: 0,
            right: max_right.max(0) + 1,
        }
    }

    /// True when `value` falls within `[left, right]`.
    pub fn encloses(&self, value: i32) -> bool {
        self.left <= value && value <= self.right
    }
}

/// Boundary changes for inserting a single leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertionBoundaries {
    pub new_left: i32,
    pub new_right: i32,
    /// Added to every live `left` and `right` that is `>= shift_from_boundary`.
    pub shift_amount: i32,
    pub shift_from_boundary: i32,
}

/// The integer a new child of `parent` will occupy as its `left`.
pub fn insertion_point(parent: Bounds, position: Position) -> i32 {
    match position {
        Position::First => parent.left + 1,
        Position::Last => parent.right,
    }
}

/// Computes the boundaries for a new leaf under `parent`.
///
/// `Last` shifts every boundary `>= parent.right` by two and gives the new node
/// `(parent.right, parent.right + 1)`. `First` shifts every boundary
/// `> parent.left` by two and gives it `(parent.left + 1, parent.left + 2)`.
pub fn compute_insertion_boundaries(parent: Bounds, position: Position) -> InsertionBoundaries {
    let point = insertion_point(parent, position);
    InsertionBoundaries {
        new_left: point,
        new_right: point + 1,
        shift_amount: LEAF_WIDTH,
        shift_from_boundary: point,
    }
}

/// `right - left + 1`; always even and at least 2 for a valid node.
pub fn compute_subtree_width(node: Bounds) -> i32 {
    node.right - node.left + 1
}

/// The three-phase plan for moving a subtree.
///
/// The repository executes it as: park the subtree in negative space so no
/// range shift can touch it, close the gap it left, open a gap at the target,
/// then translate the parked rows into that gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MoveBoundaries {
    /// Original boundaries of the moved root.
    pub subtree: Bounds,
    pub width: i32,
    /// Added to every subtree row to park it; parked range is `[left + park_offset, -1]`.
    pub park_offset: i32,
    /// Phase (a): every live boundary `>= close_from` shifts by `-width`.
    pub close_from: i32,
    /// Phase (b): every live boundary `>= open_from` shifts by `+width`.
    pub open_from: i32,
    /// Net translation of every moved row, `new_left - subtree.left`.
    pub translation: i32,
    pub new_left: i32,
    pub new_right: i32,
}

impl MoveBoundaries {
    /// The move would leave every boundary where it is.
    pub fn is_noop(&self) -> bool {
        self.translation == 0
    }

    pub fn parked(&self) -> Bounds {
        Bounds {
            left: self.subtree.left + self.park_offset,
            right: self.subtree.right + self.park_offset,
        }
    }

    /// Translation applied to the parked rows in phase (c).
    pub fn unpark_translation(&self) -> i32 {
        self.new_left - self.parked().left
    }
}

/// Plans moving the subtree rooted at `subtree` under `new_parent`.
///
/// `new_parent` may be [`Bounds::virtual_root`] to move to root level. A new
/// parent inside `[subtree.left, subtree.right]` (the node itself or one of its
/// descendants) is rejected.
pub fn compute_move_boundaries(
    subtree: Bounds,
    new_parent: Bounds,
    position: Position,
) -> Result<MoveBoundaries, TreeError> {
    if subtree.left >= subtree.right {
        return Err(TreeError::InvalidBounds {
            left: subtree.left,
            right: subtree.right,
        });
    }

    if subtree.encloses(new_parent.left) {
        return Err(TreeError::TargetInsideSubtree {
            target: new_parent.left,
            left: subtree.left,
            right: subtree.right,
        });
    }

    let target = insertion_point(new_parent, position);
    if target > subtree.left && target <= subtree.right {
        return Err(TreeError::TargetInsideSubtree {
            target,
            left: subtree.left,
            right: subtree.right,
        });
    }

    let width = compute_subtree_width(subtree);
    let park_offset = -(subtree.right + 1);

    // Already sitting at the target slot.
    if target == subtree.left || target == subtree.right + 1 {
        return Ok(MoveBoundaries {
            subtree,
            width,
            park_offset,
            close_from: subtree.right + 1,
            open_from: subtree.left,
            translation: 0,
            new_left: subtree.left,
            new_right: subtree.right,
        });
    }

    // Target coordinates once the gap behind the subtree has been closed.
    let new_left = if target > subtree.right {
        target - width
    } else {
        target
    };

    Ok(MoveBoundaries {
        subtree,
        width,
        park_offset,
        close_from: subtree.right + 1,
        open_from: new_left,
        translation: new_left - subtree.left,
        new_left,
        new_right: new_left + width - 1,
    })
}

/// Boundary compaction after physically removing a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeletionBoundaries {
    pub freed: Bounds,
    pub width: i32,
    /// Every live boundary `>= shift_from` shifts by `-width`.
    pub shift_from: i32,
}

pub fn compute_deletion_boundaries(node: Bounds) -> DeletionBoundaries {
    DeletionBoundaries {
        freed: node,
        width: compute_subtree_width(node),
        shift_from: node.right + 1,
    }
}

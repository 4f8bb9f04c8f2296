use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::services::slug::build_path;

/// The structural fields of one live row, as read from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub left: i32,
    pub right: i32,
    pub level: i32,
    pub slug: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ViolationKind {
    InvertedBounds,
    DuplicateBoundary,
    MissingParent,
    NotNestedInParent,
    OverlappingRanges,
    ParentMismatch,
    WrongLevel,
    WrongPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeViolation {
    pub node_id: Uuid,
    pub kind: ViolationKind,
    pub detail: String,
}

impl TreeViolation {
    fn new(node_id: Uuid, kind: ViolationKind, detail: impl Into<String>) -> Self {
        Self {
            node_id,
            kind,
            detail: detail.into(),
        }
    }
}

/// Checks every nested-set invariant over a set of live nodes and reports each
/// violation found. An empty result means the forest is consistent.
pub fn check_forest(nodes: &[NodeSnapshot]) -> Vec<TreeViolation> {
    let mut violations = Vec::new();
    let by_id: HashMap<Uuid, &NodeSnapshot> = nodes.iter().map(|n| (n.id, n)).collect();

    let mut seen_boundaries: HashMap<i32, Uuid> = HashMap::with_capacity(nodes.len() * 2);
    for node in nodes {
        if node.left >= node.right {
            violations.push(TreeViolation::new(
                node.id,
                ViolationKind::InvertedBounds,
                format!("left {} >= right {}", node.left, node.right),
            ));
        }
        for value in [node.left, node.right] {
            if let Some(other) = seen_boundaries.insert(value, node.id) {
                violations.push(TreeViolation::new(
                    node.id,
                    ViolationKind::DuplicateBoundary,
                    format!("boundary {} also used by {}", value, other),
                ));
            }
        }

        match node.parent_id {
            None => {
                if node.level != 0 {
                    violations.push(TreeViolation::new(
                        node.id,
                        ViolationKind::WrongLevel,
                        format!("root has level {}", node.level),
                    ));
                }
                if node.path != node.slug {
                    violations.push(TreeViolation::new(
                        node.id,
                        ViolationKind::WrongPath,
                        format!("root path '{}' differs from slug '{}'", node.path, node.slug),
                    ));
                }
            }
            Some(parent_id) => match by_id.get(&parent_id) {
                None => violations.push(TreeViolation::new(
                    node.id,
                    ViolationKind::MissingParent,
                    format!("parent {} is not a live category", parent_id),
                )),
                Some(parent) => {
                    if !(parent.left < node.left && node.right < parent.right) {
                        violations.push(TreeViolation::new(
                            node.id,
                            ViolationKind::NotNestedInParent,
                            format!(
                                "[{}, {}] not inside parent [{}, {}]",
                                node.left, node.right, parent.left, parent.right
                            ),
                        ));
                    }
                    if node.level != parent.level + 1 {
                        violations.push(TreeViolation::new(
                            node.id,
                            ViolationKind::WrongLevel,
                            format!("level {} under parent level {}", node.level, parent.level),
                        ));
                    }
                    let expected = build_path(Some(&parent.path), &node.slug);
                    if node.path != expected {
                        violations.push(TreeViolation::new(
                            node.id,
                            ViolationKind::WrongPath,
                            format!("path '{}' expected '{}'", node.path, expected),
                        ));
                    }
                }
            },
        }
    }

    // Sweep in pre-order: the innermost open range must be the stored parent,
    // and no range may end past the range enclosing it.
    let mut ordered: Vec<&NodeSnapshot> = nodes.iter().filter(|n| n.left < n.right).collect();
    ordered.sort_by_key(|n| n.left);
    let mut open: Vec<&NodeSnapshot> = Vec::new();
    for node in ordered {
        while open.last().map_or(false, |top| top.right < node.left) {
            open.pop();
        }
        let enclosing = open.last().copied();
        if let Some(top) = enclosing {
            if node.right > top.right {
                violations.push(TreeViolation::new(
                    node.id,
                    ViolationKind::OverlappingRanges,
                    format!(
                        "[{}, {}] crosses [{}, {}] of {}",
                        node.left, node.right, top.left, top.right, top.id
                    ),
                ));
            }
        }
        let contained_by = enclosing.map(|top| top.id);
        // Missing parents were already reported above.
        let parent_known = node.parent_id.map_or(true, |p| by_id.contains_key(&p));
        if parent_known && contained_by != node.parent_id {
            violations.push(TreeViolation::new(
                node.id,
                ViolationKind::ParentMismatch,
                format!(
                    "enclosed by {:?} but parent_id is {:?}",
                    contained_by, node.parent_id
                ),
            ));
        }
        open.push(node);
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        id: Uuid,
        parent: Option<&NodeSnapshot>,
        left: i32,
        right: i32,
        slug: &str,
    ) -> NodeSnapshot {
        NodeSnapshot {
            id,
            parent_id: parent.map(|p| p.id),
            left,
            right,
            level: parent.map(|p| p.level + 1).unwrap_or(0),
            slug: slug.to_string(),
            path: build_path(parent.map(|p| p.path.as_str()), slug),
        }
    }

    #[test]
    fn consistent_forest_has_no_violations() {
        let electronics = snapshot(Uuid::new_v4(), None, 1, 6, "electronics");
        let phones = snapshot(Uuid::new_v4(), Some(&electronics), 2, 3, "phones");
        let laptops = snapshot(Uuid::new_v4(), Some(&electronics), 4, 5, "laptops");
        let books = snapshot(Uuid::new_v4(), None, 7, 8, "books");
        assert!(check_forest(&[electronics, phones, laptops, books]).is_empty());
    }

    #[test]
    fn gaps_left_by_soft_deletes_are_fine() {
        let root = snapshot(Uuid::new_v4(), None, 1, 10, "root");
        let child = snapshot(Uuid::new_v4(), Some(&root), 6, 7, "child");
        let other = snapshot(Uuid::new_v4(), None, 14, 15, "other");
        assert!(check_forest(&[root, child, other]).is_empty());
    }

    #[test]
    fn detects_crossing_ranges() {
        let a = snapshot(Uuid::new_v4(), None, 1, 4, "a");
        let b = snapshot(Uuid::new_v4(), None, 3, 6, "b");
        let violations = check_forest(&[a, b]);
        assert!(violations
            .iter()
            .any(|v| v.kind == ViolationKind::OverlappingRanges));
    }

    #[test]
    fn detects_wrong_level_and_path() {
        let root = snapshot(Uuid::new_v4(), None, 1, 4, "root");
        let mut child = snapshot(Uuid::new_v4(), Some(&root), 2, 3, "child");
        child.level = 3;
        child.path = "elsewhere/child".into();
        let kinds: Vec<ViolationKind> = check_forest(&[root, child])
            .into_iter()
            .map(|v| v.kind)
            .collect();
        assert!(kinds.contains(&ViolationKind::WrongLevel));
        assert!(kinds.contains(&ViolationKind::WrongPath));
    }

    #[test]
    fn detects_parent_mismatch() {
        let a = snapshot(Uuid::new_v4(), None, 1, 4, "a");
        let b = snapshot(Uuid::new_v4(), None, 5, 8, "b");
        // Stored under `b` but numbered inside `a`.
        let mut c = snapshot(Uuid::new_v4(), Some(&b), 6, 7, "c");
        c.left = 2;
        c.right = 3;
        let violations = check_forest(&[a, b, c]);
        assert!(violations
            .iter()
            .any(|v| v.kind == ViolationKind::ParentMismatch));
        assert!(violations
            .iter()
            .any(|v| v.kind == ViolationKind::NotNestedInParent));
    }

    #[test]
    fn detects_missing_parent_and_inverted_bounds() {
        let mut orphan = snapshot(Uuid::new_v4(), None, 5, 2, "orphan");
        orphan.parent_id = Some(Uuid::new_v4());
        orphan.level = 1;
        let kinds: Vec<ViolationKind> = check_forest(&[orphan])
            .into_iter()
            .map(|v| v.kind)
            .collect();
        assert!(kinds.contains(&ViolationKind::InvertedBounds));
        assert!(kinds.contains(&ViolationKind::MissingParent));
    }
}

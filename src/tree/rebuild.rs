use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::TreeError;

/// A category known only by its parent link, as produced by an import or by
/// reading `parent_id` back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatNode {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub sort_order: i32,
}

/// Fresh boundaries for one node, emitted in pre-order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberedNode {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub left: i32,
    pub right: i32,
    pub level: i32,
}

/// Re-numbers a forest depth-first, assigning contiguous boundaries starting at 1.
///
/// Siblings are visited by `sort_order`, ties broken by input order. The result
/// is in pre-order, so every parent precedes its children. Dangling parent
/// references, duplicate ids and cycles are rejected before anything is numbered.
pub fn number_forest(nodes: &[FlatNode]) -> Result<Vec<NumberedNode>, TreeError> {
    let mut index: HashMap<Uuid, usize> = HashMap::with_capacity(nodes.len());
    for (idx, node) in nodes.iter().enumerate() {
        if index.insert(node.id, idx).is_some() {
            return Err(TreeError::DuplicateId(node.id));
        }
    }

    let mut roots: Vec<usize> = Vec::new();
    let mut children: HashMap<Uuid, Vec<usize>> = HashMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        match node.parent_id {
            None => roots.push(idx),
            Some(parent_id) => {
                if !index.contains_key(&parent_id) {
                    return Err(TreeError::UnknownParent {
                        id: node.id,
                        parent_id,
                    });
                }
                children.entry(parent_id).or_default().push(idx);
            }
        }
    }

    let sibling_order = |list: &mut Vec<usize>| {
        list.sort_by_key(|&idx| (nodes[idx].sort_order, idx));
    };
    sibling_order(&mut roots);
    for list in children.values_mut() {
        sibling_order(list);
    }

    let mut numbered: Vec<NumberedNode> = Vec::with_capacity(nodes.len());
    let mut counter = 1;

    // Enter carries the input index and depth; Exit carries the slot in `numbered`.
    enum Frame {
        Enter(usize, i32),
        Exit(usize),
    }

    let mut stack: Vec<Frame> = roots.iter().rev().map(|&idx| Frame::Enter(idx, 0)).collect();
    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(idx, level) => {
                let node = &nodes[idx];
                let slot = numbered.len();
                numbered.push(NumberedNode {
                    id: node.id,
                    parent_id: node.parent_id,
                    left: counter,
                    right: 0,
                    level,
                });
                counter += 1;
                stack.push(Frame::Exit(slot));
                if let Some(kids) = children.get(&node.id) {
                    for &child in kids.iter().rev() {
                        stack.push(Frame::Enter(child, level + 1));
                    }
                }
            }
            Frame::Exit(slot) => {
                numbered[slot].right = counter;
                counter += 1;
            }
        }
    }

    if numbered.len() < nodes.len() {
        let reached: HashSet<Uuid> = numbered.iter().map(|n| n.id).collect();
        let stranded: Vec<Uuid> = nodes
            .iter()
            .map(|n| n.id)
            .filter(|id| !reached.contains(id))
            .collect();
        return Err(TreeError::Cycle {
            sample: stranded[0],
            count: stranded.len(),
        });
    }

    Ok(numbered)
}

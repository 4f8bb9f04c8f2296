//! Property-based tests for the category tree.
//!
//! Random sequences of creates, moves and deletes are replayed against an
//! in-memory database; after every sequence the stored forest must still
//! satisfy every nested-set invariant.

mod common;

use common::TestTree;
use proptest::prelude::*;
use stateset_category_tree::{
    errors::ServiceError,
    services::category_tree::{CreateCategoryInput, DeleteOptions},
    tree::{check_forest, number_forest, FlatNode, NodeSnapshot, Position},
};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Op {
    Create { parent: Option<usize>, first: bool },
    Move { node: usize, parent: Option<usize>, first: bool },
    Delete { node: usize, hard: bool },
}

fn position(first: bool) -> Position {
    if first {
        Position::First
    } else {
        Position::Last
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (proptest::option::of(0usize..32), any::<bool>())
            .prop_map(|(parent, first)| Op::Create { parent, first }),
        3 => (0usize..32, proptest::option::of(0usize..32), any::<bool>())
            .prop_map(|(node, parent, first)| Op::Move { node, parent, first }),
        1 => (0usize..32, any::<bool>()).prop_map(|(node, hard)| Op::Delete { node, hard }),
    ]
}

/// Picks one of the ids created so far, wrapping the random index.
fn pick(ids: &[Uuid], index: usize) -> Option<Uuid> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[index % ids.len()])
    }
}

fn is_expected_rejection(err: &ServiceError) -> bool {
    matches!(
        err,
        ServiceError::ValidationError(_) | ServiceError::NotFound(_)
    )
}

async fn replay(ops: Vec<Op>) {
    let tree = TestTree::new().await;
    let mut ids: Vec<Uuid> = Vec::new();

    for (step, op) in ops.into_iter().enumerate() {
        match op {
            Op::Create { parent, first } => {
                let parent_id = parent.and_then(|p| pick(&ids, p));
                let input = CreateCategoryInput::named(format!("Node {step}")).at(position(first));
                match tree.service.create(input, parent_id).await {
                    Ok(category) => ids.push(category.id),
                    Err(err) => assert!(is_expected_rejection(&err), "create failed: {err}"),
                }
            }
            Op::Move {
                node,
                parent,
                first,
            } => {
                let Some(id) = pick(&ids, node) else { continue };
                let parent_id = parent.and_then(|p| pick(&ids, p));
                if let Err(err) = tree
                    .service
                    .move_category(id, parent_id, position(first))
                    .await
                {
                    assert!(is_expected_rejection(&err), "move failed: {err}");
                }
            }
            Op::Delete { node, hard } => {
                let Some(id) = pick(&ids, node) else { continue };
                if let Err(err) = tree.service.delete(id, DeleteOptions { hard }).await {
                    assert!(is_expected_rejection(&err), "delete failed: {err}");
                }
            }
        }
    }

    tree.assert_consistent().await;

    // The nested view and the flat forest agree on size.
    let forest = tree.service.get_tree(None).await.unwrap();
    let live = live_count(&tree, &forest).await;
    assert_eq!(forest.iter().map(|n| n.size()).sum::<usize>(), live);

    // Renumbering a valid forest never changes parent links or sibling order.
    let before: Vec<(Uuid, Option<Uuid>)> = flatten(&forest);
    tree.service.rebuild_from_storage().await.unwrap();
    let after = flatten(&tree.service.get_tree(None).await.unwrap());
    assert_eq!(before, after);
    tree.assert_consistent().await;
}

fn flatten(
    forest: &[stateset_category_tree::services::category_tree::CategoryTreeNode],
) -> Vec<(Uuid, Option<Uuid>)> {
    let mut out = Vec::new();
    let mut stack: Vec<_> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push((node.category.id, node.category.parent_id));
        stack.extend(node.children.iter().rev());
    }
    out
}

async fn live_count(
    tree: &TestTree,
    forest: &[stateset_category_tree::services::category_tree::CategoryTreeNode],
) -> usize {
    let mut total = 0;
    for root in forest {
        total += 1 + tree.service.count_descendants(root.category.id).await.unwrap() as usize;
    }
    total
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_operations_keep_tree_valid(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(replay(ops));
    }
}

// Pure numbering: any acyclic parent assignment numbers into a valid forest.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn numbered_forests_pass_verification(
        parents in proptest::collection::vec(proptest::option::of(0usize..64), 1..48),
        orders in proptest::collection::vec(0i32..4, 48),
    ) {
        let ids: Vec<Uuid> = (0..parents.len()).map(|_| Uuid::new_v4()).collect();
        // A parent must come earlier in the list, so the input is acyclic.
        let flat: Vec<FlatNode> = parents
            .iter()
            .enumerate()
            .map(|(idx, parent)| FlatNode {
                id: ids[idx],
                parent_id: match parent {
                    Some(p) if idx > 0 => Some(ids[p % idx]),
                    _ => None,
                },
                sort_order: orders[idx],
            })
            .collect();

        let numbered = number_forest(&flat).unwrap();
        prop_assert_eq!(numbered.len(), flat.len());

        let mut paths = std::collections::HashMap::new();
        let snapshots: Vec<NodeSnapshot> = numbered
            .iter()
            .map(|n| {
                let slug = n.id.simple().to_string();
                let path = match n.parent_id.and_then(|p| paths.get(&p)) {
                    Some(parent_path) => format!("{}/{}", parent_path, slug),
                    None => slug.clone(),
                };
                paths.insert(n.id, path.clone());
                NodeSnapshot {
                    id: n.id,
                    parent_id: n.parent_id,
                    left: n.left,
                    right: n.right,
                    level: n.level,
                    slug,
                    path,
                }
            })
            .collect();

        let violations = check_forest(&snapshots);
        prop_assert!(violations.is_empty(), "{:?}", violations);

        let max_right = numbered.iter().map(|n| n.right).max().unwrap();
        prop_assert_eq!(max_right as usize, flat.len() * 2);
    }
}

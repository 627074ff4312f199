//! Assembles flat `(id, parent_id)` rows into an ordered tree.
//!
//! Both passes are iterative, so nesting depth is bounded by memory rather
//! than by the call stack. Rows whose parent is missing become roots, and so
//! does the first row reached in a parent cycle.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::CollectionItem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub item: CollectionItem,
    pub children: Vec<TreeNode>,
}

/// Build the forest for one collection. Siblings are ordered by
/// `sort_order`; ties keep input order.
pub fn build_tree(items: Vec<CollectionItem>) -> Vec<TreeNode> {
    let count = items.len();
    let index: HashMap<Uuid, usize> = items.iter().enumerate().map(|(i, item)| (item.id, i)).collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut roots = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match item.parent_id.and_then(|parent| index.get(&parent)) {
            Some(&parent) if parent != i => children[parent].push(i),
            _ => roots.push(i),
        }
    }
    let by_order = |&i: &usize| items[i].sort_order;
    roots.sort_by_key(by_order);
    for siblings in &mut children {
        siblings.sort_by_key(by_order);
    }

    // Pre-order walk from every root, then from anything a cycle hid.
    let mut visited = vec![false; count];
    let mut order = Vec::with_capacity(count);
    let mut tree_children: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut stack = Vec::new();
    let starts: Vec<usize> = roots.iter().copied().chain(0..count).collect();
    let mut forest = Vec::new();
    for start in starts {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        forest.push(start);
        stack.push(start);
        while let Some(node) = stack.pop() {
            order.push(node);
            for &child in children[node].iter().rev() {
                if !visited[child] {
                    visited[child] = true;
                    tree_children[node].push(child);
                    stack.push(child);
                }
            }
            tree_children[node].reverse();
        }
    }

    // Children always follow their parent in `order`, so a reverse pass
    // finishes every child before its parent needs it.
    let mut rows: Vec<Option<CollectionItem>> = items.into_iter().map(Some).collect();
    let mut built: Vec<Option<TreeNode>> = (0..count).map(|_| None).collect();
    for &node in order.iter().rev() {
        let kids = tree_children[node].iter().filter_map(|&c| built[c].take()).collect();
        if let Some(item) = rows[node].take() {
            built[node] = Some(TreeNode { item, children: kids });
        }
    }

    forest.into_iter().filter_map(|root| built[root].take()).collect()
}

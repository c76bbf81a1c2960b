//! Structural invariant checks
//!
//! `validate` is what the tests lean on after every mutation; the shell also
//! exposes it as `check`.

use ahash::AHashSet;

use super::{BPlusKey, BPlusNode, BPlusTree, BPlusTreeError, BPlusTreeResult, NodeId};

/// State gathered during the recursive walk
struct Walk {
    visited: AHashSet<NodeId>,
    leaves: Vec<NodeId>,
    leaf_depth: Option<usize>,
}

fn invalid<T>(msg: String) -> BPlusTreeResult<T> {
    Err(BPlusTreeError::InvalidState(msg))
}

impl BPlusTree {
    /// Check every structural invariant of the tree
    pub fn validate(&self) -> BPlusTreeResult<()> {
        let Some(root_id) = self.root else {
            if self.entry_count != 0 {
                return invalid(format!(
                    "empty tree reports {} entries",
                    self.entry_count
                ));
            }
            return Ok(());
        };

        let root = self.node(root_id)?;
        if root.parent().is_some() {
            return invalid(format!("root {root_id} has a parent"));
        }
        if root.is_internal() && root.keys().is_empty() {
            return invalid(format!("internal root {root_id} has no keys"));
        }

        let mut walk = Walk {
            visited: AHashSet::new(),
            leaves: Vec::new(),
            leaf_depth: None,
        };
        self.check_node(root_id, None, None, None, 1, &mut walk)?;

        self.check_leaf_chain(&walk.leaves)?;

        if walk.visited.len() != self.node_count() {
            return invalid(format!(
                "{} nodes reachable but {} allocated",
                walk.visited.len(),
                self.node_count()
            ));
        }

        Ok(())
    }

    /// Check one subtree: key bounds, capacity, child counts and parent links
    fn check_node(
        &self,
        id: NodeId,
        parent: Option<NodeId>,
        lower: Option<BPlusKey>,
        upper: Option<BPlusKey>,
        depth: usize,
        walk: &mut Walk,
    ) -> BPlusTreeResult<()> {
        if !walk.visited.insert(id) {
            return invalid(format!("node {id} reachable twice"));
        }

        let node = self.node(id)?;
        let keys = node.keys();

        if node.parent() != parent {
            return invalid(format!(
                "node {id} has parent {:?}, expected {:?}",
                node.parent(),
                parent
            ));
        }

        if keys.len() > self.max_keys() {
            return invalid(format!(
                "node {id} holds {} keys, max is {}",
                keys.len(),
                self.max_keys()
            ));
        }
        if parent.is_some() && keys.len() < self.min_keys() {
            return invalid(format!(
                "node {id} holds {} keys, min is {}",
                keys.len(),
                self.min_keys()
            ));
        }

        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return invalid(format!("node {id} keys not strictly ascending: {keys:?}"));
        }
        if let (Some(lo), Some(&first)) = (lower, keys.first()) {
            if first < lo {
                return invalid(format!("node {id} key {first} below lower bound {lo}"));
            }
        }
        if let (Some(hi), Some(&last)) = (upper, keys.last()) {
            if last >= hi {
                return invalid(format!("node {id} key {last} not below upper bound {hi}"));
            }
        }

        match node {
            BPlusNode::Leaf(_) => {
                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        return invalid(format!(
                            "leaf {id} at depth {depth}, other leaves at {expected}"
                        ));
                    }
                    Some(_) => {}
                }
                walk.leaves.push(id);
            }
            BPlusNode::Internal(internal) => {
                if internal.children.len() != internal.keys.len() + 1 {
                    return invalid(format!(
                        "internal node {id} has {} keys and {} children",
                        internal.keys.len(),
                        internal.children.len()
                    ));
                }

                for (i, &child) in internal.children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(internal.keys[i - 1]) };
                    let child_upper = internal.keys.get(i).copied().or(upper);
                    self.check_node(child, Some(id), child_lower, child_upper, depth + 1, walk)?;
                }
            }
        }

        Ok(())
    }

    /// The `next` chain must visit exactly the traversal-order leaves in ascending key order
    fn check_leaf_chain(&self, leaves: &[NodeId]) -> BPlusTreeResult<()> {
        let mut chained = Vec::with_capacity(leaves.len());
        let mut current = leaves.first().copied();
        let mut previous_key: Option<BPlusKey> = None;
        let mut total = 0;

        while let Some(id) = current {
            if chained.len() > leaves.len() {
                return invalid("leaf chain does not terminate".to_string());
            }

            let leaf = self.leaf(id)?;
            for &k in &leaf.keys {
                if previous_key.is_some_and(|p| p >= k) {
                    return invalid(format!("leaf chain not ascending at key {k}"));
                }
                previous_key = Some(k);
            }
            total += leaf.len();

            chained.push(id);
            current = leaf.next;
        }

        if chained != leaves {
            return invalid(format!(
                "leaf chain {chained:?} differs from traversal order {leaves:?}"
            ));
        }

        if total != self.entry_count {
            return invalid(format!(
                "leaves hold {total} keys but tree reports {}",
                self.entry_count
            ));
        }

        Ok(())
    }
}

//! Read-only walks over the node graph and deep cloning
//!
//! Everything here discovers structure by descending from the root; the
//! leaf `next` chain is only followed by [`Keys`].

use super::{BPlusKey, BPlusNode, BPlusTree, BPlusTreeResult, InternalNode, LeafNode, NodeId, NodeUid};

impl BPlusTree {
    /// All live nodes reachable from the root, in pre-order (children left to right)
    pub fn all_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();

        while let Some(id) = stack.pop() {
            let Some(node) = self.get_node(id) else {
                continue;
            };
            out.push(id);
            stack.extend(node.children().iter().rev());
        }

        out
    }

    /// Leaves in left-to-right order, found by traversal rather than `next` links
    pub fn leaves(&self) -> Vec<NodeId> {
        self.all_nodes()
            .into_iter()
            .filter(|&id| self.get_node(id).is_some_and(BPlusNode::is_leaf))
            .collect()
    }

    /// Leftmost leaf, where the `next` chain starts
    pub fn first_leaf(&self) -> Option<NodeId> {
        let mut current = self.root?;

        while let BPlusNode::Internal(node) = self.get_node(current)? {
            current = *node.children.first()?;
        }

        Some(current)
    }

    /// Get tree height (0 when empty, 1 for a single leaf)
    pub fn height(&self) -> usize {
        match self.root {
            None => 0,
            Some(root_id) => {
                let mut height = 1;
                let mut current = root_id;

                while let Some(BPlusNode::Internal(node)) = self.get_node(current) {
                    if let Some(&child_id) = node.children.first() {
                        current = child_id;
                        height += 1;
                    } else {
                        break;
                    }
                }

                height
            }
        }
    }

    /// Count keys by summing over every leaf
    pub fn count_keys(&self) -> usize {
        self.leaves()
            .into_iter()
            .filter_map(|id| self.get_node(id))
            .map(|node| node.keys().len())
            .sum()
    }

    /// Iterate over all keys in ascending order
    pub fn keys(&self) -> Keys<'_> {
        Keys::new(self)
    }

    /// Copy the tree into an independent one with fresh node identities
    ///
    /// Shape, keys and parent links are copied structurally, then the leaf
    /// chain is rebuilt from traversal order; the source's `next` links are
    /// never consulted.
    pub fn deep_clone(&self) -> BPlusTreeResult<BPlusTree> {
        let mut copy = BPlusTree {
            root: None,
            order: self.order,
            nodes: Vec::with_capacity(self.node_count()),
            free_list: Vec::new(),
            entry_count: self.entry_count,
        };

        if let Some(root_id) = self.root {
            let new_root = self.clone_subtree(root_id, None, &mut copy)?;
            copy.root = Some(new_root);
            copy.patch_leaf_links()?;
        }

        Ok(copy)
    }

    fn clone_subtree(
        &self,
        src_id: NodeId,
        parent: Option<NodeId>,
        dst: &mut BPlusTree,
    ) -> BPlusTreeResult<NodeId> {
        match self.node(src_id)? {
            BPlusNode::Leaf(leaf) => {
                let mut copy = LeafNode::with_keys(leaf.keys.clone());
                copy.parent = parent;
                Ok(dst.allocate_node(BPlusNode::Leaf(copy)))
            }
            BPlusNode::Internal(node) => {
                let id = dst.allocate_node(BPlusNode::Internal(InternalNode {
                    uid: NodeUid::fresh(),
                    keys: node.keys.clone(),
                    children: Vec::with_capacity(node.children.len()),
                    parent,
                }));

                let mut children = Vec::with_capacity(node.children.len());
                for &child in &node.children {
                    children.push(self.clone_subtree(child, Some(id), dst)?);
                }
                dst.internal_mut(id)?.children = children;

                Ok(id)
            }
        }
    }

    /// Rewire every leaf's `next` link from traversal order
    pub(crate) fn patch_leaf_links(&mut self) -> BPlusTreeResult<()> {
        let leaves = self.leaves();

        for (i, &leaf_id) in leaves.iter().enumerate() {
            self.leaf_mut(leaf_id)?.next = leaves.get(i + 1).copied();
        }

        Ok(())
    }
}

/// Iterator over keys in ascending order, following the leaf chain
pub struct Keys<'a> {
    tree: &'a BPlusTree,
    current_leaf: Option<NodeId>,
    current_idx: usize,
}

impl<'a> Keys<'a> {
    fn new(tree: &'a BPlusTree) -> Self {
        Self {
            tree,
            current_leaf: tree.first_leaf(),
            current_idx: 0,
        }
    }
}

impl Iterator for Keys<'_> {
    type Item = BPlusKey;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf_id = self.current_leaf?;
            let leaf = self.tree.get_node(leaf_id)?.as_leaf()?;

            if self.current_idx < leaf.len() {
                let key = leaf.keys[self.current_idx];
                self.current_idx += 1;
                return Some(key);
            }

            // Move to next leaf
            self.current_leaf = leaf.next;
            self.current_idx = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with(order: usize, keys: impl IntoIterator<Item = BPlusKey>) -> BPlusTree {
        let mut tree = BPlusTree::new(order).unwrap();
        for k in keys {
            tree.insert(k).unwrap();
        }
        tree
    }

    #[test]
    fn test_empty_tree_walks() {
        let tree = BPlusTree::new(4).unwrap();

        assert!(tree.all_nodes().is_empty());
        assert!(tree.leaves().is_empty());
        assert_eq!(tree.first_leaf(), None);
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.count_keys(), 0);
        assert_eq!(tree.keys().count(), 0);
    }

    #[test]
    fn test_all_nodes_is_preorder() {
        let tree = tree_with(4, 1..=10);

        let nodes = tree.all_nodes();
        assert_eq!(nodes[0], tree.root_node_id().unwrap());
        assert_eq!(nodes.len(), tree.node_count());

        // Leaves in pre-order are the leaves in key order
        let firsts: Vec<_> = tree
            .leaves()
            .into_iter()
            .map(|id| tree.get_node(id).unwrap().keys()[0])
            .collect();
        let mut sorted = firsts.clone();
        sorted.sort();
        assert_eq!(firsts, sorted);
        assert_eq!(tree.first_leaf(), tree.leaves().first().copied());
    }

    #[test]
    fn test_keys_follow_leaf_chain() {
        let tree = tree_with(3, [5, 3, 8, 1, 9, 2, 7]);
        let keys: Vec<_> = tree.keys().collect();
        assert_eq!(keys, vec![1, 2, 3, 5, 7, 8, 9]);
        assert_eq!(tree.count_keys(), 7);
    }

    #[test]
    fn test_deep_clone_has_fresh_identities() {
        let tree = tree_with(4, 1..=20);
        let copy = tree.deep_clone().unwrap();

        let original: Vec<_> = tree.all_nodes().iter().filter_map(|&id| tree.uid_of(id)).collect();
        let cloned: Vec<_> = copy.all_nodes().iter().filter_map(|&id| copy.uid_of(id)).collect();

        assert_eq!(original.len(), cloned.len());
        assert!(cloned.iter().all(|uid| !original.contains(uid)));
        assert_eq!(copy.keys().collect::<Vec<_>>(), tree.keys().collect::<Vec<_>>());
        assert_eq!(copy.height(), tree.height());
        copy.validate().unwrap();
    }

    #[test]
    fn test_patch_leaf_links_repairs_broken_chain() {
        let mut tree = tree_with(4, 1..=12);
        for id in tree.leaves() {
            tree.leaf_mut(id).unwrap().next = None;
        }
        assert!(tree.validate().is_err());

        tree.patch_leaf_links().unwrap();
        tree.validate().unwrap();
        assert_eq!(tree.keys().collect::<Vec<_>>(), (1..=12).collect::<Vec<_>>());
    }
}

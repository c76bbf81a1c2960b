//! B+ tree engine for step-by-step index visualisation
//!
//! This module provides a classic B+ tree over unique i64 keys:
//! - Separator keys route with "go right on >=", leaves hold every key
//! - Leaves are threaded left to right for range scans
//! - Every node carries a parent link so splits and merges climb upward
//! - `deep_clone` produces an independent copy with fresh node identities,
//!   which external drivers use to snapshot the tree between steps
//!
//! Nodes live in an arena (`Vec<Option<BPlusNode>>`) and refer to each other
//! by index, so parent and next links never own anything.

mod error;
mod node;
mod snapshot;
mod traversal;
mod validation;

pub use error::{BPlusTreeError, BPlusTreeResult};
pub use node::{BPlusNode, InternalNode, LeafNode, NodeId, NodeUid};
pub use snapshot::{NodeSnapshot, TreeSnapshot};
pub use traversal::Keys;

use ahash::AHashSet;
use log::{debug, trace};

/// Key type for the B+ tree
pub type BPlusKey = i64;

/// Smallest order for which min/max key bounds are consistent
pub const MIN_ORDER: usize = 3;

/// Order used when none is given
pub const DEFAULT_ORDER: usize = 4;

/// Location of a key found by [`BPlusTree::search`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    /// Leaf holding the key
    pub node: NodeId,
    /// Identity of that leaf
    pub uid: NodeUid,
    /// Position of the key inside the leaf
    pub index: usize,
}

/// Result of [`BPlusTree::range_query`]
#[derive(Debug, Clone, Default)]
pub struct RangeResult {
    /// Matching keys in ascending order
    pub keys: Vec<BPlusKey>,
    /// Leaves that contributed at least one key
    pub leaf_ids: AHashSet<NodeUid>,
    /// Same leaves, in scan order
    pub leaf_order: Vec<NodeUid>,
}

/// B+ Tree data structure
///
/// Order `m` means:
/// - Every node holds at most `m - 1` keys
/// - Every non-root node holds at least `ceil(m/2) - 1` keys
/// - Internal nodes have exactly one more child than keys
#[derive(Debug)]
pub struct BPlusTree {
    /// Root node ID (None if tree is empty)
    root: Option<NodeId>,

    /// Tree order (max children per internal node)
    order: usize,

    /// Node storage
    nodes: Vec<Option<BPlusNode>>,

    /// Free list for recycling merged-away nodes
    free_list: Vec<NodeId>,

    /// Total number of keys in the tree
    entry_count: usize,
}

impl BPlusTree {
    /// Create a new empty B+ tree with the given order
    ///
    /// # Arguments
    /// * `order` - The tree order (must be >= 3)
    ///
    /// # Returns
    /// * `Ok(BPlusTree)` - A new empty B+ tree
    /// * `Err(BPlusTreeError)` - If order is invalid
    pub fn new(order: usize) -> BPlusTreeResult<Self> {
        if order < MIN_ORDER {
            return Err(BPlusTreeError::InvalidOrder(order));
        }

        Ok(Self {
            root: None,
            order,
            nodes: Vec::new(),
            free_list: Vec::new(),
            entry_count: 0,
        })
    }

    /// Get the tree order
    pub fn order(&self) -> usize {
        self.order
    }

    /// Maximum keys in any node
    pub fn max_keys(&self) -> usize {
        self.order - 1
    }

    /// Minimum keys in any non-root node
    pub fn min_keys(&self) -> usize {
        self.order.div_ceil(2) - 1
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Get number of keys in the tree
    pub fn len(&self) -> usize {
        self.entry_count
    }

    /// Get the root node ID
    pub fn root_node_id(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    /// Drop every key, keeping the order
    pub fn clear(&mut self) {
        self.root = None;
        self.nodes.clear();
        self.free_list.clear();
        self.entry_count = 0;
    }

    // ========== Node Management ==========

    /// Allocate a new node, returning its ID
    fn allocate_node(&mut self, node: BPlusNode) -> NodeId {
        if let Some(id) = self.free_list.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            let id = self.nodes.len();
            self.nodes.push(Some(node));
            id
        }
    }

    /// Remove a node from storage, returning it and recycling its slot
    fn take_node(&mut self, id: NodeId) -> BPlusTreeResult<BPlusNode> {
        let node = self
            .nodes
            .get_mut(id)
            .and_then(Option::take)
            .ok_or(BPlusTreeError::NodeNotFound(id))?;
        self.free_list.push(id);
        Ok(node)
    }

    fn take_leaf(&mut self, id: NodeId) -> BPlusTreeResult<LeafNode> {
        match self.take_node(id)? {
            BPlusNode::Leaf(leaf) => Ok(leaf),
            BPlusNode::Internal(_) => Err(BPlusTreeError::InvalidState(format!(
                "expected leaf at node {id}"
            ))),
        }
    }

    fn take_internal(&mut self, id: NodeId) -> BPlusTreeResult<InternalNode> {
        match self.take_node(id)? {
            BPlusNode::Internal(node) => Ok(node),
            BPlusNode::Leaf(_) => Err(BPlusTreeError::InvalidState(format!(
                "expected internal node at node {id}"
            ))),
        }
    }

    /// Get a reference to a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&BPlusNode> {
        self.nodes.get(id).and_then(|n| n.as_ref())
    }

    /// Get a mutable reference to a node by ID
    fn get_node_mut(&mut self, id: NodeId) -> Option<&mut BPlusNode> {
        self.nodes.get_mut(id).and_then(|n| n.as_mut())
    }

    /// Identity of a live node
    pub fn uid_of(&self, id: NodeId) -> Option<NodeUid> {
        self.get_node(id).map(BPlusNode::uid)
    }

    fn node(&self, id: NodeId) -> BPlusTreeResult<&BPlusNode> {
        self.get_node(id).ok_or(BPlusTreeError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> BPlusTreeResult<&mut BPlusNode> {
        self.get_node_mut(id).ok_or(BPlusTreeError::NodeNotFound(id))
    }

    fn leaf(&self, id: NodeId) -> BPlusTreeResult<&LeafNode> {
        self.get_node(id)
            .and_then(|n| n.as_leaf())
            .ok_or(BPlusTreeError::NodeNotFound(id))
    }

    fn leaf_mut(&mut self, id: NodeId) -> BPlusTreeResult<&mut LeafNode> {
        self.get_node_mut(id)
            .and_then(|n| n.as_leaf_mut())
            .ok_or(BPlusTreeError::NodeNotFound(id))
    }

    fn internal(&self, id: NodeId) -> BPlusTreeResult<&InternalNode> {
        self.get_node(id)
            .and_then(|n| n.as_internal())
            .ok_or(BPlusTreeError::NodeNotFound(id))
    }

    fn internal_mut(&mut self, id: NodeId) -> BPlusTreeResult<&mut InternalNode> {
        self.get_node_mut(id)
            .and_then(|n| n.as_internal_mut())
            .ok_or(BPlusTreeError::NodeNotFound(id))
    }

    fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> BPlusTreeResult<()> {
        self.node_mut(id)?.set_parent(parent);
        Ok(())
    }

    /// Position of `child` under `parent`, with its left and right siblings
    fn siblings(
        &self,
        parent_id: NodeId,
        child_id: NodeId,
    ) -> BPlusTreeResult<(usize, Option<NodeId>, Option<NodeId>)> {
        let parent = self.internal(parent_id)?;
        let idx = parent.child_position(child_id).ok_or_else(|| {
            BPlusTreeError::InvalidState(format!(
                "node {child_id} is not a child of its parent {parent_id}"
            ))
        })?;

        let left = idx.checked_sub(1).map(|i| parent.children[i]);
        let right = parent.children.get(idx + 1).copied();

        Ok((idx, left, right))
    }

    // ========== Search Operations ==========

    /// Find the leaf node that should contain the given key
    pub fn find_leaf(&self, key: BPlusKey) -> Option<NodeId> {
        let mut current = self.root?;

        loop {
            match self.get_node(current)? {
                BPlusNode::Leaf(_) => return Some(current),
                BPlusNode::Internal(node) => {
                    let child_idx = node.find_child_index(key);
                    current = *node.children.get(child_idx)?;
                }
            }
        }
    }

    /// Search for a key, returning the leaf and in-leaf index on a hit
    pub fn search(&self, key: BPlusKey) -> Option<SearchHit> {
        let leaf_id = self.find_leaf(key)?;
        let leaf = self.get_node(leaf_id)?.as_leaf()?;
        let index = leaf.position(key)?;

        Some(SearchHit {
            node: leaf_id,
            uid: leaf.uid,
            index,
        })
    }

    /// Check whether a key is stored in the tree
    pub fn contains(&self, key: BPlusKey) -> bool {
        self.search(key).is_some()
    }

    /// Identities of the nodes visited while descending towards `key`
    pub fn search_path(&self, key: BPlusKey) -> Vec<NodeUid> {
        let mut path = Vec::new();
        let mut current = self.root;

        while let Some(id) = current {
            let Some(node) = self.get_node(id) else {
                break;
            };
            path.push(node.uid());

            current = match node {
                BPlusNode::Leaf(_) => None,
                BPlusNode::Internal(internal) => internal
                    .children
                    .get(internal.find_child_index(key))
                    .copied(),
            };
        }

        path
    }

    /// Range search: collect all keys where low <= key <= high
    pub fn range_query(&self, low: BPlusKey, high: BPlusKey) -> RangeResult {
        let mut result = RangeResult::default();

        if low > high {
            return result;
        }

        let mut current_id = self.find_leaf(low);

        // Scan through leaf nodes
        while let Some(id) = current_id {
            let leaf = match self.get_node(id).and_then(|n| n.as_leaf()) {
                Some(l) => l,
                None => break,
            };

            let before = result.keys.len();
            let mut past_high = false;

            for &k in &leaf.keys {
                if k > high {
                    past_high = true;
                    break;
                }
                if k >= low {
                    result.keys.push(k);
                }
            }

            if result.keys.len() > before {
                result.leaf_ids.insert(leaf.uid);
                result.leaf_order.push(leaf.uid);
            }

            if past_high {
                break;
            }

            current_id = leaf.next;
        }

        result
    }

    // ========== Insert Operations ==========

    /// Insert a key into the tree
    ///
    /// Returns `Ok(false)` if the key was already present; the tree is left
    /// untouched in that case.
    pub fn insert(&mut self, key: BPlusKey) -> BPlusTreeResult<bool> {
        if self.root.is_none() {
            // Create first leaf as root
            let leaf_id = self.allocate_node(BPlusNode::Leaf(LeafNode::with_keys(vec![key])));
            self.root = Some(leaf_id);
            self.entry_count = 1;
            trace!("insert {key}: new root leaf {leaf_id}");
            return Ok(true);
        }

        let leaf_id = self
            .find_leaf(key)
            .ok_or_else(|| BPlusTreeError::InvalidState("Could not find leaf".to_string()))?;

        let leaf_len = {
            let leaf = self.leaf_mut(leaf_id)?;
            if !leaf.insert(key) {
                trace!("insert {key}: already present");
                return Ok(false);
            }
            leaf.len()
        };

        self.entry_count += 1;
        trace!("insert {key}: into leaf {leaf_id}");

        if leaf_len > self.max_keys() {
            self.split_leaf(leaf_id)?;
        }

        Ok(true)
    }

    /// Split an overflowing leaf node
    fn split_leaf(&mut self, leaf_id: NodeId) -> BPlusTreeResult<()> {
        let right = self.leaf_mut(leaf_id)?.split();
        let separator = right.min_key().ok_or_else(|| {
            BPlusTreeError::InvalidState(format!("split of leaf {leaf_id} left right half empty"))
        })?;

        let right_id = self.allocate_node(BPlusNode::Leaf(right));
        self.leaf_mut(leaf_id)?.next = Some(right_id);

        debug!("split leaf {leaf_id} -> {right_id}, push up {separator}");

        self.insert_into_parent(leaf_id, separator, right_id)
    }

    /// Insert a new separator and right child next to `left_id` after a split
    fn insert_into_parent(
        &mut self,
        left_id: NodeId,
        key: BPlusKey,
        right_id: NodeId,
    ) -> BPlusTreeResult<()> {
        let Some(parent_id) = self.node(left_id)?.parent() else {
            // Split the root - create new root
            let new_root = InternalNode::new(vec![key], vec![left_id, right_id]);
            let new_root_id = self.allocate_node(BPlusNode::Internal(new_root));
            self.set_parent(left_id, Some(new_root_id))?;
            self.set_parent(right_id, Some(new_root_id))?;
            self.root = Some(new_root_id);
            debug!("new root {new_root_id} with separator {key}");
            return Ok(());
        };

        // Update parent
        let parent_len = {
            let parent = self.internal_mut(parent_id)?;
            let idx = parent.child_position(left_id).ok_or_else(|| {
                BPlusTreeError::InvalidState(format!(
                    "node {left_id} is not a child of its parent {parent_id}"
                ))
            })?;

            parent.keys.insert(idx, key);
            parent.children.insert(idx + 1, right_id);
            parent.len()
        };
        self.set_parent(right_id, Some(parent_id))?;

        // Check for overflow in parent
        if parent_len > self.max_keys() {
            self.split_internal(parent_id)?;
        }

        Ok(())
    }

    /// Split an overflowing internal node
    fn split_internal(&mut self, node_id: NodeId) -> BPlusTreeResult<()> {
        let (push_up, right) = self.internal_mut(node_id)?.split().ok_or_else(|| {
            BPlusTreeError::InvalidState(format!("cannot split internal node {node_id} without keys"))
        })?;
        let moved = right.children.clone();

        let right_id = self.allocate_node(BPlusNode::Internal(right));
        for child in moved {
            self.set_parent(child, Some(right_id))?;
        }

        debug!("split internal {node_id} -> {right_id}, push up {push_up}");

        self.insert_into_parent(node_id, push_up, right_id)
    }

    // ========== Delete Operations ==========

    /// Delete a key from the tree
    /// Returns true if the key was present
    pub fn delete(&mut self, key: BPlusKey) -> BPlusTreeResult<bool> {
        let Some(root_id) = self.root else {
            return Ok(false);
        };

        let leaf_id = match self.find_leaf(key) {
            Some(id) => id,
            None => return Ok(false),
        };

        // Delete from leaf
        let leaf_len = {
            let leaf = self.leaf_mut(leaf_id)?;
            if !leaf.remove(key) {
                trace!("delete {key}: not found");
                return Ok(false);
            }
            leaf.len()
        };

        self.entry_count -= 1;
        trace!("delete {key}: from leaf {leaf_id}");

        if leaf_id == root_id {
            if leaf_len == 0 {
                // Tree is now empty
                self.take_node(leaf_id)?;
                self.clear();
            }
            return Ok(true);
        }

        if leaf_len < self.min_keys() {
            self.fix_leaf_underflow(leaf_id)?;
        } else {
            self.update_parent_keys(leaf_id)?;
        }

        Ok(true)
    }

    /// Refresh the ancestor separator that mirrors this leaf's first key
    ///
    /// The separator sits in the nearest ancestor where the path does not
    /// take the leftmost child.
    fn update_parent_keys(&mut self, leaf_id: NodeId) -> BPlusTreeResult<()> {
        let Some(first) = self.leaf(leaf_id)?.min_key() else {
            return Ok(());
        };

        let mut child = leaf_id;
        while let Some(parent_id) = self.node(child)?.parent() {
            let parent = self.internal_mut(parent_id)?;
            let idx = parent.child_position(child).ok_or_else(|| {
                BPlusTreeError::InvalidState(format!(
                    "node {child} is not a child of its parent {parent_id}"
                ))
            })?;

            if idx > 0 {
                parent.keys[idx - 1] = first;
                break;
            }
            child = parent_id;
        }

        Ok(())
    }

    /// Handle a leaf that dropped below the minimum key count
    ///
    /// Left sibling is always tried before right, first for borrowing and
    /// then for merging.
    fn fix_leaf_underflow(&mut self, leaf_id: NodeId) -> BPlusTreeResult<()> {
        let parent_id = self.leaf(leaf_id)?.parent.ok_or_else(|| {
            BPlusTreeError::InvalidState(format!("non-root leaf {leaf_id} has no parent"))
        })?;
        let (idx, left_id, right_id) = self.siblings(parent_id, leaf_id)?;
        let min_keys = self.min_keys();

        // Borrow from left sibling (take its last key)
        if let Some(left_id) = left_id {
            if self.leaf(left_id)?.len() > min_keys {
                let key = self.leaf_mut(left_id)?.keys.pop().ok_or_else(|| {
                    BPlusTreeError::InvalidState(format!("left sibling {left_id} is empty"))
                })?;
                self.leaf_mut(leaf_id)?.keys.insert(0, key);
                self.internal_mut(parent_id)?.keys[idx - 1] = key;

                debug!("leaf {leaf_id} borrowed {key} from left sibling {left_id}");
                return Ok(());
            }
        }

        // Borrow from right sibling (take its first key)
        if let Some(right_id) = right_id {
            if self.leaf(right_id)?.len() > min_keys {
                let (key, right_first) = {
                    let right = self.leaf_mut(right_id)?;
                    let key = right.keys.remove(0);
                    (key, right.min_key())
                };
                let right_first = right_first.ok_or_else(|| {
                    BPlusTreeError::InvalidState(format!("right sibling {right_id} drained"))
                })?;

                self.leaf_mut(leaf_id)?.keys.push(key);
                self.internal_mut(parent_id)?.keys[idx] = right_first;
                self.update_parent_keys(leaf_id)?;

                debug!("leaf {leaf_id} borrowed {key} from right sibling {right_id}");
                return Ok(());
            }
        }

        if let Some(left_id) = left_id {
            // Merge this leaf into its left sibling
            let leaf = self.take_leaf(leaf_id)?;
            {
                let left = self.leaf_mut(left_id)?;
                left.keys.extend(leaf.keys);
                left.next = leaf.next;
            }
            {
                let parent = self.internal_mut(parent_id)?;
                parent.keys.remove(idx - 1);
                parent.children.remove(idx);
            }

            debug!("merged leaf {leaf_id} into left sibling {left_id}");
        } else if let Some(right_id) = right_id {
            // Merge the right sibling into this leaf
            let right = self.take_leaf(right_id)?;
            {
                let leaf = self.leaf_mut(leaf_id)?;
                leaf.keys.extend(right.keys);
                leaf.next = right.next;
            }
            {
                let parent = self.internal_mut(parent_id)?;
                parent.keys.remove(idx);
                parent.children.remove(idx + 1);
            }
            self.update_parent_keys(leaf_id)?;

            debug!("merged right sibling {right_id} into leaf {leaf_id}");
        } else {
            return Err(BPlusTreeError::InvalidState(format!(
                "leaf {leaf_id} has no sibling"
            )));
        }

        self.rebalance_internal(parent_id)
    }

    /// Restore bounds on an internal node that just lost a child
    ///
    /// A root left without keys is replaced by its only child.
    fn rebalance_internal(&mut self, node_id: NodeId) -> BPlusTreeResult<()> {
        let node = self.internal(node_id)?;

        if node.parent.is_none() {
            if node.is_empty() {
                let child = node.children.first().copied().ok_or_else(|| {
                    BPlusTreeError::InvalidState(format!("root {node_id} has no children"))
                })?;

                self.take_node(node_id)?;
                self.set_parent(child, None)?;
                self.root = Some(child);

                debug!("root {node_id} collapsed into {child}");
            }
            return Ok(());
        }

        if node.len() >= self.min_keys() {
            return Ok(());
        }

        self.fix_internal_underflow(node_id)
    }

    /// Handle an internal node that dropped below the minimum key count
    fn fix_internal_underflow(&mut self, node_id: NodeId) -> BPlusTreeResult<()> {
        let parent_id = self.internal(node_id)?.parent.ok_or_else(|| {
            BPlusTreeError::InvalidState(format!("non-root node {node_id} has no parent"))
        })?;
        let (idx, left_id, right_id) = self.siblings(parent_id, node_id)?;
        let min_keys = self.min_keys();

        // Rotate through the parent from the left sibling
        if let Some(left_id) = left_id {
            if self.internal(left_id)?.len() > min_keys {
                let (key, child) = {
                    let left = self.internal_mut(left_id)?;
                    (left.keys.pop(), left.children.pop())
                };
                let (Some(key), Some(child)) = (key, child) else {
                    return Err(BPlusTreeError::InvalidState(format!(
                        "left sibling {left_id} is empty"
                    )));
                };

                let separator =
                    std::mem::replace(&mut self.internal_mut(parent_id)?.keys[idx - 1], key);
                {
                    let node = self.internal_mut(node_id)?;
                    node.keys.insert(0, separator);
                    node.children.insert(0, child);
                }
                self.set_parent(child, Some(node_id))?;

                debug!("internal {node_id} borrowed from left sibling {left_id}");
                return Ok(());
            }
        }

        // Rotate through the parent from the right sibling
        if let Some(right_id) = right_id {
            if self.internal(right_id)?.len() > min_keys {
                let (key, child) = {
                    let right = self.internal_mut(right_id)?;
                    (right.keys.remove(0), right.children.remove(0))
                };

                let separator =
                    std::mem::replace(&mut self.internal_mut(parent_id)?.keys[idx], key);
                {
                    let node = self.internal_mut(node_id)?;
                    node.keys.push(separator);
                    node.children.push(child);
                }
                self.set_parent(child, Some(node_id))?;

                debug!("internal {node_id} borrowed from right sibling {right_id}");
                return Ok(());
            }
        }

        if let Some(left_id) = left_id {
            // Merge this node into its left sibling, pulling the separator down
            let node = self.take_internal(node_id)?;
            let separator = {
                let parent = self.internal_mut(parent_id)?;
                parent.children.remove(idx);
                parent.keys.remove(idx - 1)
            };
            for &child in &node.children {
                self.set_parent(child, Some(left_id))?;
            }
            {
                let left = self.internal_mut(left_id)?;
                left.keys.push(separator);
                left.keys.extend(node.keys);
                left.children.extend(node.children);
            }

            debug!("merged internal {node_id} into left sibling {left_id}");
        } else if let Some(right_id) = right_id {
            // Merge the right sibling into this node
            let right = self.take_internal(right_id)?;
            let separator = {
                let parent = self.internal_mut(parent_id)?;
                parent.children.remove(idx + 1);
                parent.keys.remove(idx)
            };
            for &child in &right.children {
                self.set_parent(child, Some(node_id))?;
            }
            {
                let node = self.internal_mut(node_id)?;
                node.keys.push(separator);
                node.keys.extend(right.keys);
                node.children.extend(right.children);
            }

            debug!("merged right sibling {right_id} into internal {node_id}");
        } else {
            return Err(BPlusTreeError::InvalidState(format!(
                "internal node {node_id} has no sibling"
            )));
        }

        self.rebalance_internal(parent_id)
    }

    // ========== Reconfiguration ==========

    /// Build a fresh tree of another order holding the same keys
    pub fn rebuilt_with_order(&self, order: usize) -> BPlusTreeResult<BPlusTree> {
        let mut tree = BPlusTree::new(order)?;

        for key in self.keys() {
            tree.insert(key)?;
        }

        debug!(
            "rebuilt {} keys from order {} to order {}",
            tree.len(),
            self.order,
            order
        );
        Ok(tree)
    }
}

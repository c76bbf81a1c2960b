use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::BPlusKey;

/// Node handle (index into the tree's node storage)
///
/// Handles are only meaningful for the tree that issued them and a slot may be
/// recycled after its node is freed. Use [`NodeUid`] to refer to a node from
/// outside the tree.
pub type NodeId = usize;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a node, unique across every tree in the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeUid(pub u64);

impl NodeUid {
    /// Hand out the next unused identity
    pub fn fresh() -> Self {
        NodeUid(NEXT_UID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Internal node: separator keys and child handles
///
/// - keys[i] separates children[i] (keys < keys[i]) from children[i + 1] (keys >= keys[i])
/// - children.len() == keys.len() + 1
#[derive(Debug, Clone)]
pub struct InternalNode {
    pub uid: NodeUid,
    /// Separator keys (sorted)
    pub keys: Vec<BPlusKey>,
    /// Child node IDs
    pub children: Vec<NodeId>,
    /// Owning internal node, None for the root
    pub parent: Option<NodeId>,
}

impl InternalNode {
    /// Create a new internal node with given keys and children
    pub fn new(keys: Vec<BPlusKey>, children: Vec<NodeId>) -> Self {
        debug_assert_eq!(keys.len() + 1, children.len());
        Self {
            uid: NodeUid::fresh(),
            keys,
            children,
            parent: None,
        }
    }

    /// Number of separator keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Find the child index for a given key
    /// Returns the index of the first separator greater than the key, or the
    /// last child if the key is >= every separator
    pub fn find_child_index(&self, key: BPlusKey) -> usize {
        for (i, &k) in self.keys.iter().enumerate() {
            if key < k {
                return i;
            }
        }
        self.keys.len()
    }

    /// Position of a child handle in this node
    pub fn child_position(&self, child: NodeId) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    /// Split this overflowing node around its middle key
    ///
    /// Returns the promoted key and the new right sibling, or `None` for a
    /// node without keys. The promoted key is removed from both halves.
    /// Children of the right half still point at this node as their parent;
    /// the caller re-parents them.
    pub fn split(&mut self) -> Option<(BPlusKey, InternalNode)> {
        if self.keys.is_empty() {
            return None;
        }
        let mid = self.keys.len() / 2;

        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let push_up = self.keys.pop()?;

        let mut right = InternalNode::new(right_keys, right_children);
        right.parent = self.parent;

        Some((push_up, right))
    }
}

/// Leaf node: sorted keys, linked to the next leaf
#[derive(Debug, Clone)]
pub struct LeafNode {
    pub uid: NodeUid,
    /// Keys (sorted, unique)
    pub keys: Vec<BPlusKey>,
    /// Link to next leaf for range queries
    pub next: Option<NodeId>,
    /// Owning internal node, None for the root
    pub parent: Option<NodeId>,
}

impl LeafNode {
    /// Create a new empty leaf node
    pub fn new() -> Self {
        Self::with_keys(Vec::new())
    }

    /// Create a leaf node holding the given sorted keys
    pub fn with_keys(keys: Vec<BPlusKey>) -> Self {
        debug_assert!(keys.windows(2).all(|w| w[0] < w[1]));
        Self {
            uid: NodeUid::fresh(),
            keys,
            next: None,
            parent: None,
        }
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Index of a key in this leaf
    pub fn position(&self, key: BPlusKey) -> Option<usize> {
        self.keys.binary_search(&key).ok()
    }

    /// Insert a key in sorted order
    /// Returns false (and leaves the leaf untouched) if the key is present
    pub fn insert(&mut self, key: BPlusKey) -> bool {
        match self.keys.binary_search(&key) {
            Ok(_) => false,
            Err(pos) => {
                self.keys.insert(pos, key);
                true
            }
        }
    }

    /// Remove a key
    /// Returns true if the key was present
    pub fn remove(&mut self, key: BPlusKey) -> bool {
        match self.keys.binary_search(&key) {
            Ok(pos) => {
                self.keys.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn min_key(&self) -> Option<BPlusKey> {
        self.keys.first().copied()
    }

    pub fn max_key(&self) -> Option<BPlusKey> {
        self.keys.last().copied()
    }

    /// Split this leaf node, returning the new right sibling
    ///
    /// This node keeps the first ceil(len / 2) keys. The right sibling takes
    /// over this leaf's `next` link and parent; the caller links this leaf to
    /// the sibling once it has a handle.
    pub fn split(&mut self) -> LeafNode {
        let mid = self.keys.len().div_ceil(2);

        let mut right = LeafNode::with_keys(self.keys.split_off(mid));
        right.next = self.next.take();
        right.parent = self.parent;

        right
    }
}

impl Default for LeafNode {
    fn default() -> Self {
        Self::new()
    }
}

/// B+ tree node (either internal or leaf)
#[derive(Debug, Clone)]
pub enum BPlusNode {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl BPlusNode {
    /// Check if this is a leaf node
    pub fn is_leaf(&self) -> bool {
        matches!(self, BPlusNode::Leaf(_))
    }

    /// Check if this is an internal node
    pub fn is_internal(&self) -> bool {
        matches!(self, BPlusNode::Internal(_))
    }

    pub fn uid(&self) -> NodeUid {
        match self {
            BPlusNode::Internal(node) => node.uid,
            BPlusNode::Leaf(node) => node.uid,
        }
    }

    pub fn keys(&self) -> &[BPlusKey] {
        match self {
            BPlusNode::Internal(node) => &node.keys,
            BPlusNode::Leaf(node) => &node.keys,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        match self {
            BPlusNode::Internal(node) => node.parent,
            BPlusNode::Leaf(node) => node.parent,
        }
    }

    pub fn set_parent(&mut self, parent: Option<NodeId>) {
        match self {
            BPlusNode::Internal(node) => node.parent = parent,
            BPlusNode::Leaf(node) => node.parent = parent,
        }
    }

    /// Child handles (empty for leaves)
    pub fn children(&self) -> &[NodeId] {
        match self {
            BPlusNode::Internal(node) => &node.children,
            BPlusNode::Leaf(_) => &[],
        }
    }

    /// Next leaf in key order (always None for internal nodes)
    pub fn next(&self) -> Option<NodeId> {
        match self {
            BPlusNode::Internal(_) => None,
            BPlusNode::Leaf(node) => node.next,
        }
    }

    /// Get as internal node reference
    pub fn as_internal(&self) -> Option<&InternalNode> {
        match self {
            BPlusNode::Internal(node) => Some(node),
            BPlusNode::Leaf(_) => None,
        }
    }

    /// Get as internal node mutable reference
    pub fn as_internal_mut(&mut self) -> Option<&mut InternalNode> {
        match self {
            BPlusNode::Internal(node) => Some(node),
            BPlusNode::Leaf(_) => None,
        }
    }

    /// Get as leaf node reference
    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            BPlusNode::Internal(_) => None,
            BPlusNode::Leaf(node) => Some(node),
        }
    }

    /// Get as leaf node mutable reference
    pub fn as_leaf_mut(&mut self) -> Option<&mut LeafNode> {
        match self {
            BPlusNode::Internal(_) => None,
            BPlusNode::Leaf(node) => Some(node),
        }
    }
}

//! Serializable view of the tree for external layout and animation code
//!
//! Snapshots refer to nodes by [`NodeUid`] only; arena handles never leave
//! the tree.

use serde::{Deserialize, Serialize};

use super::{BPlusKey, BPlusTree, BPlusTreeError, BPlusTreeResult, NodeId, NodeUid};

/// One node as seen by a renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: NodeUid,
    pub keys: Vec<BPlusKey>,
    pub is_leaf: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeUid>,
    pub next: Option<NodeUid>,
    pub parent: Option<NodeUid>,
}

/// Whole-tree view, nodes in pre-order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub order: usize,
    pub root: Option<NodeUid>,
    pub nodes: Vec<NodeSnapshot>,
}

impl TreeSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Look up a node by identity
    pub fn node(&self, uid: NodeUid) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == uid)
    }

    /// Leaf identities following `next` from the leftmost leaf
    pub fn leaf_chain(&self) -> Vec<NodeUid> {
        let mut chain = Vec::new();
        let mut current = self.nodes.iter().find(|n| n.is_leaf).map(|n| n.id);

        while let Some(uid) = current {
            if chain.len() >= self.nodes.len() {
                break;
            }
            chain.push(uid);
            current = self.node(uid).and_then(|n| n.next);
        }

        chain
    }
}

impl BPlusTree {
    /// Capture the current shape of the tree
    pub fn snapshot(&self) -> BPlusTreeResult<TreeSnapshot> {
        let uid = |id: NodeId| -> BPlusTreeResult<NodeUid> {
            self.uid_of(id).ok_or(BPlusTreeError::NodeNotFound(id))
        };

        let mut nodes = Vec::with_capacity(self.node_count());
        for id in self.all_nodes() {
            let node = self.node(id)?;
            nodes.push(NodeSnapshot {
                id: node.uid(),
                keys: node.keys().to_vec(),
                is_leaf: node.is_leaf(),
                children: node
                    .children()
                    .iter()
                    .map(|&c| uid(c))
                    .collect::<BPlusTreeResult<_>>()?,
                next: node.next().map(uid).transpose()?,
                parent: node.parent().map(uid).transpose()?,
            });
        }

        Ok(TreeSnapshot {
            order: self.order,
            root: self.root.map(uid).transpose()?,
            nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_of_empty_tree() {
        let tree = BPlusTree::new(5).unwrap();
        let snap = tree.snapshot().unwrap();

        assert_eq!(snap.order, 5);
        assert_eq!(snap.root, None);
        assert!(snap.nodes.is_empty());
    }

    #[test]
    fn test_snapshot_mirrors_structure() {
        let mut tree = BPlusTree::new(4).unwrap();
        for k in [10, 20, 30, 40] {
            tree.insert(k).unwrap();
        }

        let snap = tree.snapshot().unwrap();
        let root = snap.node(snap.root.unwrap()).unwrap();

        assert!(!root.is_leaf);
        assert_eq!(root.keys, vec![30]);
        assert_eq!(root.children.len(), 2);
        assert_eq!(snap.nodes[0].id, root.id);

        let left = snap.node(root.children[0]).unwrap();
        let right = snap.node(root.children[1]).unwrap();
        assert_eq!(left.keys, vec![10, 20]);
        assert_eq!(right.keys, vec![30, 40]);
        assert_eq!(left.next, Some(right.id));
        assert_eq!(right.next, None);
        assert_eq!(left.parent, Some(root.id));
        assert_eq!(snap.leaf_chain(), vec![left.id, right.id]);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut tree = BPlusTree::new(3).unwrap();
        tree.insert(7).unwrap();

        let snap = tree.snapshot().unwrap();
        let json = snap.to_json().unwrap();

        assert!(json.contains("\"isLeaf\": true"));
        assert!(!json.contains("children"));
        assert_eq!(TreeSnapshot::from_json(&json).unwrap(), snap);
    }
}

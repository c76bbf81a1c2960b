pub mod btree;
pub mod logging;
pub mod shell;

pub use btree::{
    BPlusKey, BPlusNode, BPlusTree, BPlusTreeError, BPlusTreeResult, NodeId, NodeUid,
    RangeResult, SearchHit, TreeSnapshot,
};
pub use shell::{Session, SessionConfig, ShellError, ShellResult};

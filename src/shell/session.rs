use std::collections::VecDeque;
use std::io::Write;

use log::{debug, info};
use prettytable::{Cell, Row, Table};

use crate::btree::{BPlusKey, BPlusTree, DEFAULT_ORDER, NodeUid, TreeSnapshot};

use super::command::{Command, HELP, parse_command};
use super::error::{ShellError, ShellResult};
use super::loader::load_keys;

/// Default number of undo snapshots kept
pub const DEFAULT_HISTORY: usize = 64;

/// Session settings, usually filled from the command line
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub order: usize,
    pub history_limit: usize,
    /// CSV column read by `load`
    pub load_column: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            history_limit: DEFAULT_HISTORY,
            load_column: 0,
        }
    }
}

/// What the caller should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue(String),
    Quit,
}

/// A live tree plus the snapshots needed to step back through it
pub struct Session {
    tree: BPlusTree,
    history: VecDeque<BPlusTree>,
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> ShellResult<Self> {
        Ok(Self {
            tree: BPlusTree::new(config.order)?,
            history: VecDeque::new(),
            config,
        })
    }

    pub fn tree(&self) -> &BPlusTree {
        &self.tree
    }

    /// Number of undo steps available
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Parse and run one line; blank lines and `#` comments do nothing
    pub fn execute_line(&mut self, line: &str) -> ShellResult<Outcome> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(Outcome::Continue(String::new()));
        }

        let command = parse_command(line)?;
        self.execute(command)
    }

    /// Run every line of a script, writing non-empty output to `out`
    ///
    /// Stops at the first failing line or at `quit`.
    pub fn run_script<W: Write>(&mut self, script: &str, out: &mut W) -> ShellResult<()> {
        for (idx, line) in script.lines().enumerate() {
            let outcome = self.execute_line(line).map_err(|e| ShellError::Script {
                line: idx + 1,
                source: Box::new(e),
            })?;

            match outcome {
                Outcome::Continue(text) if text.is_empty() => {}
                Outcome::Continue(text) => writeln!(out, "{text}")?,
                Outcome::Quit => break,
            }
        }
        Ok(())
    }

    pub fn execute(&mut self, command: Command) -> ShellResult<Outcome> {
        debug!("execute {command:?}");

        let text = match command {
            Command::Insert(keys) => self.insert_keys(&keys)?,
            Command::Delete(keys) => self.delete_keys(&keys)?,
            Command::Search(key) => self.search(key),
            Command::Path(key) => format!("path to {key}: {}", join_uids(&self.tree.search_path(key))),
            Command::Range(low, high) => self.range(low, high),
            Command::Order(order) => self.reorder(order)?,
            Command::Load(path) => self.load(&path)?,
            Command::Show => render_nodes(&self.tree.snapshot()?),
            Command::Leaves => render_leaves(&self.tree.snapshot()?),
            Command::Stats => render_stats(&self.tree),
            Command::Check => {
                self.tree.validate()?;
                "ok: all invariants hold".to_string()
            }
            Command::Dump => self.tree.snapshot()?.to_json()?,
            Command::Undo => self.undo(),
            Command::Clear => {
                if !self.tree.is_empty() {
                    self.checkpoint()?;
                }
                self.tree.clear();
                "cleared".to_string()
            }
            Command::Help => HELP.to_string(),
            Command::Quit => return Ok(Outcome::Quit),
        };

        Ok(Outcome::Continue(text))
    }

    /// Keep a deep copy of the current tree so the next change can be undone
    fn checkpoint(&mut self) -> ShellResult<()> {
        let copy = self.tree.deep_clone()?;
        self.remember(copy);
        Ok(())
    }

    fn remember(&mut self, tree: BPlusTree) {
        if self.config.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.config.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(tree);
    }

    fn undo(&mut self) -> String {
        match self.history.pop_back() {
            Some(previous) => {
                self.tree = previous;
                format!("undone ({} keys)", self.tree.len())
            }
            None => "nothing to undo".to_string(),
        }
    }

    fn insert_keys(&mut self, keys: &[BPlusKey]) -> ShellResult<String> {
        let mut saved = false;
        let mut added = Vec::new();
        let mut present = Vec::new();
        for &key in keys {
            // Checkpoint only once the command is about to change something
            if !saved && !self.tree.contains(key) {
                self.checkpoint()?;
                saved = true;
            }

            if self.tree.insert(key)? {
                added.push(key);
            } else {
                present.push(key);
            }
        }

        Ok(summarize("inserted", &added, "already present", &present))
    }

    fn delete_keys(&mut self, keys: &[BPlusKey]) -> ShellResult<String> {
        let mut saved = false;
        let mut removed = Vec::new();
        let mut missing = Vec::new();
        for &key in keys {
            if !saved && self.tree.contains(key) {
                self.checkpoint()?;
                saved = true;
            }

            if self.tree.delete(key)? {
                removed.push(key);
            } else {
                missing.push(key);
            }
        }

        Ok(summarize("deleted", &removed, "not found", &missing))
    }

    fn search(&self, key: BPlusKey) -> String {
        match self.tree.search(key) {
            Some(hit) => format!("found {key} in {} at index {}", hit.uid, hit.index),
            None => format!("{key} not found"),
        }
    }

    fn range(&self, low: BPlusKey, high: BPlusKey) -> String {
        let result = self.tree.range_query(low, high);
        if result.keys.is_empty() {
            return format!("no keys in [{low}, {high}]");
        }
        format!(
            "[{low}, {high}]: {} (leaves {})",
            join_keys(&result.keys),
            join_uids(&result.leaf_order)
        )
    }

    fn reorder(&mut self, order: usize) -> ShellResult<String> {
        let rebuilt = self.tree.rebuilt_with_order(order)?;
        let previous = std::mem::replace(&mut self.tree, rebuilt);
        self.remember(previous);

        info!("order changed to {order}");
        Ok(format!(
            "rebuilt with order {order} (height {})",
            self.tree.height()
        ))
    }

    fn load(&mut self, path: &str) -> ShellResult<String> {
        let keys = load_keys(path, self.config.load_column)?;
        let text = self.insert_keys(&keys)?;
        info!("loaded {} keys from {path}", keys.len());
        Ok(text)
    }
}

fn join_keys(keys: &[BPlusKey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_uids(uids: &[NodeUid]) -> String {
    uids.iter()
        .map(|u| u.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn summarize(done: &str, hits: &[BPlusKey], skipped: &str, misses: &[BPlusKey]) -> String {
    let mut parts = Vec::new();
    if !hits.is_empty() {
        parts.push(format!("{done}: {}", join_keys(hits)));
    }
    if !misses.is_empty() {
        parts.push(format!("{skipped}: {}", join_keys(misses)));
    }
    parts.join("; ")
}

fn render_nodes(snapshot: &TreeSnapshot) -> String {
    if snapshot.nodes.is_empty() {
        return "(empty tree)".to_string();
    }

    let mut table = Table::new();
    table.set_titles(text_row(&["node", "kind", "keys", "parent", "next", "children"]));

    for node in &snapshot.nodes {
        let kind = if node.is_leaf { "leaf" } else { "internal" };
        let keys = join_keys(&node.keys);
        let parent = node.parent.map(|p| p.to_string()).unwrap_or_default();
        let next = node.next.map(|n| n.to_string()).unwrap_or_default();
        let children = node
            .children
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ");

        let id = node.id.to_string();
        table.add_row(text_row(&[
            id.as_str(),
            kind,
            keys.as_str(),
            parent.as_str(),
            next.as_str(),
            children.as_str(),
        ]));
    }

    table.to_string()
}

fn render_leaves(snapshot: &TreeSnapshot) -> String {
    let chain = snapshot.leaf_chain();
    if chain.is_empty() {
        return "(empty tree)".to_string();
    }

    chain
        .iter()
        .filter_map(|&uid| snapshot.node(uid))
        .map(|leaf| format!("{}[{}]", leaf.id, join_keys(&leaf.keys)))
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn render_stats(tree: &BPlusTree) -> String {
    let stats = [
        ("order", tree.order()),
        ("min keys", tree.min_keys()),
        ("max keys", tree.max_keys()),
        ("height", tree.height()),
        ("nodes", tree.node_count()),
        ("leaves", tree.leaves().len()),
        ("keys", tree.count_keys()),
    ];

    let mut table = Table::new();
    for (name, value) in stats {
        table.add_row(text_row(&[name, value.to_string().as_str()]));
    }
    table.to_string()
}

fn text_row(cells: &[&str]) -> Row {
    Row::new(cells.iter().map(|c| Cell::new(c)).collect())
}

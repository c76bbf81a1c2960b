use std::io;

use rustyline::error::ReadlineError;
use thiserror::Error;

use crate::btree::BPlusTreeError;

/// Errors that can occur while driving the tree from the shell
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("B+ tree error: {0}")]
    Tree(#[from] BPlusTreeError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Readline error: {0}")]
    Readline(#[from] ReadlineError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Script failed at line {line}: {source}")]
    Script {
        line: usize,
        #[source]
        source: Box<ShellError>,
    },
}

pub type ShellResult<T> = Result<T, ShellError>;

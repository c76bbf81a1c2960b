//! Line-oriented front end over [`crate::btree::BPlusTree`]

mod command;
mod error;
mod loader;
mod session;

pub use command::{Command, HELP, parse_command, parser};
pub use error::{ShellError, ShellResult};
pub use loader::load_keys;
pub use session::{DEFAULT_HISTORY, Outcome, Session, SessionConfig};

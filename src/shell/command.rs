use chumsky::{prelude::*, regex::regex};

use crate::btree::BPlusKey;

use super::error::{ShellError, ShellResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // INSERT Integer+
    Insert(Vec<BPlusKey>),

    // DELETE Integer+
    Delete(Vec<BPlusKey>),

    // SEARCH Integer
    Search(BPlusKey),

    // PATH Integer
    Path(BPlusKey),

    // RANGE Integer Integer
    Range(BPlusKey, BPlusKey),

    // ORDER Integer
    Order(usize),

    // LOAD path
    Load(String),

    Show,
    Leaves,
    Stats,
    Check,
    Dump,
    Undo,
    Clear,
    Help,
    Quit,
}

pub const HELP: &str = "\
insert K...      (i)    insert keys
delete K...      (d)    delete keys
search K         (s)    locate a key
path K                  nodes visited on the way to a key
range LOW HIGH          keys in [LOW, HIGH] and the leaves holding them
show                    table of every node
leaves                  the leaf chain
stats                   order, bounds, height, sizes
check                   verify tree invariants
dump                    JSON snapshot
order N                 rebuild with another order
load PATH               insert integer keys from a CSV file (quote paths with spaces)
undo                    revert the last change
clear                   remove every key
help                    this text
quit             (exit)";

fn key<'a>() -> impl Parser<'a, &'a str, BPlusKey, extra::Err<Rich<'a, char>>> {
    regex(r"-?\d+")
        .try_map(|s: &str, span| s.parse::<BPlusKey>().map_err(|e| Rich::custom(span, e)))
        .padded()
}

fn keyword<'a>(
    pattern: &'a str,
) -> impl Parser<'a, &'a str, &'a str, extra::Err<Rich<'a, char>>> {
    // Word boundary so keywords aren't matched as prefixes of other words
    regex(pattern).padded()
}

pub fn parser<'a>() -> impl Parser<'a, &'a str, Command, extra::Err<Rich<'a, char>>> {
    let insert = keyword(r"(?i)(?:insert|i)\b")
        .ignore_then(key().repeated().at_least(1).collect::<Vec<_>>())
        .map(Command::Insert);

    let delete = keyword(r"(?i)(?:delete|del|d)\b")
        .ignore_then(key().repeated().at_least(1).collect::<Vec<_>>())
        .map(Command::Delete);

    let search = keyword(r"(?i)(?:search|s)\b")
        .ignore_then(key())
        .map(Command::Search);

    let path = keyword(r"(?i)path\b")
        .ignore_then(key())
        .map(Command::Path);

    let range = keyword(r"(?i)range\b")
        .ignore_then(key())
        .then(key())
        .map(|(low, high)| Command::Range(low, high));

    let order = keyword(r"(?i)order\b")
        .ignore_then(
            regex(r"\d+")
                .try_map(|s: &str, span| s.parse::<usize>().map_err(|e| Rich::custom(span, e)))
                .padded(),
        )
        .map(Command::Order);

    // Quote paths that contain spaces
    let quoted_path = regex(r#""[^"]*""#).map(|q: &str| &q[1..q.len() - 1]);
    let bare_path = regex(r#"[^"\s]\S*"#);
    let load = keyword(r"(?i)load\b")
        .ignore_then(choice((quoted_path, bare_path)).padded())
        .map(|p: &str| Command::Load(p.to_string()));

    let bare = choice((
        keyword(r"(?i)show\b").to(Command::Show),
        keyword(r"(?i)leaves\b").to(Command::Leaves),
        keyword(r"(?i)stats\b").to(Command::Stats),
        keyword(r"(?i)check\b").to(Command::Check),
        keyword(r"(?i)dump\b").to(Command::Dump),
        keyword(r"(?i)undo\b").to(Command::Undo),
        keyword(r"(?i)clear\b").to(Command::Clear),
        keyword(r"(?i)help\b").to(Command::Help),
        keyword(r"(?i)(?:quit|exit)\b").to(Command::Quit),
    ));

    choice((insert, delete, search, path, range, order, load, bare)).then_ignore(end())
}

/// Parse one command line
pub fn parse_command(input: &str) -> ShellResult<Command> {
    parser().parse(input).into_result().map_err(|errs| {
        ShellError::Parse(
            errs.iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_delete_lists() {
        assert_eq!(
            parse_command("insert 5 3 -8").unwrap(),
            Command::Insert(vec![5, 3, -8])
        );
        assert_eq!(parse_command("i 1").unwrap(), Command::Insert(vec![1]));
        assert_eq!(
            parse_command("  DELETE 10 20  ").unwrap(),
            Command::Delete(vec![10, 20])
        );
        assert_eq!(parse_command("d 4").unwrap(), Command::Delete(vec![4]));
    }

    #[test]
    fn test_single_key_commands() {
        assert_eq!(parse_command("search 7").unwrap(), Command::Search(7));
        assert_eq!(parse_command("s -7").unwrap(), Command::Search(-7));
        assert_eq!(parse_command("path 12").unwrap(), Command::Path(12));
        assert_eq!(
            parse_command("range 15 35").unwrap(),
            Command::Range(15, 35)
        );
        assert_eq!(parse_command("order 5").unwrap(), Command::Order(5));
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(parse_command("show").unwrap(), Command::Show);
        assert_eq!(parse_command("Leaves").unwrap(), Command::Leaves);
        assert_eq!(parse_command("stats").unwrap(), Command::Stats);
        assert_eq!(parse_command("check").unwrap(), Command::Check);
        assert_eq!(parse_command("dump").unwrap(), Command::Dump);
        assert_eq!(parse_command("undo").unwrap(), Command::Undo);
        assert_eq!(parse_command("clear").unwrap(), Command::Clear);
        assert_eq!(parse_command("help").unwrap(), Command::Help);
        assert_eq!(parse_command("exit").unwrap(), Command::Quit);
    }

    #[test]
    fn test_load_path() {
        assert_eq!(
            parse_command("load data/keys.csv").unwrap(),
            Command::Load("data/keys.csv".to_string())
        );
    }

    #[test]
    fn test_load_quoted_path() {
        assert_eq!(
            parse_command(r#"load "my data/key list.csv""#).unwrap(),
            Command::Load("my data/key list.csv".to_string())
        );
        assert!(parse_command("load my data.csv").is_err());
        assert!(parse_command(r#"load "unterminated.csv"#).is_err());
    }

    #[test]
    fn test_errors() {
        assert!(parse_command("insert").is_err());
        assert!(parse_command("insert x").is_err());
        assert!(parse_command("range 1").is_err());
        assert!(parse_command("order -3").is_err());
        assert!(parse_command("showme").is_err());
        assert!(parse_command("search 1 2").is_err());
        assert!(matches!(parse_command("frobnicate"), Err(ShellError::Parse(_))));
    }
}

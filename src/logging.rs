use env_logger::{Builder, Target};
use log::{LevelFilter, debug};

/// Environment variable consulted when no level is passed on the command line
pub const LOG_ENV: &str = "BPTREE_LOG";

const DEFAULT_LEVEL: &str = "warn";

fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Warn,
    }
}

/// Apply a filter like `debug` or `warn,bptree::btree=trace` to the builder
fn apply_filters(builder: &mut Builder, filters: &str) {
    for pair in filters.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((module, level)) => {
                builder.filter_module(module.trim(), parse_level(level));
            }
            None => {
                builder.filter_level(parse_level(pair));
            }
        }
    }
}

/// Set up stderr logging
///
/// priority: CLI argument, `BPTREE_LOG`, `RUST_LOG`, default `warn`
pub fn init_logger(user_log_level: Option<&str>) {
    let env_log_level = std::env::var(LOG_ENV).ok();

    let mut log_builder = Builder::from_default_env();
    log_builder.target(Target::Stderr);

    let log_level = user_log_level
        .map(str::to_string)
        .or(env_log_level)
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string());

    apply_filters(&mut log_builder, &log_level);

    // Tests may have installed a logger already
    if log_builder.try_init().is_ok() {
        debug!("log level {log_level}");
    }
}

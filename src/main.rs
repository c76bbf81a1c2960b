use std::fs;
use std::io;
use std::process::ExitCode;

use bptree::btree::DEFAULT_ORDER;
use bptree::logging::init_logger;
use bptree::shell::{Command, DEFAULT_HISTORY, Outcome, Session, SessionConfig, ShellResult};
use clap::Parser;
use log::error;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

#[derive(Parser)]
#[command(name = "bptree")]
#[command(version)]
#[command(about = "Interactive B+ tree shell", long_about = None)]
struct Args {
    /// Tree order (maximum children per node)
    #[arg(short = 'o', long, default_value_t = DEFAULT_ORDER)]
    order: usize,

    /// CSV file of integer keys to insert at startup
    #[arg(short = 'L', long)]
    load: Option<String>,

    /// CSV column holding the keys
    #[arg(short = 'c', long, default_value_t = 0)]
    column: usize,

    /// Run commands from a file instead of prompting
    #[arg(short = 's', long)]
    script: Option<String>,

    /// Number of undo steps kept
    #[arg(long, default_value_t = DEFAULT_HISTORY)]
    history: usize,

    /// log level
    #[arg(short = 'l', long = "log-level")]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.log_level.as_deref());

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> ShellResult<()> {
    let mut session = Session::new(SessionConfig {
        order: args.order,
        history_limit: args.history,
        load_column: args.column,
    })?;

    if let Some(path) = args.load {
        if let Outcome::Continue(text) = session.execute(Command::Load(path))? {
            println!("{text}");
        }
    }

    match args.script {
        Some(path) => {
            let script = fs::read_to_string(path)?;
            session.run_script(&script, &mut io::stdout().lock())
        }
        None => repl(&mut session),
    }
}

fn repl(session: &mut Session) -> ShellResult<()> {
    let mut editor = DefaultEditor::new()?;
    println!("B+ tree of order {}. Type 'help' for commands.", session.tree().order());

    loop {
        match editor.readline("bptree> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    editor.add_history_entry(trimmed).ok();
                }

                match session.execute_line(trimmed) {
                    Ok(Outcome::Continue(text)) if text.is_empty() => {}
                    Ok(Outcome::Continue(text)) => println!("{text}"),
                    Ok(Outcome::Quit) => break,
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

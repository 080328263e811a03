use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use casually::commands::{
    self, parse_state, Outcome, ProjectCommand, RoutineCommand, SectionCommand, SubtaskCommand,
};
use casually::core::{state, TaskService};
use casually::types::TaskState;
use casually::{db, error};

mod output;

use output::Printer;

#[derive(Parser)]
#[command(name = "cas")]
#[command(version)]
#[command(
    about = "Casually - projects, subtasks and routines with blocker tracking",
    long_about = r#"
Casually (cas) - personal task tracking with dependency-aware state.

Features:
  • Projects own subtasks; routines live in optional sections
  • Blockers between tasks of the same kind, with cycle detection
  • Completing or deleting a task unblocks whatever waited on it
  • Subtasks follow their project in and out of ACTIVE

Environment:
  CASUALLY_DB_PATH  Override database location
  NO_COLOR          Disable colored output
  RUST_LOG          Enable diagnostic logging to stderr
"#
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output in JSON format (for programmatic use)
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Override database path (default: ./.casually/tasks.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Long-running tasks that own subtasks
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Short tasks inside a project
    #[command(subcommand)]
    Subtask(SubtaskCommand),

    /// Recurring tasks
    #[command(subcommand)]
    Routine(RoutineCommand),

    /// Routine sections
    #[command(subcommand)]
    Section(SectionCommand),

    /// List every blocked task, grouped by kind
    Blocked,

    /// Show the states reachable from STATE
    Transitions {
        #[arg(value_parser = parse_state)]
        state: TaskState,
    },

    /// Generate shell completions
    #[command(
        about = "Generate shell completions",
        long_about = r#"
Generate shell completions for the cas CLI.

Examples:
  cas completions bash > ~/.local/share/bash-completion/completions/cas
  cas completions zsh > ~/.zfunc/_cas
  cas completions fish > ~/.config/fish/completions/cas.fish
"#
    )]
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },

    /// Initialize database
    #[command(
        about = "Initialize database",
        long_about = r#"
Initialize the Casually database.

The database is created at:
  1. --db (if given)
  2. CASUALLY_DB_PATH (if set)
  3. CWD/.casually/tasks.db (fallback)

Usually runs automatically on first command.
"#
    )]
    Init,
}

/// Resolution order: CASUALLY_DB_PATH, then ./.casually/tasks.db
fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("CASUALLY_DB_PATH") {
        return PathBuf::from(path);
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    cwd.join(".casually").join("tasks.db")
}

/// Logging is opt-in via RUST_LOG; invalid or oversized filters are ignored.
fn init_tracing() {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("off"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    // Completions bypass normal output flow - raw shell script to stdout
    if let Command::Completions { shell } = &cli.command {
        generate(*shell, &mut Cli::command(), "cas", &mut io::stdout());
        return;
    }

    let db_path = cli.db.clone().unwrap_or_else(default_db_path);

    match run(&cli.command, &db_path) {
        Ok(output) => {
            if cli.json {
                println!("{}", output);
            } else {
                let printer = Printer::new(cli.no_color);
                printer.print(&cli.command, &output);
            }
        }
        Err(e) => {
            if cli.json {
                let err = serde_json::json!({
                    "error": e.to_string(),
                    "status": e.http_status(),
                });
                eprintln!("{}", err);
            } else {
                let printer = Printer::new_for_stderr(cli.no_color);
                printer.print_error(&format!("Error: {}", e));
            }
            std::process::exit(1);
        }
    }
}

fn render<T: serde::Serialize>(outcome: Outcome<T>) -> error::Result<String> {
    match outcome {
        Outcome::One(item) => Ok(serde_json::to_string_pretty(&item)?),
        Outcome::Many(items) => Ok(serde_json::to_string_pretty(&items)?),
        Outcome::Deleted => Ok(serde_json::json!({ "deleted": true }).to_string()),
    }
}

fn run(command: &Command, db_path: &Path) -> error::Result<String> {
    match command {
        Command::Init => {
            db::open_db(db_path)?;
            Ok(serde_json::json!({ "initialized": true, "path": db_path }).to_string())
        }
        Command::Project(cmd) => {
            let conn = db::open_db(db_path)?;
            render(commands::project::handle(&conn, cmd.clone())?)
        }
        Command::Subtask(cmd) => {
            let conn = db::open_db(db_path)?;
            render(commands::subtask::handle(&conn, cmd.clone())?)
        }
        Command::Routine(cmd) => {
            let conn = db::open_db(db_path)?;
            render(commands::routine::handle(&conn, cmd.clone())?)
        }
        Command::Section(cmd) => {
            let conn = db::open_db(db_path)?;
            render(commands::section::handle(&conn, cmd.clone())?)
        }
        Command::Blocked => {
            let conn = db::open_db(db_path)?;
            let view = TaskService::new(&conn).blocked()?;
            Ok(serde_json::to_string_pretty(&view)?)
        }
        Command::Transitions { state: from } => {
            let next = state::valid_next_states(*from);
            Ok(serde_json::to_string_pretty(&serde_json::json!({
                "from": from,
                "next": next,
            }))?)
        }
        // Completions handled in main() before run() is called
        Command::Completions { .. } => unreachable!("completions handled before run()"),
    }
}

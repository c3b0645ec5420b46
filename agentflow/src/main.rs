//! Goal-driven workflow CLI.
//!
//! Plans a goal into tasks, executes them with the built-in tools, validates
//! the result, and remembers the session in `.agentflow/memory.json`.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use agentflow::exit_codes;
use agentflow::io::config::{DEFAULT_CONFIG_PATH, EngineConfig, load_config, write_config};
use agentflow::io::memory::{FileMemoryStore, MemorySink};
use agentflow::io::session_log::write_session;
use agentflow::logging;
use agentflow::orchestrator::{CancelFlag, Orchestrator, RunOutcome, WorkflowRun};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "agentflow",
    version,
    about = "Plan, execute, and validate goals with tools"
)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Config file (default: `.agentflow/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single goal through the workflow.
    Run {
        /// Goal text; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        goal: Vec<String>,
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Read goals from stdin, one per line, until `exit` or `quit`.
    Chat,
    /// List the registered tools.
    Tools,
    /// Inspect or reset the session memory.
    Memory {
        #[command(subcommand)]
        action: MemoryCommand,
    },
    /// Manage the config file.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// Rank remembered entries against a query.
    Search {
        query: String,
        #[arg(short, default_value_t = 5)]
        k: usize,
    },
    /// Print entry and session counts.
    Stats,
    /// Remove every remembered entry.
    Clear,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    match cli.command {
        Command::Run { goal, json } => cmd_run(&config_path, &goal.join(" "), json),
        Command::Chat => cmd_chat(&config_path),
        Command::Tools => cmd_tools(&config_path),
        Command::Memory { action } => cmd_memory(&config_path, action),
        Command::Config {
            action: ConfigCommand::Init { force },
        } => cmd_config_init(&config_path, force),
    }
}

fn cmd_run(config_path: &Path, goal: &str, json: bool) -> Result<i32> {
    let goal = goal.trim();
    if goal.is_empty() {
        bail!("goal must not be empty");
    }
    let config = load_config(config_path)?;
    let orchestrator = Orchestrator::from_config(&config)?;
    let run = orchestrator.run_with_cancel(goal, &CancelFlag::new());
    record_session(&config, &run);

    if json {
        let payload = serde_json::to_string_pretty(&run.outcome).context("serialize outcome")?;
        println!("{payload}");
    } else {
        print!("{}", render_outcome(&run.outcome));
    }
    Ok(exit_code(&run.outcome))
}

fn cmd_chat(config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let orchestrator = Orchestrator::from_config(&config)?;
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        stdout.flush().context("flush stdout")?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("read stdin")? == 0 {
            break;
        }
        let goal = line.trim();
        if goal.is_empty() {
            continue;
        }
        if goal.eq_ignore_ascii_case("exit") || goal.eq_ignore_ascii_case("quit") {
            break;
        }
        let run = orchestrator.run_with_cancel(goal, &CancelFlag::new());
        record_session(&config, &run);
        print!("{}", render_outcome(&run.outcome));
    }
    Ok(exit_codes::OK)
}

fn cmd_tools(config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let orchestrator = Orchestrator::from_config(&config)?;
    for tool in orchestrator.tools().catalog() {
        println!("{}: {}", tool.name, tool.description);
    }
    Ok(exit_codes::OK)
}

fn cmd_memory(config_path: &Path, action: MemoryCommand) -> Result<i32> {
    let config = load_config(config_path)?;
    let store = FileMemoryStore::open(config.memory.path.clone(), config.memory.min_score)?;
    match action {
        MemoryCommand::Search { query, k } => {
            let hits = store.retrieve(&query, k)?;
            if hits.is_empty() {
                println!("No relevant memories found");
            }
            for (index, hit) in hits.iter().enumerate() {
                println!("[{}] (score: {:.2}) {}", index + 1, hit.score, hit.text);
            }
        }
        MemoryCommand::Stats => {
            let stats = store.stats()?;
            println!("path: {}", stats.path.display());
            println!("entries: {}", stats.entries);
            println!("goals: {}", stats.goals);
            println!("tasks: {}", stats.tasks);
            println!("sessions: {}", stats.sessions);
        }
        MemoryCommand::Clear => {
            store.clear()?;
            println!("cleared {}", store.path().display());
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_config_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &EngineConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

/// Write session artifacts when a log dir is configured. Failures only warn.
fn record_session(config: &EngineConfig, run: &WorkflowRun) {
    let Some(log_dir) = &config.session.log_dir else {
        return;
    };
    let report = run
        .state
        .final_output
        .as_deref()
        .unwrap_or(&run.outcome.output);
    if let Err(err) = write_session(log_dir, &run.state, &run.outcome, report) {
        warn!(error = %format!("{err:#}"), "failed to write session log");
    }
}

fn exit_code(outcome: &RunOutcome) -> i32 {
    match (outcome.success, outcome.validation_passed) {
        (true, true) => exit_codes::OK,
        (true, false) => exit_codes::VALIDATION_FAILED,
        (false, _) => exit_codes::PLAN_FAILED,
    }
}

fn render_outcome(outcome: &RunOutcome) -> String {
    let mut lines = vec![
        format!("session: {}", outcome.session_id),
        format!(
            "status: {}",
            if outcome.success { "completed" } else { "failed" }
        ),
        format!("iterations: {}", outcome.iterations),
        format!(
            "validation: {}",
            if outcome.validation_passed {
                "passed"
            } else {
                "not passed"
            }
        ),
        String::new(),
        outcome.output.clone(),
    ];
    if !outcome.errors.is_empty() {
        lines.push(String::new());
        lines.push("errors:".to_string());
        lines.extend(outcome.errors.iter().map(|e| format!("- {e}")));
    }
    if !outcome.warnings.is_empty() {
        lines.push(String::new());
        lines.push("warnings:".to_string());
        lines.extend(outcome.warnings.iter().map(|w| format!("- {w}")));
    }
    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

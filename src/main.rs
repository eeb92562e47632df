//! Symgraph CLI - replay parser event logs into a persistent symbol graph

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use symgraph::config::{self, Language, ProjectConfig};
use symgraph::ingest::{self, Engine, ReplayOptions};
use symgraph::output::{self, OutputMode};
use symgraph::storage::{GraphSink, SqliteSink};
use symgraph::ui::{self, Icons, ProgressManager, ProgressMessage, ProgressPhase};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "symgraph")]
#[command(version)]
#[command(about = "Symbol graph ingestion engine - fold parser events into one deduplicated code graph")]
#[command(long_about = r#"
Symgraph replays the parse events language front ends emit (one JSON object
per line) into a single symbol graph, deduplicating every symbol and
relationship across files, and commits the result to SQLite.

Example usage:
  symgraph init --name demo --language cpp
  symgraph ingest --events parse.jsonl --workers 4
  symgraph node --key "app::Foo::bar"
  symgraph diagnostics
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as a JSON envelope
    #[arg(long, global = true)]
    json: bool,

    /// Path to the project config
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a new project config
    Init {
        /// Project name (defaults to the current directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Source language: c, cpp or java
        #[arg(short, long, default_value = "cpp")]
        language: Language,

        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// List the source files the project config selects
    Files,

    /// Replay an event log into the graph and commit it
    Ingest {
        /// JSON Lines event log
        #[arg(short, long)]
        events: PathBuf,

        /// Path to the database file (defaults to the configured one)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Parallel ingestion workers (defaults to the configured count)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Retract these files after replay, before committing
        #[arg(long)]
        retract: Vec<String>,
    },

    /// Show statistics about a committed graph
    Stats {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// List diagnostics recorded during the last ingestion
    Diagnostics {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Only fatal diagnostics
        #[arg(long)]
        fatal: bool,
    },

    /// Look up a node by canonical key and list its outgoing edges
    Node {
        /// Canonical key, e.g. "public app::Foo::bar"
        #[arg(short, long)]
        key: String,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mode = OutputMode::from_flag(cli.json);
    let command = command_name(&cli.command);
    if let Err(err) = run(cli, mode) {
        let _ = output::emit_error(mode, command, &format!("{err:#}"));
        std::process::exit(1);
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Init { .. } => "init",
        Commands::Files => "files",
        Commands::Ingest { .. } => "ingest",
        Commands::Stats { .. } => "stats",
        Commands::Diagnostics { .. } => "diagnostics",
        Commands::Node { .. } => "node",
    }
}

fn run(cli: Cli, mode: OutputMode) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let loaded = config::load_config(Some(&config_path))?;

    match cli.command {
        Commands::Init { name, language, force } => {
            let name = name.unwrap_or_else(|| {
                std::env::current_dir()
                    .ok()
                    .and_then(|d| d.file_name().map(|s| s.to_string_lossy().to_string()))
                    .unwrap_or_else(|| "project".to_string())
            });
            let project = ProjectConfig::for_language(name, language);
            config::write_config(&config_path, &project, force)?;

            if mode.is_human() {
                ui::success(&format!("Wrote {}", config_path.display()));
                ui::summary_row("Language", &format!("{} ({})", project.language, project.standard));
                ui::summary_row("Database", &project.database.display().to_string());
            }
            output::emit_success(mode, "init", &project)?;
        }

        Commands::Files => {
            let project = require_config(loaded, &config_path)?;
            let files = project.collect_source_files();

            if mode.is_human() {
                ui::header(&format!("{} source file(s) in {}", files.len(), project.name));
                for file in &files {
                    println!("  {} {}", Icons::FILE, file.display());
                }
            }
            output::emit_success(mode, "files", &files)?;
        }

        Commands::Ingest {
            events,
            database,
            workers,
            retract,
        } => {
            let project = loaded.unwrap_or_default();
            let database = database.unwrap_or_else(|| project.database_path());
            let workers = workers.unwrap_or(project.workers);
            ingest_log(mode, &events, &database, workers, &retract)?;
        }

        Commands::Stats { database } => {
            let database = database_or_default(database, loaded);
            let sink = open_existing(&database)?;
            let stats = sink.stats()?;

            if mode.is_human() {
                ui::status(Icons::STATS, "Graph statistics", &database.display().to_string());
                println!(
                    "{}",
                    ui::stats_table(&[
                        ("Nodes", stats.nodes),
                        ("Implicit nodes", stats.implicit_nodes),
                        ("Edges", stats.edges),
                        ("Files", stats.files),
                        ("Locations", stats.locations),
                        ("Diagnostics", stats.diagnostics),
                    ])
                );
                if let Some(version) = sink.key_format_version()? {
                    ui::summary_row("Key format", &format!("v{version}"));
                }
            }
            output::emit_success(mode, "stats", &stats)?;
        }

        Commands::Diagnostics { database, fatal } => {
            let database = database_or_default(database, loaded);
            let sink = open_existing(&database)?;
            let diagnostics: Vec<_> = sink
                .diagnostics()?
                .into_iter()
                .filter(|d| !fatal || d.fatal)
                .collect();

            if mode.is_human() {
                if diagnostics.is_empty() {
                    ui::success("No diagnostics");
                } else {
                    ui::section(&format!(" {} diagnostic(s) ", diagnostics.len()));
                    for diag in &diagnostics {
                        ui::diagnostic(diag);
                    }
                }
            }
            output::emit_success(mode, "diagnostics", &diagnostics)?;
        }

        Commands::Node { key, database } => {
            let database = database_or_default(database, loaded);
            let sink = open_existing(&database)?;
            let node = sink
                .node_by_key(&key)?
                .with_context(|| format!("no node with key {key:?}"))?;
            let edges = sink.edges_from(node.id)?;

            if mode.is_human() {
                let keys: std::collections::HashMap<_, _> =
                    sink.nodes()?.into_iter().map(|n| (n.id, n.key)).collect();
                ui::info(&format!("{} {}", Icons::NODE, node.id), &node.short_description());
                for edge in &edges {
                    let target = keys
                        .get(&edge.target)
                        .map(|k| k.to_string())
                        .unwrap_or_else(|| edge.target.to_string());
                    println!("  {} {} {}", Icons::LINK, ui::muted(edge.kind.as_str()), target);
                }
            }
            output::emit_success(mode, "node", serde_json::json!({ "node": node, "edges": edges }))?;
        }
    }

    Ok(())
}

fn ingest_log(mode: OutputMode, events: &Path, database: &Path, workers: usize, retract: &[String]) -> anyhow::Result<()> {
    let start = Instant::now();
    let file = std::fs::File::open(events).with_context(|| format!("cannot open {}", events.display()))?;
    let parsed = ingest::read_events(std::io::BufReader::new(file))?;
    let streams = ingest::split_streams(parsed);

    if mode.is_human() {
        ui::header(&format!("Ingesting {}", events.display()));
        ui::status(Icons::FILE, "Streams", &streams.len().to_string());
        ui::status(Icons::GEAR, "Workers", &workers.to_string());
        ui::status(Icons::DATABASE, "Database", &database.display().to_string());
    }

    let engine = Arc::new(Engine::new());
    let (mut progress, tx) = if mode.is_human() {
        let (manager, tx) = ProgressManager::new(streams.len());
        (Some(manager), Some(tx))
    } else {
        (None, None)
    };

    let options = ReplayOptions {
        workers,
        progress: tx.clone(),
    };
    let report = ingest::replay(&engine, streams, &options)?;

    for path in retract {
        let retracted = engine.retract_file(path)?;
        tracing::info!(
            "Retracted {}: {} node(s), {} edge(s)",
            path,
            retracted.nodes_removed,
            retracted.edges_removed
        );
    }

    if !engine.check_invariants()? {
        tracing::warn!("Graph invariants violated after replay");
    }

    let snapshot = engine.snapshot()?;
    config::ensure_db_dir(database)?;
    let mut sink = SqliteSink::open(database)?;
    if let Some(tx) = &tx {
        let _ = tx.send(ProgressMessage::Started {
            phase: ProgressPhase::Committing,
            total: 1,
        });
    }
    let committed = sink.commit(&snapshot);
    if let Some(tx) = &tx {
        let _ = tx.send(ProgressMessage::Finished {
            phase: ProgressPhase::Committing,
        });
    }
    drop(options);
    drop(tx);
    committed?;

    if let Some(progress) = progress.as_mut() {
        progress.finish_with_summary(
            start.elapsed(),
            report.summary.files_indexed,
            snapshot.nodes.len(),
            snapshot.edges.len(),
        );
        if report.summary.files_failed > 0 {
            ui::warn(&format!("{} file(s) failed and were retracted", report.summary.files_failed));
        }
        if !snapshot.diagnostics.is_empty() {
            ui::section(&format!(" {} diagnostic(s) ", snapshot.diagnostics.len()));
            for diag in &snapshot.diagnostics {
                ui::diagnostic(diag);
            }
        }
    }

    output::emit_success(
        mode,
        "ingest",
        serde_json::json!({
            "replay": report,
            "nodes": snapshot.nodes.len(),
            "edges": snapshot.edges.len(),
            "files": snapshot.files.len(),
            "diagnostics": snapshot.diagnostics.len(),
            "database": database,
        }),
    )?;
    Ok(())
}

fn require_config(loaded: Option<ProjectConfig>, path: &Path) -> anyhow::Result<ProjectConfig> {
    loaded.with_context(|| format!("no config at {} (run `symgraph init` first)", path.display()))
}

fn database_or_default(database: Option<PathBuf>, loaded: Option<ProjectConfig>) -> PathBuf {
    database.unwrap_or_else(|| loaded.unwrap_or_default().database_path())
}

fn open_existing(database: &Path) -> anyhow::Result<SqliteSink> {
    if !database.exists() {
        anyhow::bail!("no graph database at {} (run `symgraph ingest` first)", database.display());
    }
    Ok(SqliteSink::open(database)?)
}

//! `nebula` — the `graph run` CLI driver over `nebula-engine`.

mod graph;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use nebula_action::StreamMode;
use nebula_engine::{Engine, ExecutionMode, ExecutionOptions, StepGate};
use nebula_eventbus::{Event, EventBus};
use nebula_node::NodeRegistry;
use nebula_storage::{RuntimeStorage, Storage};
use nebula_value::SocketValue;
use tokio_util::sync::CancellationToken;

use graph::{GraphSource, JsonGraphSource};

#[derive(Parser)]
#[command(name = "nebula", about = "Run Nebula dataflow/control-flow graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Operate on a persisted graph.
    Graph {
        #[command(subcommand)]
        action: GraphCommand,
    },
}

#[derive(Subcommand)]
enum GraphCommand {
    /// Load a graph file and run it to completion.
    Run(RunArgs),
    /// List every registered node definition, grouped by category.
    Catalog {
        /// Only show definitions whose id, name, or description contains this.
        query: Option<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to a JSON graph envelope.
    path: PathBuf,

    /// Upper bound on concurrently running node bodies. Omit for
    /// Sequential scheduling.
    #[arg(long)]
    parallel: Option<usize>,

    /// How a stream producer's `emit` interacts with downstream execution.
    #[arg(long, value_enum, default_value_t = CliStreamMode::Sequential)]
    stream_mode: CliStreamMode,

    /// Start paused and single-step through node execution, logging each
    /// admitted node as it runs.
    #[arg(long)]
    step: bool,

    /// Allow this run's background-eligible nodes to enqueue work instead
    /// of running inline.
    #[arg(long)]
    background: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliStreamMode {
    Sequential,
    Fireforget,
}

impl From<CliStreamMode> for StreamMode {
    fn from(mode: CliStreamMode) -> Self {
        match mode {
            CliStreamMode::Sequential => StreamMode::Sequential,
            CliStreamMode::Fireforget => StreamMode::FireAndForget,
        }
    }
}

/// Successful run, no cancellation.
const EXIT_OK: u8 = 0;
/// Any execution, plan, or I/O error.
const EXIT_ERROR: u8 = 1;
/// The run was cancelled (Ctrl+C, or a cancelled node body).
const EXIT_CANCELLED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    nebula_log::init_from_env().ok();

    let cli = Cli::parse();
    let Command::Graph { action } = cli.command;

    match action {
        GraphCommand::Run(args) => run_graph(args).await,
        GraphCommand::Catalog { query } => {
            print_catalog(query.as_deref());
            ExitCode::from(EXIT_OK)
        }
    }
}

fn print_catalog(query: Option<&str>) {
    let mut registry = NodeRegistry::new();
    nebula_nodes::register_builtins(&mut registry).expect("built-in definitions never collide");

    for (category, entries) in registry.catalog(query) {
        println!("{category}");
        for entry in entries {
            println!("  {:<18} {}", entry.name, entry.description);
        }
    }
}

async fn run_graph(args: RunArgs) -> ExitCode {
    let mut registry = NodeRegistry::new();
    if let Err(err) = nebula_nodes::register_builtins(&mut registry) {
        tracing::error!(%err, "failed to register built-in nodes");
        return ExitCode::from(EXIT_ERROR);
    }

    let (nodes, connections, variables) = match JsonGraphSource.load(&args.path, &registry) {
        Ok(loaded) => loaded,
        Err(err) => {
            tracing::error!(%err, path = %args.path.display(), "failed to load graph");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let event_bus = EventBus::new(1024);
    let storage: Arc<dyn Storage> = Arc::new(RuntimeStorage::new(event_bus));

    for (key, value) in &variables {
        let boxed = match SocketValue::from_value(value) {
            Ok(boxed) => boxed,
            Err(err) => {
                tracing::error!(%err, %key, "failed to box seed variable");
                return ExitCode::from(EXIT_ERROR);
            }
        };
        storage.set_variable(key, boxed);
    }

    let mode = match args.parallel {
        Some(n) => ExecutionMode::parallel(n),
        None => ExecutionMode::Sequential,
    };
    let options = ExecutionOptions::new()
        .with_mode(mode)
        .with_stream_mode(args.stream_mode.into())
        .with_background(args.background);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("cancellation requested");
                cancel.cancel();
            }
        });
    }

    let engine = Engine::new(Arc::new(registry));

    let result = if args.step {
        run_stepped(&engine, &nodes, &connections, storage, options, cancel).await
    } else {
        engine
            .execute(
                &nodes,
                &connections,
                storage,
                serde_json::Value::Null,
                options,
                cancel,
            )
            .await
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(err) if err.is_cancelled() => {
            tracing::warn!("execution cancelled");
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(err) => {
            tracing::error!(%err, "execution failed");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// `--step` driver: starts the gate paused and admits exactly one more node
/// body each time a [`Event::NodeStarted`] is observed on the event bus,
/// logging the admitted node. There is no interactive attach point in this
/// build — "stepping" here means the run narrates its own progress one node
/// at a time rather than pausing for operator input.
async fn run_stepped(
    engine: &Engine,
    nodes: &[nebula_node::NodeData],
    connections: &[nebula_node::Connection],
    storage: Arc<dyn Storage>,
    options: ExecutionOptions,
    cancel: CancellationToken,
) -> Result<(), nebula_engine::ExecError> {
    let gate = Arc::new(StepGate::start_paused());
    let mut subscriber = storage.event_bus().subscribe();

    let narrator = tokio::spawn({
        let gate = gate.clone();
        async move {
            while let Some(event) = subscriber.recv().await {
                if let Event::NodeStarted { node_id, .. } = event {
                    tracing::info!(%node_id, "stepping");
                }
                gate.step_once();
            }
        }
    });

    // Admit the first node before any event has fired.
    gate.step_once();

    let result = engine
        .execute_with_gate(
            nodes,
            connections,
            storage,
            serde_json::Value::Null,
            options,
            cancel,
            gate,
        )
        .await;

    narrator.abort();
    result
}

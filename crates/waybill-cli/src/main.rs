// Waybill CLI
//
// Design Decision: clap derive for ergonomic argument parsing, matching the
// reference repository's CLI crate.
// Design Decision: no HTTP client here — this engine has no server process;
// the CLI links the library crates directly and performs dispatch/worker-run
// operations in-process.

mod demo;
mod wiring;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use waybill_envelope::ActivitySpec;
use waybill_registry::AgentRegistry;
use waybill_repository::{Pagination, WorkflowFilter, WorkflowRepository};
use waybill_runtime::{DispatchOptions, Dispatcher, ExecutorConfig};
use waybill_transport::Transport;

#[derive(Parser)]
#[command(name = "waybill")]
#[command(about = "Routing-slip workflow engine for distributed agent activities")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch a new workflow from an ordered list of activity steps.
    Dispatch {
        /// One itinerary step as `agent_name=prompt`; repeat in execution order.
        #[arg(long = "step", required = true)]
        steps: Vec<String>,

        /// Optional trace id, propagated verbatim in the envelope.
        #[arg(long)]
        trace_id: Option<String>,
    },

    /// Run a worker loop for one agent.
    Worker {
        #[command(subcommand)]
        command: WorkerCommand,
    },

    /// Inspect dispatched workflows.
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },
}

#[derive(Subcommand)]
enum WorkerCommand {
    /// Subscribe to `agent`'s topic and process deliveries until interrupted.
    Run {
        /// The agent name to serve (also the topic subscribed to).
        agent: String,

        /// Register the built-in `echo` demonstration runner under this
        /// name instead of requiring an embedder-supplied `ActivityRunner`.
        /// The real runner (an LLM invocation or other collaborator) is out
        /// of this crate's scope; this flag exists so the CLI is runnable
        /// on a bare checkout.
        #[arg(long)]
        demo: bool,
    },
}

#[derive(Subcommand)]
enum WorkflowCommand {
    /// Show one workflow's record and step history.
    Show {
        /// The workflow's correlation id.
        correlation_id: Uuid,
    },
    /// List dispatched workflows.
    List {
        /// Restrict to this status (`pending`, `running`, `completed`, `failed`).
        #[arg(long)]
        status: Option<String>,
    },
}

fn parse_step(raw: &str) -> anyhow::Result<ActivitySpec> {
    let (agent_name, prompt) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("malformed --step '{raw}', expected agent_name=prompt"))?;
    Ok(ActivitySpec::new(agent_name, prompt))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = waybill_runtime::WaybillConfig::from_env();

    match cli.command {
        Commands::Dispatch { steps, trace_id } => {
            let transport = wiring::build_transport(&config)?;
            let repository = wiring::build_repository(&config).await?;
            transport.connect().await?;

            let mut dispatcher = Dispatcher::new();
            for raw in &steps {
                dispatcher.add_to_runway(parse_step(raw)?);
            }

            let correlation_id = dispatcher
                .dispatch_workflow(
                    &transport,
                    &repository,
                    DispatchOptions {
                        trace_id,
                        ..Default::default()
                    },
                )
                .await?;
            println!("dispatched workflow {correlation_id}");
        }

        Commands::Worker {
            command: WorkerCommand::Run { agent, demo },
        } => {
            let transport = wiring::build_transport(&config)?;
            let repository = wiring::build_repository(&config).await?;

            let registry = Arc::new(AgentRegistry::new(config.max_insertions));
            if demo {
                registry.register(agent.clone(), Arc::new(demo::EchoRunner), "unit")?;
            }

            let executor = waybill_runtime::ActivityExecutor::new(
                transport,
                repository,
                registry,
                ExecutorConfig {
                    agent_name: agent.clone(),
                    consumer_name: config.worker_id.clone(),
                    max_attempts: config.max_attempts,
                    backoff: waybill_runtime::BackoffPolicy {
                        base: config.backoff_base,
                        cap: config.backoff_cap,
                        jitter: 0.1,
                    },
                },
            );

            let executor = Arc::new(executor);
            let shutdown = {
                let executor = executor.clone();
                async move {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!(agent_name = %agent, "received shutdown signal");
                    executor.stop();
                }
            };
            tokio::select! {
                result = executor.run() => result?,
                _ = shutdown => {}
            }
        }

        Commands::Workflow {
            command: WorkflowCommand::Show { correlation_id },
        } => {
            let repository = wiring::build_repository(&config).await?;
            let workflow = repository
                .get_workflow(correlation_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no workflow found for {correlation_id}"))?;
            let steps = repository.get_steps(correlation_id).await?;
            println!("{}", serde_json::to_string_pretty(&workflow)?);
            for step in steps {
                println!("{}", serde_json::to_string_pretty(&step)?);
            }
        }

        Commands::Workflow {
            command: WorkflowCommand::List { status },
        } => {
            let repository = wiring::build_repository(&config).await?;
            let filter = WorkflowFilter {
                status: status.map(|s| s.parse()).transpose().map_err(|e: String| anyhow::anyhow!(e))?,
            };
            let workflows = repository.list_workflows(filter, Pagination::default()).await?;
            for workflow in workflows {
                println!(
                    "{}  {}  updated_at={}",
                    workflow.correlation_id, workflow.status, workflow.updated_at
                );
            }
        }
    }

    Ok(())
}

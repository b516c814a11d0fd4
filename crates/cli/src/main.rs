//! Daylock CLI - routine workflows that lock system controls until tasks are done.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use daylock_core::{
    day_name, weekday_index, ClockTime, DayIndex, Edge, EdgeId, LockType, Node, NodeCard, NodeId,
    NodeKind, Schedule, Workflow, WorkflowGraph, WorkflowId,
};
use daylock_execution::{
    verify_and_validate, Clock, DependencyLockEngine, LoggingAdapter, OllamaConfig, OllamaOracle,
    Outcome, ReconcilerConfig, Reconciliation, ScheduleReconciler, SystemClock, WorkflowLibrary,
};
use daylock_storage::{JsonStorage, WorkflowStore};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "daylock")]
#[command(about = "Lock wifi, apps and entertainment until your routine is done", long_about = None)]
struct Cli {
    /// Data directory
    #[arg(long, global = true, default_value = ".daylock")]
    data_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a day's workflow from the starter routine
    Init {
        /// Day of week (Monday = 0); defaults to today
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=6))]
        day: Option<u8>,
    },
    /// List workflows
    List {
        /// List templates instead of day workflows
        #[arg(long)]
        templates: bool,
    },
    /// Show a workflow's nodes and edges
    Show {
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
    },
    /// Show derived gate states without changing anything
    Status {
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
        /// Evaluate at this local time ("YYYY-MM-DD HH:MM")
        #[arg(long, value_parser = parse_at)]
        at: Option<NaiveDateTime>,
    },
    /// Add a verifiable task
    AddTask {
        /// Task title
        title: String,
        /// Task description
        #[arg(long, default_value = "")]
        description: String,
        /// Window start ("HH:MM")
        #[arg(long, requires_all = ["end", "days"])]
        start: Option<String>,
        /// Window end ("HH:MM")
        #[arg(long, requires_all = ["start", "days"])]
        end: Option<String>,
        /// Scheduled days (Monday = 0), comma separated
        #[arg(long, requires = "start", value_delimiter = ',', value_parser = clap::value_parser!(u8).range(0..=6))]
        days: Vec<u8>,
        /// Gate this task should hold locked
        #[arg(long)]
        gate: Option<String>,
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
    },
    /// Add a system control gate
    AddGate {
        /// Gate title
        title: String,
        /// What the gate locks: wifi, apps or entertainment
        #[arg(long)]
        lock_type: LockType,
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
    },
    /// Make a gate depend on a task
    Link {
        /// Task node ID
        task: String,
        /// Gate node ID
        gate: String,
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
    },
    /// Remove an edge
    Unlink {
        /// Edge ID
        edge: String,
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
    },
    /// Remove a node and its edges
    Remove {
        /// Node ID
        node: String,
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
    },
    /// Mark a task done
    Validate {
        /// Task node ID
        task: String,
        /// Proof reference to store with the task
        #[arg(long)]
        proof: Option<String>,
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
    },
    /// Clear a task's validation
    Reset {
        /// Task node ID
        task: String,
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
    },
    /// Verify a task with a photo and validate it on acceptance
    Verify {
        /// Task node ID
        task: String,
        /// Image file
        image: PathBuf,
        /// Ollama server URL
        #[arg(long, default_value = "http://localhost:11434")]
        ollama_url: String,
        /// Vision model
        #[arg(long, default_value = "llava")]
        model: String,
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
    },
    /// Save a workflow's graph as a template
    SaveTemplate {
        /// Template name
        name: String,
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
    },
    /// Copy a template into a day's workflow
    ApplyTemplate {
        /// Template ID
        template: String,
        /// Day of week (Monday = 0); defaults to today
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=6))]
        day: Option<u8>,
    },
    /// Delete a workflow
    Delete {
        /// Workflow ID
        workflow: String,
    },
    /// Keep gates reconciled until interrupted
    Watch {
        /// Workflow ID (default: today's)
        #[arg(long, short)]
        workflow: Option<String>,
        /// Seconds between reconciliation passes
        #[arg(long, default_value = "30")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let storage = Arc::new(
        JsonStorage::new(&cli.data_dir)
            .await
            .with_context(|| format!("opening {}", cli.data_dir.display()))?,
    );
    let library = WorkflowLibrary::new(Arc::clone(&storage));
    let today = weekday_index(SystemClock.now());

    match cli.command {
        Commands::Init { day } => {
            let workflow = library.seed_defaults(day.unwrap_or(today)).await?;
            println!("Workflow: {} - {}", workflow.id, workflow.name);
        }
        Commands::List { templates } => {
            let workflows = if templates {
                library.list_templates().await?
            } else {
                library.list_days().await?
            };

            println!("Workflows ({})", workflows.len());
            for workflow in workflows {
                println!(
                    "  {} | {} | {} nodes, {} edges - {}",
                    workflow.id,
                    format_day(workflow.day_of_week.get()),
                    workflow.nodes.len(),
                    workflow.edges.len(),
                    workflow.name,
                );
            }
        }
        Commands::Show { workflow } => {
            let workflow = resolve(&library, workflow, today).await?;
            print_workflow(&workflow);
        }
        Commands::Status { workflow, at } => {
            let workflow = resolve(&library, workflow, today).await?;
            let at = at.unwrap_or_else(|| SystemClock.now());
            print_status(&workflow, at);
        }
        Commands::AddTask {
            title,
            description,
            start,
            end,
            days,
            gate,
            workflow,
        } => {
            let schedule = match (start, end) {
                (Some(start), Some(end)) => Some(Schedule::new(
                    ClockTime::parse(&start)?,
                    ClockTime::parse(&end)?,
                    days,
                )),
                _ => None,
            };
            let task = Node::task(NodeCard::new(title, description), schedule);
            let task_id = task.id.clone();

            let reconciler = open(&storage, &library, workflow, today).await?;
            report(reconciler.add_node(task).await?)?;
            if let Some(gate) = gate {
                report(reconciler.add_edge(Edge::new(task_id.clone(), gate)).await?)?;
            }
            println!("Added task: {task_id}");
        }
        Commands::AddGate {
            title,
            lock_type,
            workflow,
        } => {
            let gate = Node::control(NodeCard::new(title, ""), lock_type);
            let gate_id = gate.id.clone();

            let reconciler = open(&storage, &library, workflow, today).await?;
            report(reconciler.add_node(gate).await?)?;
            println!("Added gate: {gate_id}");
        }
        Commands::Link { task, gate, workflow } => {
            let edge = Edge::new(task, gate);
            let edge_id = edge.id.clone();

            let reconciler = open(&storage, &library, workflow, today).await?;
            report(reconciler.add_edge(edge).await?)?;
            println!("Added edge: {edge_id}");
        }
        Commands::Unlink { edge, workflow } => {
            let reconciler = open(&storage, &library, workflow, today).await?;
            report(reconciler.remove_edge(&EdgeId::from(edge)).await?)?;
        }
        Commands::Remove { node, workflow } => {
            let reconciler = open(&storage, &library, workflow, today).await?;
            report(reconciler.remove_node(&NodeId::from(node)).await?)?;
        }
        Commands::Validate { task, proof, workflow } => {
            let reconciler = open(&storage, &library, workflow, today).await?;
            report(reconciler.validate_task(&NodeId::from(task), proof).await?)?;
        }
        Commands::Reset { task, workflow } => {
            let reconciler = open(&storage, &library, workflow, today).await?;
            report(reconciler.reset_task(&NodeId::from(task)).await?)?;
        }
        Commands::Verify {
            task,
            image,
            ollama_url,
            model,
            workflow,
        } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("reading {}", image.display()))?;
            let oracle = OllamaOracle::new(OllamaConfig {
                url: ollama_url,
                model,
                ..Default::default()
            });

            let reconciler = open(&storage, &library, workflow, today).await?;
            let proof = Some(image.display().to_string());
            report(verify_and_validate(&reconciler, &oracle, &NodeId::from(task), &bytes, proof).await?)?;
        }
        Commands::SaveTemplate { name, workflow } => {
            let workflow = resolve(&library, workflow, today).await?;
            let template = library
                .save_template(&name, workflow.nodes, workflow.edges)
                .await?;
            println!("Template: {} - {}", template.id, template.name);
        }
        Commands::ApplyTemplate { template, day } => {
            let workflow = library
                .apply_template(&WorkflowId::from(template), day.unwrap_or(today))
                .await?;
            println!("Workflow: {} - {}", workflow.id, workflow.name);
        }
        Commands::Delete { workflow } => {
            let reconciler = ScheduleReconciler::new(Arc::clone(&storage));
            reconciler.delete_workflow(&WorkflowId::from(workflow)).await?;
        }
        Commands::Watch { workflow, interval } => {
            let workflow = resolve(&library, workflow, today).await?;
            let config = ReconcilerConfig::default().with_tick_interval(Duration::from_secs(interval));
            let reconciler = ScheduleReconciler::new(Arc::clone(&storage))
                .with_adapter(LoggingAdapter)
                .with_config(config);

            let mut events = reconciler.subscribe();
            reconciler.load(&workflow.id).await?;
            reconciler.start().await;
            info!(workflow_id = %workflow.id, "watching {}", workflow.name);

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            loop {
                tokio::select! {
                    _ = &mut ctrl_c => break,
                    event = events.recv() => match event {
                        Ok(change) => println!(
                            "{} {} ({})",
                            change.gate,
                            if change.locked { "locked" } else { "unlocked" },
                            change.lock_type,
                        ),
                        Err(RecvError::Lagged(missed)) => warn!(missed, "dropped gate events"),
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            reconciler.unload().await;
        }
    }

    Ok(())
}

/// The workflow named by `id`, or today's.
async fn resolve<S: WorkflowStore>(
    library: &WorkflowLibrary<S>,
    id: Option<String>,
    today: DayIndex,
) -> Result<Workflow> {
    match id {
        Some(id) => library
            .store()
            .get_workflow(&WorkflowId::from(id.as_str()))
            .await?
            .with_context(|| format!("workflow {id} not found")),
        None => library.workflow_for_day(today).await?.with_context(|| {
            format!(
                "no workflow for {}; run `daylock init`",
                day_name(today).unwrap_or("today")
            )
        }),
    }
}

/// A reconciler with the chosen workflow loaded.
async fn open(
    storage: &Arc<JsonStorage>,
    library: &WorkflowLibrary<Arc<JsonStorage>>,
    id: Option<String>,
    today: DayIndex,
) -> Result<ScheduleReconciler<Arc<JsonStorage>>> {
    let workflow = resolve(library, id, today).await?;
    let reconciler = ScheduleReconciler::new(Arc::clone(storage));
    reconciler.load(&workflow.id).await?;
    Ok(reconciler)
}

fn report(outcome: Outcome<Reconciliation>) -> Result<()> {
    match outcome {
        Outcome::Applied(pass) => {
            for change in pass.changes {
                println!(
                    "  {} {} ({})",
                    change.gate,
                    if change.locked { "locked" } else { "unlocked" },
                    change.lock_type,
                );
            }
            Ok(())
        }
        Outcome::Rejected(reason) => anyhow::bail!("Rejected: {reason}"),
    }
}

fn print_workflow(workflow: &Workflow) {
    println!("Workflow: {}", workflow.id);
    println!("  Name: {}", workflow.name);
    println!("  Day: {}", format_day(workflow.day_of_week.get()));
    println!("  Updated: {}", workflow.updated_at);

    println!("Nodes ({})", workflow.nodes.len());
    for node in &workflow.nodes {
        let detail = match &node.kind {
            NodeKind::WorkflowStart(start) => start.trigger_time.as_ref().cloned().unwrap_or_default(),
            NodeKind::VerifiableTask(task) => {
                let schedule = task
                    .schedule
                    .as_ref()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unscheduled".to_string());
                let state = if task.validated { "done" } else { "open" };
                format!("{state}, {schedule}")
            }
            NodeKind::SystemControl(control) => {
                let state = if control.is_locked { "locked" } else { "unlocked" };
                format!("{}, {state}", control.lock_type)
            }
        };
        println!("  {} | {} | {} - {}", node.id, node.kind_name(), node.title(), detail);
    }

    println!("Edges ({})", workflow.edges.len());
    for edge in &workflow.edges {
        println!("  {} | {} -> {}", edge.id, edge.source, edge.target);
    }
}

fn print_status(workflow: &Workflow, at: NaiveDateTime) {
    let (graph, warnings) = WorkflowGraph::from_workflow(workflow);
    for warning in &warnings {
        warn!(workflow_id = %workflow.id, "{}", warning);
    }

    let states = DependencyLockEngine::new().evaluate(&graph, at);
    println!("{} at {}", workflow.name, at.format("%a %Y-%m-%d %H:%M"));
    for gate in graph.gates() {
        let Some(state) = states.get(&gate.id) else {
            continue;
        };
        if state.locked {
            let blocking: Vec<&str> = state
                .blocking
                .iter()
                .filter_map(|id| graph.find_node(id))
                .map(|n| n.title())
                .collect();
            println!("  {} | locked by {}", gate.title(), blocking.join(", "));
        } else {
            println!("  {} | unlocked", gate.title());
        }
    }
}

fn format_day(day: Option<DayIndex>) -> &'static str {
    day.and_then(day_name).unwrap_or("template")
}

fn parse_at(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").map_err(|e| format!("{e}: expected \"YYYY-MM-DD HH:MM\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_needs_days() {
        let err = Cli::try_parse_from(["daylock", "add-task", "Stretch", "--start", "07:00", "--end", "07:30"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from([
            "daylock", "add-task", "Stretch", "--start", "07:00", "--end", "07:30", "--days", "0,2",
        ])
        .unwrap();
        match cli.command {
            Commands::AddTask { days, .. } => assert_eq!(days, vec![0, 2]),
            _ => panic!("expected add-task"),
        }
    }

    #[test]
    fn days_need_a_window() {
        assert!(Cli::try_parse_from(["daylock", "add-task", "Stretch", "--days", "0"]).is_err());
        assert!(Cli::try_parse_from(["daylock", "add-task", "Stretch"]).is_ok());
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use taskweave::calibration::ConformalCalibrator;
use taskweave::config::Config;
use taskweave::orchestration::{Goal, Planner};
use taskweave::state::{ReplicaId, ReplicatedStateStore, StateSnapshot};
use taskweave::workflow::{DirectoryTemplates, WorkflowComposer, WorkflowTemplate};
use taskweave::{twlog, twlog_debug, Error, Result};

/// Taskweave - goal decomposition, DAG layering and replicated state tools
#[derive(Parser, Debug)]
#[command(name = "taskweave")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    TASKWEAVE_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.taskweave/taskweave.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Decompose a goal into tasks and print the plan with its layers
    Plan {
        /// The goal in natural language
        goal: String,

        /// Task type; selects a workflow template when one is installed
        #[arg(long = "type", short = 't')]
        task_type: Option<String>,
    },

    /// Validate a workflow template file and print its execution layers
    Layers {
        /// Path to a `.toml` template
        template: PathBuf,
    },

    /// Calibrate on historical scores and judge a new score
    Calibrate {
        /// Miscoverage level (defaults to the configured alpha)
        #[arg(long)]
        alpha: Option<f64>,

        /// Comma-separated historical non-conformity scores
        #[arg(long, value_delimiter = ',')]
        scores: Vec<f64>,

        /// Score to judge
        score: f64,
    },

    /// Merge two CRDT state snapshots and print the result
    Merge {
        left: PathBuf,
        right: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    taskweave::log::init_with_debug(cli.debug);
    twlog_debug!("taskweave starting: {:?}", cli.command);

    let config = Config::load()?;

    match cli.command {
        Command::Plan { goal, task_type } => run_plan(&config, goal, task_type),
        Command::Layers { template } => run_layers(&template),
        Command::Calibrate {
            alpha,
            scores,
            score,
        } => run_calibrate(alpha.unwrap_or(config.alpha), &scores, score),
        Command::Merge { left, right } => run_merge(&config, &left, &right),
    }
}

fn run_plan(config: &Config, goal: String, task_type: Option<String>) -> Result<()> {
    let templates = DirectoryTemplates::new(config.templates_dir()?);
    let planner = Planner::new(Arc::new(templates));

    let mut goal = Goal::new(goal);
    if let Some(task_type) = task_type {
        goal = goal.with_type(task_type);
    }

    let plan = planner.plan(&goal)?;
    let layers = if plan.is_empty() {
        Vec::new()
    } else {
        WorkflowComposer::new().compose_plan(plan.tasks.clone())?.layers
    };

    twlog!("plan: {} tasks in {} layers", plan.len(), layers.len());
    let output = json!({
        "source": plan.source,
        "tasks": plan.tasks,
        "layers": layers,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_layers(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::TemplateNotFound(path.display().to_string()));
    }
    let template = WorkflowTemplate::from_file(path)?;
    let composition = WorkflowComposer::new().compose_plan(template.to_tasks(""))?;

    let output = json!({
        "template": template.id,
        "validation": composition.validation,
        "layers": composition.layers,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_calibrate(alpha: f64, scores: &[f64], score: f64) -> Result<()> {
    let mut calibrator = ConformalCalibrator::new(alpha)?;
    calibrator.calibrate(scores);
    let prediction = calibrator.predict_with_interval(1.0 - score, score);
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<StateSnapshot> {
    twlog_debug!("reading snapshot {}", path.display());
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn run_merge(config: &Config, left: &Path, right: &Path) -> Result<()> {
    let replica = config
        .replica_id
        .clone()
        .map(ReplicaId::new)
        .unwrap_or_else(ReplicaId::random);

    let mut store = ReplicatedStateStore::from_snapshot(replica, read_snapshot(left)?);
    let changed = store.merge(&read_snapshot(right)?);
    twlog!("merge: {} fields taken from {}", changed, right.display());

    println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
    Ok(())
}

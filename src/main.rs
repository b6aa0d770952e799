use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cadence_config::{EngineConfig, PlanDef, load_plan_dir};
use cadence_engine::{ExecutionReport, Orchestrator};
use cadence_registry::Registry;

mod demo;

/// Cadence - run plans of registered tasks and route their results to sinks
#[derive(Parser)]
#[command(name = "cadence")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.cadence)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Engine settings file (default: <data-dir>/engine.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a plan, reading the input payload from stdin
  Run {
    /// Path to the plan file (JSON)
    plan_file: PathBuf,
  },

  /// Check a plan against the registry without running it
  Validate {
    /// Path to the plan file (JSON)
    plan_file: PathBuf,
  },

  /// List registered tasks in registration order
  Tasks,

  /// Run every registered task once, in registration order
  Discover,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .with_target(false)
    .init();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".cadence"),
  };
  let config_path = cli.config.unwrap_or_else(|| data_dir.join("engine.json"));

  match cli.command {
    Some(Commands::Run { plan_file }) => {
      let orchestrator = build_orchestrator(&data_dir, &config_path)?;
      let plan = read_plan(&plan_file)?;
      run_plan(orchestrator, plan)?;
    }
    Some(Commands::Validate { plan_file }) => {
      let orchestrator = build_orchestrator(&data_dir, &config_path)?;
      let plan = read_plan(&plan_file)?;
      validate_plan(&orchestrator, &plan)?;
    }
    Some(Commands::Tasks) => {
      let orchestrator = build_orchestrator(&data_dir, &config_path)?;
      let tasks = orchestrator.registry().list_all();
      println!("{}", serde_json::to_string_pretty(&tasks)?);
    }
    Some(Commands::Discover) => {
      let orchestrator = build_orchestrator(&data_dir, &config_path)?;
      let plan = orchestrator.discovery_plan("discover");
      run_plan(orchestrator, plan)?;
    }
    None => {
      println!("cadence - use --help to see available commands");
    }
  }

  Ok(())
}

fn build_orchestrator(data_dir: &Path, config_path: &Path) -> Result<Orchestrator> {
  let config = EngineConfig::load_or_default(config_path)
    .with_context(|| format!("failed to load engine config: {}", config_path.display()))?;

  let mut registry = Registry::new();
  registry
    .install(&demo::DemoProvider::new())
    .context("failed to install demo tasks")?;

  let plans_dir = data_dir.join("plans");
  for plan in load_plan_dir(&plans_dir)
    .with_context(|| format!("failed to load plans from {}", plans_dir.display()))?
  {
    registry
      .register_plan(plan)
      .context("failed to register plan")?;
  }

  Ok(Orchestrator::new(Arc::new(registry), config))
}

fn read_plan(plan_file: &Path) -> Result<PlanDef> {
  PlanDef::from_json_file(plan_file)
    .with_context(|| format!("failed to read plan file: {}", plan_file.display()))
}

fn validate_plan(orchestrator: &Orchestrator, plan: &PlanDef) -> Result<()> {
  match orchestrator.validate(plan) {
    Ok(()) => {
      eprintln!("Plan '{}' is valid", plan.plan_id);
      Ok(())
    }
    Err(e) => {
      for problem in &e.problems {
        eprintln!("  - {}", problem);
      }
      bail!("plan '{}' has {} problem(s)", plan.plan_id, e.problems.len())
    }
  }
}

fn run_plan(orchestrator: Orchestrator, plan: PlanDef) -> Result<()> {
  let payload = read_payload_from_stdin()?;

  let rt = tokio::runtime::Runtime::new()?;
  let report = rt.block_on(async {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        ctrl_c.cancel();
      }
    });

    orchestrator
      .execute_plan_with_cancel(&plan, payload, cancel)
      .await
      .context("plan execution failed")
  })?;

  print_report(&report)
}

fn print_report(report: &ExecutionReport) -> Result<()> {
  eprintln!(
    "Execution {} finished: {:?} ({} tasks, {} sink writes)",
    report.execution_id,
    report.status,
    report.tasks.len(),
    report.sinks.len()
  );
  println!("{}", serde_json::to_string_pretty(report)?);

  if !report.is_success() {
    std::process::exit(1);
  }
  Ok(())
}

fn read_payload_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read payload from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse payload JSON from stdin")
  }
}

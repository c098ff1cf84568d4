//! taskrelay: queue a batch of HTTP calls, run them through the worker
//! pool and print the settled task records as JSON lines.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use taskrelay_core::observability::init_tracing;
use taskrelay_core::{RelayConfig, RelayError, TaskOrchestrator, TaskSpec};

/// Dispatch HTTP requests through a bounded worker pool
#[derive(Debug, Parser)]
#[command(name = "taskrelay")]
#[command(about = "Dispatch HTTP requests through a bounded worker pool", long_about = None)]
#[command(version)]
struct Cli {
    /// Request to dispatch; repeat for more tasks
    #[arg(long = "task", num_args = 2, value_names = ["METHOD", "URL"], action = clap::ArgAction::Append, required = true)]
    tasks: Vec<String>,

    /// Header sent with every task, as NAME:VALUE
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Worker count (overrides TASKRELAY_WORKERS)
    #[arg(long)]
    workers: Option<usize>,

    /// Queue capacity (overrides TASKRELAY_QUEUE_CAPACITY)
    #[arg(long)]
    capacity: Option<usize>,

    /// How often to poll task status, in milliseconds
    #[arg(long, default_value_t = 50)]
    poll_ms: u64,
}

impl Cli {
    fn specs(&self) -> Vec<TaskSpec> {
        self.tasks
            .chunks_exact(2)
            .map(|pair| {
                self.headers
                    .iter()
                    .fold(TaskSpec::new(&pair[0], &pair[1]), |spec, (name, value)| {
                        spec.with_header(name, value)
                    })
            })
            .collect()
    }

    fn apply(&self, config: &mut RelayConfig) {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(capacity) = self.capacity {
            config.queue_capacity = capacity;
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME:VALUE, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = RelayConfig::from_env().context("reading configuration")?;
    cli.apply(&mut config);
    init_tracing(&config.log_filter);

    let orchestrator = Arc::new(
        TaskOrchestrator::from_config(&config)
            .await
            .context("building orchestrator")?,
    );
    orchestrator.init_workers(config.workers)?;

    let specs = cli.specs();
    if specs.is_empty() {
        bail!("no tasks given");
    }

    let mut ids = Vec::with_capacity(specs.len());
    for spec in specs {
        ids.push(orchestrator.create_task(spec).await?);
    }
    info!(count = ids.len(), "tasks queued");

    // nothing more to admit: drain in the background while results come in
    let draining = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.shutdown().await })
    };

    let poll = Duration::from_millis(cli.poll_ms.max(1));
    for id in ids {
        let task = match orchestrator.wait_for_terminal(id, poll).await {
            Ok(task) => task,
            Err(err @ RelayError::Unsettled { .. }) => {
                warn!(error = %err, "printing last stored state");
                orchestrator.get_task_by_id(id).await?
            }
            Err(err) => return Err(err.into()),
        };
        println!("{}", serde_json::to_string(&task)?);
    }

    draining.await.context("waiting for workers")?;
    Ok(())
}

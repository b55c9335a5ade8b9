use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::client::InferenceClient;
use crate::config::{ConcurrencyMode, RunConfig};
use crate::invoker::invoke_isolated;
use crate::report::{RunReport, TaskResult};
use crate::task::{expand_tasks, TaskUnit};

/// Runs every (model, prompt) pairing of `config` against `client` and
/// assembles the report.
///
/// Task failures are recorded in the report; only an invalid configuration or
/// a broken worker task fails the call.
pub async fn run_benchmark(
    config: RunConfig,
    client: Arc<dyn InferenceClient>,
) -> Result<RunReport> {
    validate(&config)?;

    let start = Instant::now();
    let tasks: Vec<(usize, TaskUnit)> = expand_tasks(&config.models, &config.prompts)
        .into_iter()
        .enumerate()
        .collect();
    let planned = tasks.len();
    info!(
        planned,
        concurrency = config.concurrency,
        mode = %config.concurrency_mode,
        "starting benchmark run"
    );

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let collector_handle = tokio::spawn(collect_results(event_rx, planned));

    let batches: Vec<Vec<(usize, TaskUnit)>> = match config.concurrency_mode {
        ConcurrencyMode::Global => vec![tasks],
        ConcurrencyMode::PerModel => tasks
            .chunks(config.prompts.len())
            .map(|batch| batch.to_vec())
            .collect(),
    };

    let settings = DispatchSettings {
        concurrency: config.concurrency,
        timeout: config.timeout,
        response_included: config.response_included,
    };
    for batch in batches {
        dispatch_batch(batch, &client, &settings, &event_tx).await?;
    }
    drop(event_tx);

    let collector = collector_handle
        .await
        .map_err(|err| anyhow!("result collector task failed: {}", err))??;
    let results = collector.finalize()?;

    info!(
        elapsed_secs = start.elapsed().as_secs_f64(),
        failed = results.iter().filter(|result| result.is_error()).count(),
        "benchmark run finished"
    );

    Ok(RunReport::assemble(config, results))
}

fn validate(config: &RunConfig) -> Result<()> {
    if config.prompts.is_empty() || config.models.is_empty() {
        return Err(anyhow!("benchmark needs at least one prompt and one model"));
    }
    if config.concurrency == 0 {
        return Err(anyhow!("concurrency must be greater than zero"));
    }
    if config.timeout.is_zero() {
        return Err(anyhow!("timeout must be greater than zero"));
    }
    Ok(())
}

struct DispatchSettings {
    concurrency: usize,
    timeout: Duration,
    response_included: bool,
}

/// Drives one bounded pool to completion.
///
/// A permit is taken before each spawn, so tasks start in the order given and
/// never more than `concurrency` at a time.
async fn dispatch_batch(
    batch: Vec<(usize, TaskUnit)>,
    client: &Arc<dyn InferenceClient>,
    settings: &DispatchSettings,
    event_tx: &mpsc::UnboundedSender<TaskEvent>,
) -> Result<()> {
    let gate = Arc::new(Semaphore::new(gate_permits(settings.concurrency, batch.len())));
    let mut join_set = JoinSet::new();

    for (index, task) in batch {
        let permit = Arc::clone(&gate)
            .acquire_owned()
            .await
            .context("concurrency gate closed")?;
        let client = Arc::clone(client);
        let tx = event_tx.clone();
        let timeout = settings.timeout;
        let response_included = settings.response_included;
        join_set.spawn(async move {
            let _permit = permit;
            run_task(index, task, client, timeout, response_included, tx).await
        });
    }

    while let Some(join_result) = join_set.join_next().await {
        join_result.context("benchmark task panicked")??;
    }

    Ok(())
}

/// A batch never needs more permits than it has tasks.
fn gate_permits(concurrency: usize, batch_len: usize) -> usize {
    concurrency.min(batch_len).clamp(1, Semaphore::MAX_PERMITS)
}

async fn run_task(
    index: usize,
    task: TaskUnit,
    client: Arc<dyn InferenceClient>,
    timeout: Duration,
    response_included: bool,
    event_tx: mpsc::UnboundedSender<TaskEvent>,
) -> Result<()> {
    debug!(index, model = %task.model, "dispatching task");
    let outcome = invoke_isolated(client, &task, timeout).await;
    let result = TaskResult::from_outcome(task, outcome, response_included);

    if let Some(failure) = result.failure() {
        warn!(
            model = %failure.model,
            kind = %failure.kind,
            "task failed: {}",
            failure.message
        );
    }

    event_tx
        .send(TaskEvent { index, result })
        .map_err(|_| anyhow!("result channel closed before task {} reported", index))
}

#[derive(Debug)]
struct TaskEvent {
    index: usize,
    result: TaskResult,
}

async fn collect_results(
    mut rx: mpsc::UnboundedReceiver<TaskEvent>,
    planned: usize,
) -> Result<ResultCollector> {
    let mut collector = ResultCollector::new(planned);
    while let Some(event) = rx.recv().await {
        collector.process(event)?;
        info!(
            completed = collector.completed,
            planned,
            failed = collector.failed,
            "task resolved"
        );
    }
    Ok(collector)
}

/// Single insertion point for results arriving in completion order. Each
/// result lands in the slot of its task index.
struct ResultCollector {
    slots: Vec<Option<TaskResult>>,
    completed: usize,
    failed: usize,
}

impl ResultCollector {
    fn new(planned: usize) -> Self {
        Self {
            slots: vec![None; planned],
            completed: 0,
            failed: 0,
        }
    }

    fn process(&mut self, event: TaskEvent) -> Result<()> {
        let TaskEvent { index, result } = event;
        let slot = self
            .slots
            .get_mut(index)
            .ok_or_else(|| anyhow!("task index {} is out of range", index))?;
        if slot.is_some() {
            return Err(anyhow!("task {} reported more than once", index));
        }
        if result.is_error() {
            self.failed += 1;
        }
        self.completed += 1;
        *slot = Some(result);
        Ok(())
    }

    fn finalize(self) -> Result<Vec<TaskResult>> {
        let planned = self.slots.len();
        let results: Vec<TaskResult> = self.slots.into_iter().flatten().collect();
        if results.len() != planned {
            return Err(anyhow!(
                "only {} of {} tasks reported a result",
                results.len(),
                planned
            ));
        }
        Ok(results)
    }
}

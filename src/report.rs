use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::config::{serialize_secs, ErrorFilter, RunConfig};
use crate::error::{FailureInfo, FailureKind};
use crate::invoker::RawOutcome;
use crate::metrics::{compute_metrics, Metrics};
use crate::task::TaskUnit;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Ok,
    Error,
}

/// How a task resolved. Serialized inline with a `status` tag.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskOutcome {
    Ok {
        metrics: Metrics,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<String>,
    },
    Error {
        error: FailureInfo,
    },
}

/// The reportable record of one resolved task.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskResult {
    pub model: String,
    pub prompt: String,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

impl TaskResult {
    pub fn from_outcome(task: TaskUnit, outcome: RawOutcome, response_included: bool) -> Self {
        let TaskUnit { model, prompt } = task;
        match outcome {
            RawOutcome::Success {
                elapsed,
                prompt_tokens,
                response_tokens,
                response_text,
            } => Self {
                model,
                prompt,
                elapsed,
                outcome: TaskOutcome::Ok {
                    metrics: compute_metrics(elapsed, prompt_tokens, response_tokens),
                    response: response_included.then_some(response_text),
                },
            },
            RawOutcome::Failure { elapsed, failure } => Self {
                model,
                prompt,
                elapsed,
                outcome: TaskOutcome::Error { error: failure },
            },
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self.outcome {
            TaskOutcome::Ok { .. } => TaskStatus::Ok,
            TaskOutcome::Error { .. } => TaskStatus::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status() == TaskStatus::Error
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        match &self.outcome {
            TaskOutcome::Ok { metrics, .. } => Some(metrics),
            TaskOutcome::Error { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureInfo> {
        match &self.outcome {
            TaskOutcome::Error { error } => Some(error),
            TaskOutcome::Ok { .. } => None,
        }
    }
}

impl ErrorFilter {
    pub fn admits(&self, result: &TaskResult) -> bool {
        match self {
            ErrorFilter::None => true,
            ErrorFilter::Exclude => !result.is_error(),
            ErrorFilter::Only => result.is_error(),
        }
    }

    pub fn apply(&self, results: Vec<TaskResult>) -> Vec<TaskResult> {
        results
            .into_iter()
            .filter(|result| self.admits(result))
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelSummary {
    pub model: String,
    pub succeeded: usize,
    pub failed: usize,
    pub latency_p50_secs: Option<f64>,
    pub latency_p90_secs: Option<f64>,
    pub latency_p99_secs: Option<f64>,
    pub mean_response_tokens_per_sec: Option<f64>,
}

/// Counts over every attempted task, taken before any output filter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
    pub models: Vec<ModelSummary>,
}

impl RunSummary {
    pub fn from_results(models: &[String], results: &[TaskResult]) -> Self {
        let mut failures_by_kind = BTreeMap::new();
        for failure in results.iter().filter_map(TaskResult::failure) {
            *failures_by_kind.entry(failure.kind).or_insert(0) += 1;
        }
        let failed = results.iter().filter(|result| result.is_error()).count();

        Self {
            attempted: results.len(),
            succeeded: results.len() - failed,
            failed,
            failures_by_kind,
            models: models
                .iter()
                .map(|model| summarize_model(model, results))
                .collect(),
        }
    }
}

fn summarize_model(model: &str, results: &[TaskResult]) -> ModelSummary {
    let mut latencies = Vec::new();
    let mut rates = Vec::new();
    let mut failed = 0;

    for result in results.iter().filter(|result| result.model == model) {
        match &result.outcome {
            TaskOutcome::Ok { metrics, .. } => {
                latencies.push(result.elapsed);
                rates.extend(metrics.response_tokens_per_sec);
            }
            TaskOutcome::Error { .. } => failed += 1,
        }
    }

    latencies.sort();
    let secs = |latency: Option<Duration>| latency.map(|value| value.as_secs_f64());
    let mean_response_tokens_per_sec = if rates.is_empty() {
        None
    } else {
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    };

    ModelSummary {
        model: model.to_string(),
        succeeded: latencies.len(),
        failed,
        latency_p50_secs: secs(percentile(&latencies, 0.50)),
        latency_p90_secs: secs(percentile(&latencies, 0.90)),
        latency_p99_secs: secs(percentile(&latencies, 0.99)),
        mean_response_tokens_per_sec,
    }
}

fn percentile(sorted_latencies: &[Duration], quantile: f64) -> Option<Duration> {
    if sorted_latencies.is_empty() {
        return None;
    }

    let clamped = quantile.clamp(0.0, 1.0);
    let idx = ((sorted_latencies.len() - 1) as f64 * clamped).round() as usize;
    sorted_latencies.get(idx).cloned()
}

/// The complete output of one benchmark invocation.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub config: RunConfig,
    pub summary: RunSummary,
    pub results: Vec<TaskResult>,
}

impl RunReport {
    /// Summarizes the full result set, then applies the configured filter.
    /// `results` must already be in task-generation order.
    pub fn assemble(config: RunConfig, results: Vec<TaskResult>) -> Self {
        let summary = RunSummary::from_results(&config.models, &results);
        let results = config.error_filter.apply(results);
        Self {
            config,
            summary,
            results,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }
}

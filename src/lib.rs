mod client;
mod config;
mod error;
mod invoker;
mod metrics;
mod model;
mod ollama;
mod report;
mod runner;
mod task;

pub use client::{Completion, InferenceClient};
pub use config::{ConcurrencyMode, ErrorFilter, RunConfig};
pub use error::{FailureInfo, FailureKind, InferenceError};
pub use invoker::{invoke, RawOutcome};
pub use metrics::{compute_metrics, Metrics};
pub use model::{select_models, ModelInfo};
pub use ollama::{OllamaClient, OllamaConfig, DEFAULT_HOST};
pub use report::{ModelSummary, RunReport, RunSummary, TaskOutcome, TaskResult, TaskStatus};
pub use runner::run_benchmark;
pub use task::{expand_tasks, TaskUnit};

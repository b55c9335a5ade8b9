use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Serialize, Serializer};

/// How the concurrency limit is pooled across models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConcurrencyMode {
    /// Each model's prompts form one bounded batch; batches run one model after another.
    PerModel,
    /// Every task of every model shares a single bounded pool.
    Global,
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyMode::PerModel => f.write_str("per-model"),
            ConcurrencyMode::Global => f.write_str("global"),
        }
    }
}

impl FromStr for ConcurrencyMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "per-model" | "per_model" | "permodel" => Ok(ConcurrencyMode::PerModel),
            "global" => Ok(ConcurrencyMode::Global),
            other => Err(format!(
                "unknown concurrency mode '{}' (expected per-model or global)",
                other
            )),
        }
    }
}

/// Which results survive into the emitted report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorFilter {
    #[default]
    None,
    /// Drop failed tasks.
    Exclude,
    /// Keep only failed tasks.
    Only,
}

/// Snapshot of everything a benchmark run was asked to do.
///
/// Built once before scheduling and never mutated afterwards; the report
/// carries it verbatim.
#[derive(Clone, Debug, Serialize)]
pub struct RunConfig {
    pub prompts: Vec<String>,
    pub models: Vec<String>,
    pub concurrency: usize,
    pub concurrency_mode: ConcurrencyMode,
    #[serde(serialize_with = "serialize_secs")]
    pub timeout: Duration,
    pub response_included: bool,
    pub error_filter: ErrorFilter,
}

impl RunConfig {
    pub fn try_new(
        prompts: Vec<String>,
        models: Vec<String>,
        concurrency: usize,
        concurrency_mode: ConcurrencyMode,
        timeout: Duration,
    ) -> Result<Self> {
        if prompts.is_empty() {
            return Err(anyhow!("at least one prompt is required"));
        }
        if models.is_empty() {
            return Err(anyhow!("at least one model is required"));
        }
        if concurrency == 0 {
            return Err(anyhow!("concurrency must be greater than zero"));
        }
        if timeout.is_zero() {
            return Err(anyhow!("timeout must be greater than zero"));
        }

        Ok(Self {
            prompts,
            models,
            concurrency,
            concurrency_mode,
            timeout,
            response_included: false,
            error_filter: ErrorFilter::None,
        })
    }

    pub fn with_response(mut self, response_included: bool) -> Self {
        self.response_included = response_included;
        self
    }

    pub fn with_error_filter(mut self, error_filter: ErrorFilter) -> Self {
        self.error_filter = error_filter;
        self
    }

    /// Number of tasks a completed run must account for.
    pub fn planned_tasks(&self) -> usize {
        self.prompts.len() * self.models.len()
    }
}

pub(crate) fn serialize_secs<S>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(value.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let timeout = Duration::from_secs(5);
        let mode = ConcurrencyMode::Global;

        assert!(RunConfig::try_new(vec![], strings(&["m1"]), 1, mode, timeout).is_err());
        assert!(RunConfig::try_new(strings(&["p"]), vec![], 1, mode, timeout).is_err());
        assert!(RunConfig::try_new(strings(&["p"]), strings(&["m1"]), 0, mode, timeout).is_err());
        assert!(
            RunConfig::try_new(strings(&["p"]), strings(&["m1"]), 1, mode, Duration::ZERO)
                .is_err()
        );
    }

    #[test]
    fn planned_tasks_is_cross_product() {
        let config = RunConfig::try_new(
            strings(&["p1", "p2", "p3"]),
            strings(&["m1", "m2"]),
            4,
            ConcurrencyMode::PerModel,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(config.planned_tasks(), 6);
        assert!(!config.response_included);
        assert_eq!(config.error_filter, ErrorFilter::None);
    }

    #[test]
    fn parses_concurrency_mode() {
        assert_eq!("per-model".parse(), Ok(ConcurrencyMode::PerModel));
        assert_eq!("GLOBAL".parse(), Ok(ConcurrencyMode::Global));
        assert!("round-robin".parse::<ConcurrencyMode>().is_err());
        assert_eq!(ConcurrencyMode::PerModel.to_string(), "per-model");
    }

    #[test]
    fn serializes_timeout_as_seconds() {
        let config = RunConfig::try_new(
            strings(&["p"]),
            strings(&["m"]),
            1,
            ConcurrencyMode::Global,
            Duration::from_millis(2500),
        )
        .unwrap()
        .with_error_filter(ErrorFilter::Only);

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["timeout"], 2.5);
        assert_eq!(value["concurrency_mode"], "global");
        assert_eq!(value["error_filter"], "only");
    }
}

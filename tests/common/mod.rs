#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ollamabench_rs::{Completion, FailureKind, InferenceClient, InferenceError};
use tokio::time::Instant;

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub fn assert_close(actual: Duration, expected: Duration) {
    let diff = actual.as_secs_f64() - expected.as_secs_f64();
    assert!(
        diff.abs() < 0.01,
        "elapsed {:?}, expected about {:?}",
        actual,
        expected
    );
}

#[derive(Clone, Debug)]
pub struct CallRecord {
    pub model: String,
    pub prompt: String,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct InFlight {
    total: usize,
    max_total: usize,
    per_model: HashMap<String, usize>,
    max_per_model: HashMap<String, usize>,
}

/// Scriptable inference capability: sleeps for a configured delay, then
/// answers with fixed token counts or a configured failure.
pub struct MockClient {
    default_delay: Duration,
    delays: HashMap<(String, String), Duration>,
    failures: HashMap<(String, String), FailureKind>,
    panics: Vec<(String, String)>,
    prompt_tokens: u64,
    response_tokens: u64,
    calls: Mutex<Vec<CallRecord>>,
    in_flight: Mutex<InFlight>,
}

impl MockClient {
    pub fn new(default_delay: Duration, prompt_tokens: u64, response_tokens: u64) -> Self {
        Self {
            default_delay,
            delays: HashMap::new(),
            failures: HashMap::new(),
            panics: Vec::new(),
            prompt_tokens,
            response_tokens,
            calls: Mutex::new(Vec::new()),
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    pub fn with_delay(mut self, model: &str, prompt: &str, delay: Duration) -> Self {
        self.delays
            .insert((model.to_string(), prompt.to_string()), delay);
        self
    }

    pub fn with_failure(mut self, model: &str, prompt: &str, kind: FailureKind) -> Self {
        self.failures
            .insert((model.to_string(), prompt.to_string()), kind);
        self
    }

    pub fn with_panic(mut self, model: &str, prompt: &str) -> Self {
        self.panics.push((model.to_string(), prompt.to_string()));
        self
    }

    /// Every call seen so far, ordered by start time.
    pub fn calls(&self) -> Vec<CallRecord> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort_by_key(|call| call.started);
        calls
    }

    pub fn max_in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().max_total
    }

    pub fn max_in_flight_for(&self, model: &str) -> usize {
        self.in_flight
            .lock()
            .unwrap()
            .max_per_model
            .get(model)
            .copied()
            .unwrap_or(0)
    }

    fn enter(&self, model: &str) {
        let mut state = self.in_flight.lock().unwrap();
        state.total += 1;
        state.max_total = state.max_total.max(state.total);
        let current = {
            let count = state.per_model.entry(model.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let max = state.max_per_model.entry(model.to_string()).or_insert(0);
        *max = (*max).max(current);
    }

    fn leave(&self, model: &str) {
        let mut state = self.in_flight.lock().unwrap();
        state.total -= 1;
        if let Some(count) = state.per_model.get_mut(model) {
            *count -= 1;
        }
    }
}

/// Records the call when it finishes or is abandoned by a timeout.
struct CallGuard<'a> {
    client: &'a MockClient,
    model: String,
    prompt: String,
    started: Instant,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.client.leave(&self.model);
        self.client.calls.lock().unwrap().push(CallRecord {
            model: self.model.clone(),
            prompt: self.prompt.clone(),
            started: self.started,
            finished: Instant::now(),
        });
    }
}

#[async_trait]
impl InferenceClient for MockClient {
    async fn infer(
        &self,
        model: &str,
        prompt: &str,
        _timeout: Duration,
    ) -> Result<Completion, InferenceError> {
        self.enter(model);
        let _guard = CallGuard {
            client: self,
            model: model.to_string(),
            prompt: prompt.to_string(),
            started: Instant::now(),
        };

        let key = (model.to_string(), prompt.to_string());
        let delay = self.delays.get(&key).copied().unwrap_or(self.default_delay);
        tokio::time::sleep(delay).await;

        if self.panics.contains(&key) {
            panic!("scripted panic for {}", model);
        }

        if let Some(kind) = self.failures.get(&key) {
            let message = format!("scripted failure for {}", model);
            return Err(match kind {
                FailureKind::Timeout => InferenceError::Timeout(message),
                FailureKind::Connection => InferenceError::Connection(message),
                FailureKind::Protocol => InferenceError::Protocol(message),
                FailureKind::Unknown => InferenceError::Unknown(message),
            });
        }

        Ok(Completion {
            prompt_tokens: Some(self.prompt_tokens),
            response_tokens: Some(self.response_tokens),
            text: format!("{} says hello to {}", model, prompt),
        })
    }
}

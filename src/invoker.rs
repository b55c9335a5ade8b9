use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::client::InferenceClient;
use crate::error::{FailureInfo, InferenceError};
use crate::task::TaskUnit;

/// Unprocessed result of a single attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum RawOutcome {
    Success {
        elapsed: Duration,
        prompt_tokens: Option<u64>,
        response_tokens: Option<u64>,
        response_text: String,
    },
    Failure {
        elapsed: Duration,
        failure: FailureInfo,
    },
}

impl RawOutcome {
    pub fn elapsed(&self) -> Duration {
        match self {
            RawOutcome::Success { elapsed, .. } | RawOutcome::Failure { elapsed, .. } => *elapsed,
        }
    }
}

/// Runs `task` once against `client`, abandoning it after `timeout`.
///
/// The clock starts here, at dispatch. A call that overruns is dropped
/// locally and reported with `elapsed == timeout`; errors the capability
/// returns on its own keep their measured wall time.
pub async fn invoke(
    client: &dyn InferenceClient,
    task: &TaskUnit,
    timeout: Duration,
) -> RawOutcome {
    let start = Instant::now();
    let call = client.infer(&task.model, &task.prompt, timeout);

    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(completion)) => RawOutcome::Success {
            elapsed: start.elapsed(),
            prompt_tokens: completion.prompt_tokens,
            response_tokens: completion.response_tokens,
            response_text: completion.text,
        },
        Ok(Err(err)) => RawOutcome::Failure {
            elapsed: start.elapsed(),
            failure: FailureInfo::from_error(&err, &task.model, &task.prompt),
        },
        Err(_) => {
            let err = InferenceError::Timeout(format!(
                "no response from {} within {:.3}s",
                task.model,
                timeout.as_secs_f64()
            ));
            RawOutcome::Failure {
                elapsed: timeout,
                failure: FailureInfo::from_error(&err, &task.model, &task.prompt),
            }
        }
    }
}

/// Like [`invoke`], but on a task of its own so a panicking capability
/// resolves as an `unknown` failure instead of tearing down the caller.
pub async fn invoke_isolated(
    client: Arc<dyn InferenceClient>,
    task: &TaskUnit,
    timeout: Duration,
) -> RawOutcome {
    let start = Instant::now();
    let owned = task.clone();
    let attempt = tokio::spawn(async move { invoke(client.as_ref(), &owned, timeout).await });

    match attempt.await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            let message = if join_err.is_panic() {
                format!("inference panicked: {}", panic_message(join_err.into_panic()))
            } else {
                "inference task was cancelled".to_string()
            };
            RawOutcome::Failure {
                elapsed: start.elapsed(),
                failure: FailureInfo::from_error(
                    &InferenceError::Unknown(message),
                    &task.model,
                    &task.prompt,
                ),
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

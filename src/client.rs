use std::time::Duration;

use async_trait::async_trait;

use crate::error::InferenceError;

/// What a successful inference call hands back.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    /// `None` when the server did not report a count (e.g. a cached prompt).
    pub prompt_tokens: Option<u64>,
    pub response_tokens: Option<u64>,
    pub text: String,
}

/// The inference capability the engine drives.
///
/// Implementations are shared read-only across concurrent tasks, so they
/// must be `Send + Sync`. The engine enforces its own deadline around each
/// call; `timeout` is passed through so transports can bound their own I/O.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(
        &self,
        model: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<Completion, InferenceError>;
}

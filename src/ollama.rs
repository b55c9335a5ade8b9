use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::{Completion, InferenceClient};
use crate::error::InferenceError;
use crate::model::ModelInfo;

pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Where and how to reach an Ollama server.
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    pub host: Url,
    pub connect_timeout: Duration,
}

impl OllamaConfig {
    /// Accepts `http(s)://host:port[/prefix]` or a bare `host:port`.
    pub fn try_new(host: impl AsRef<str>) -> Result<Self> {
        let host = host.as_ref().trim();
        if host.is_empty() {
            return Err(anyhow!("host must not be empty"));
        }

        let normalized = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        // Trailing slash keeps any path prefix when joining API paths.
        let host = Url::parse(&format!("{}/", normalized))
            .with_context(|| format!("invalid host URL: {}", normalized))?;

        Ok(Self {
            host,
            connect_timeout: Duration::from_secs(10),
        })
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        if !connect_timeout.is_zero() {
            self.connect_timeout = connect_timeout;
        }
        self
    }
}

/// HTTP transport for the Ollama REST API.
#[derive(Clone, Debug)]
pub struct OllamaClient {
    http: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .context("failed to construct HTTP client")?;
        Ok(Self { http, config })
    }

    pub fn host(&self) -> &Url {
        &self.config.host
    }

    fn endpoint(&self, path: &str) -> Result<Url, InferenceError> {
        self.config
            .host
            .join(path)
            .map_err(|err| InferenceError::Unknown(format!("invalid endpoint {}: {}", path, err)))
    }

    /// Sends one non-streaming generate request and returns the raw JSON body.
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<Value, InferenceError> {
        let url = self.endpoint("api/generate")?;
        debug!(model, prompt_len = prompt.len(), %url, "sending generate request");

        let mut request = self.http.post(url).json(&json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        }));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(InferenceError::Protocol(format!(
                "request failed ({}) {}",
                status,
                server_error_message(&bytes)
            )));
        }

        let payload: Value = serde_json::from_slice(&bytes)?;
        debug!(model, "received generate response");
        Ok(payload)
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("api/tags")?;
        debug!(%url, "fetching model list");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to reach the model server")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("listing models failed ({})", status));
        }

        let payload: Value = response
            .json()
            .await
            .context("model list is not valid JSON")?;
        Ok(models_from_payload(&payload))
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn infer(
        &self,
        model: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<Completion, InferenceError> {
        let payload = self.generate(model, prompt, Some(timeout)).await?;
        extract_completion(&payload)
    }
}

fn server_error_message(bytes: &[u8]) -> String {
    serde_json::from_slice::<Value>(bytes)
        .ok()
        .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(bytes).into_owned())
}

fn extract_completion(payload: &Value) -> Result<Completion, InferenceError> {
    if let Some(message) = payload.get("error").and_then(Value::as_str) {
        return Err(InferenceError::Protocol(message.to_string()));
    }

    let text = payload
        .get("response")
        .and_then(Value::as_str)
        .ok_or_else(|| InferenceError::Protocol("response missing `response` text".into()))?;

    Ok(Completion {
        prompt_tokens: payload.get("prompt_eval_count").and_then(Value::as_u64),
        response_tokens: payload.get("eval_count").and_then(Value::as_u64),
        text: text.to_string(),
    })
}

fn models_from_payload(payload: &Value) -> Vec<ModelInfo> {
    let entries = match payload.get("models") {
        Some(Value::Array(items)) => items.as_slice(),
        Some(single) => std::slice::from_ref(single),
        None => match payload {
            Value::Array(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        },
    };
    entries
        .iter()
        .filter(|entry| !entry.is_null())
        .map(ModelInfo::from_value)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn extracts_counts_and_text() {
        let payload = json!({
            "model": "gemma3",
            "response": "Plates move.",
            "done": true,
            "prompt_eval_count": 26,
            "eval_count": 298
        });

        let completion = extract_completion(&payload).unwrap();
        assert_eq!(completion.prompt_tokens, Some(26));
        assert_eq!(completion.response_tokens, Some(298));
        assert_eq!(completion.text, "Plates move.");
    }

    #[test]
    fn cached_prompt_has_no_prompt_count() {
        let completion = extract_completion(&json!({"response": "", "eval_count": 3})).unwrap();
        assert_eq!(completion.prompt_tokens, None);
        assert_eq!(completion.response_tokens, Some(3));
    }

    #[test]
    fn unexpected_shapes_are_protocol_faults() {
        for payload in [
            json!({"done": true}),
            json!({"response": 42}),
            json!({"error": "model 'nope' not found"}),
        ] {
            let err = extract_completion(&payload).unwrap_err();
            assert_eq!(err.kind(), FailureKind::Protocol);
        }
    }

    #[test]
    fn host_is_normalized() {
        let config = OllamaConfig::try_new("localhost:11434").unwrap();
        assert_eq!(config.host.as_str(), "http://localhost:11434/");

        let config = OllamaConfig::try_new("https://gpu.example.com/ollama/").unwrap();
        let client = OllamaClient::new(config).unwrap();
        assert_eq!(
            client.endpoint("api/generate").unwrap().as_str(),
            "https://gpu.example.com/ollama/api/generate"
        );

        assert!(OllamaConfig::try_new("  ").is_err());
    }

    #[test]
    fn model_listing_accepts_wrapped_and_bare_lists() {
        let wrapped = json!({"models": [{"name": "gemma3"}, {"name": "gemma2"}]});
        let names: Vec<String> = models_from_payload(&wrapped)
            .into_iter()
            .map(|model| model.name)
            .collect();
        assert_eq!(names, vec!["gemma3", "gemma2"]);

        let bare = json!(["stream1", {"model": "stream2"}]);
        let names: Vec<String> = models_from_payload(&bare)
            .into_iter()
            .map(|model| model.name)
            .collect();
        assert_eq!(names, vec!["stream1", "stream2"]);

        assert!(models_from_payload(&json!({"models": []})).is_empty());
    }

    #[tokio::test]
    async fn refused_connection_is_a_connection_fault() {
        // Grab a free port, then close it so nothing is listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = OllamaConfig::try_new(format!("127.0.0.1:{}", port))
            .unwrap()
            .with_connect_timeout(Duration::from_secs(2));
        let client = OllamaClient::new(config).unwrap();

        let err = client
            .infer("m1", "P1", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Connection);
    }

    #[test]
    fn server_error_prefers_the_error_field() {
        assert_eq!(server_error_message(br#"{"error":"model not found"}"#), "model not found");
        assert_eq!(server_error_message(b"bad gateway"), "bad gateway");
    }
}

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::warn;

/// A model entry as reported by the server's listing endpoint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub id: Option<String>,
    pub modified_at: Option<String>,
    /// Human readable, e.g. `"4.37 GB"`.
    pub size: Option<String>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
    pub family: Option<String>,
    pub context_length: Option<u64>,
    pub capabilities: Vec<String>,
}

impl ModelInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Normalizes one listing entry. Accepts a bare name, or an object whose
    /// name lives under `name`, `model` or `id`, with descriptive fields either
    /// at the top level or nested under `details`.
    pub fn from_value(value: &Value) -> Self {
        let fields = match value {
            Value::String(name) => return Self::named(name.clone()),
            Value::Object(fields) => fields,
            other => return Self::named(other.to_string()),
        };

        let details = value.get("details").filter(|details| details.is_object());
        let lookup = |keys: &[&str]| -> Option<String> {
            keys.iter().find_map(|key| {
                details
                    .and_then(|details| details.get(*key))
                    .or_else(|| fields.get(*key))
                    .and_then(|field| field.as_str())
                    .map(str::to_string)
            })
        };

        let name = first_str(value, &["name", "model", "id"]).unwrap_or_else(|| value.to_string());
        let size = fields
            .get("size")
            .or_else(|| details.and_then(|details| details.get("size")))
            .and_then(format_size);
        let context_length = ["context_length", "contextLength"]
            .iter()
            .find_map(|key| {
                fields
                    .get(*key)
                    .or_else(|| details.and_then(|details| details.get(*key)))
                    .and_then(Value::as_u64)
            });
        let capabilities = fields
            .get("capabilities")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name,
            id: first_str(value, &["id", "model", "digest"]),
            modified_at: first_str(value, &["modified_at", "modifiedAt", "modified"]),
            size,
            parameter_size: lookup(&["parameter_size", "parameterSize"]),
            quantization_level: lookup(&["quantization_level", "quantizationLevel"]),
            family: lookup(&["family"]),
            context_length,
            capabilities,
        }
    }
}

/// Picks the models to benchmark from the server's listing.
///
/// An empty request selects everything in listing order. Otherwise the
/// requested order is kept, duplicates collapse, and unknown names are
/// warned about and skipped; an error is returned only if nothing matches.
pub fn select_models(available: &[ModelInfo], requested: &[String]) -> Result<Vec<String>> {
    let available_names: Vec<&str> = available.iter().map(|model| model.name.as_str()).collect();
    if requested.is_empty() {
        return Ok(available_names.iter().map(|name| name.to_string()).collect());
    }

    let (known, unknown): (Vec<&String>, Vec<&String>) = requested
        .iter()
        .partition(|name| available_names.contains(&name.as_str()));
    if known.is_empty() {
        return Err(anyhow!(
            "no matching models found for {:?}; available models: {:?}",
            requested,
            available_names
        ));
    }
    if !unknown.is_empty() {
        warn!(
            "unknown model names {:?}; available models: {:?}",
            unknown, available_names
        );
    }

    let mut selected: Vec<String> = Vec::with_capacity(known.len());
    for name in known {
        if !selected.contains(name) {
            selected.push(name.clone());
        }
    }
    Ok(selected)
}

fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn format_size(value: &Value) -> Option<String> {
    match value {
        Value::Number(bytes) => bytes
            .as_f64()
            .map(|bytes| format!("{:.2} GB", bytes / 1024f64.powi(3))),
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

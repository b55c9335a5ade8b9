use std::time::Duration;

use serde::Serialize;

/// Throughput derived from one task's token counts and wall time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub prompt_tokens_per_sec: Option<f64>,
    pub response_tokens_per_sec: Option<f64>,
}

/// Turns raw counts into rates. Zero elapsed time or a missing count yields
/// `None` for the affected field.
pub fn compute_metrics(
    elapsed: Duration,
    prompt_tokens: Option<u64>,
    response_tokens: Option<u64>,
) -> Metrics {
    let secs = elapsed.as_secs_f64();
    let rate = |tokens: Option<u64>| {
        if secs > 0.0 {
            tokens.map(|count| count as f64 / secs)
        } else {
            None
        }
    };

    Metrics {
        prompt_tokens_per_sec: rate(prompt_tokens),
        response_tokens_per_sec: rate(response_tokens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_divide_by_elapsed_seconds() {
        let metrics = compute_metrics(Duration::from_millis(2000), Some(10), Some(50));
        assert_eq!(metrics.prompt_tokens_per_sec, Some(5.0));
        assert_eq!(metrics.response_tokens_per_sec, Some(25.0));
    }

    #[test]
    fn zero_elapsed_is_null_not_infinite() {
        for (prompt, response) in [(Some(10), Some(20)), (None, Some(1)), (Some(0), None)] {
            let metrics = compute_metrics(Duration::ZERO, prompt, response);
            assert_eq!(metrics, Metrics::default());
        }
    }

    #[test]
    fn missing_counts_stay_null() {
        let metrics = compute_metrics(Duration::from_secs(1), None, Some(7));
        assert_eq!(metrics.prompt_tokens_per_sec, None);
        assert_eq!(metrics.response_tokens_per_sec, Some(7.0));
    }
}

//! Built-in handlers that need no payload code.

use std::time::Duration;

use async_trait::async_trait;
use proletariat_core::constants::EINVARGS;
use serde_json::{Value, json};

use super::{JobFailure, JobHandler};

/// Returns its arguments unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    fn kind(&self) -> &str {
        "echo"
    }

    async fn run(&self, args: Value) -> Result<Value, JobFailure> {
        Ok(args)
    }
}

/// Waits `args.ms` milliseconds, then returns `{"slept": ms}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SleepHandler;

#[async_trait]
impl JobHandler for SleepHandler {
    fn kind(&self) -> &str {
        "sleep"
    }

    async fn run(&self, args: Value) -> Result<Value, JobFailure> {
        let ms = args.get("ms").and_then(Value::as_u64).ok_or_else(|| {
            JobFailure::new(EINVARGS, "sleep expects {\"ms\": <non-negative integer>}")
        })?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!({ "slept": ms }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_args() {
        let args = json!({"a": [1, 2], "b": null});
        assert_eq!(EchoHandler.run(args.clone()).await.unwrap(), args);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_waits_requested_time() {
        let started = tokio::time::Instant::now();
        let out = SleepHandler.run(json!({"ms": 1500})).await.unwrap();
        assert_eq!(out, json!({"slept": 1500}));
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn sleep_rejects_bad_args() {
        let err = SleepHandler.run(json!({"ms": "soon"})).await.unwrap_err();
        assert_eq!(err.code, EINVARGS);
        assert!(SleepHandler.run(json!([])).await.is_err());
    }
}

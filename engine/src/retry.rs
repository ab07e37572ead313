//! Retry with linear backoff for network-fragile dump operations.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many times a dump is attempted and how long to wait in between.
///
/// The wait before retry `n` (1-based) is `n * base_delay`, so the default
/// policy waits 1s then 2s across its three attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay_secs: 1,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            base_delay_secs: 0,
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.base_delay_secs.saturating_mul(u64::from(attempt)))
    }

    /// Run `op` until it succeeds or the attempts are exhausted, returning
    /// the last error. `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        target_name = label,
                        attempt,
                        max_attempts = attempts,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "attempt failed, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn tool_error(code: i32) -> EngineError {
        EngineError::ToolInvocation {
            program: "pg_dump".to_string(),
            code: Some(code),
            output: String::new(),
        }
    }

    #[test]
    fn test_default_backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(3));
    }

    #[test]
    fn test_succeeds_on_third_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_secs: 0,
        };
        let mut seen = Vec::new();
        let result = policy.run("app", |attempt| {
            seen.push(attempt);
            if attempt < 3 {
                Err(tool_error(1))
            } else {
                Ok("done")
            }
        });
        assert_eq!(result.expect("third attempt succeeds"), "done");
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_returns_last_error_when_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_secs: 0,
        };
        let mut calls = 0;
        let result: Result<()> = policy.run("app", |attempt| {
            calls += 1;
            Err(tool_error(attempt as i32))
        });
        assert_eq!(calls, 3);
        match result {
            Err(EngineError::ToolInvocation { code, .. }) => assert_eq!(code, Some(3)),
            other => panic!("expected last error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            base_delay_secs: 0,
        };
        let mut calls = 0;
        let _ = policy.run("app", |_| -> Result<()> {
            calls += 1;
            Err(tool_error(1))
        });
        assert_eq!(calls, 1);
    }
}

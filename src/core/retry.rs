//! 有界重试与单次调用超时
//!
//! 每次尝试都包在 tokio::time::timeout 里；可重试错误按指数退避（翻倍、封顶）再试，
//! 不可重试错误立即返回；次数耗尽时返回最后一次错误。

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use crate::core::SalesError;

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次），至少为 1
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// 单次调用超时
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            call_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            ..Self::default()
        }
    }

    /// 同一退避参数，换一个单次超时
    pub fn with_call_timeout(&self, call_timeout: Duration) -> Self {
        Self {
            call_timeout,
            ..self.clone()
        }
    }

    /// 翻倍并封顶；溢出时直接取上限
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current
            .checked_mul(2)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// 执行 operation；`f` 每次尝试都会被重新调用以产生新的 future
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T, SalesError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SalesError>>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = match timeout(self.call_timeout, f()).await {
                Ok(r) => r,
                Err(_) => Err(SalesError::Timeout {
                    operation: operation.to_string(),
                    secs: self.call_timeout.as_secs(),
                }),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying after error: {}",
                        e
                    );
                    sleep(backoff).await;
                    backoff = self.next_backoff(backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

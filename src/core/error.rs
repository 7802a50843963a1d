//! 错误类型
//!
//! 错误总是限定在单个客户的单轮对话内：Validation / ProtocolViolation 直接终止本轮，
//! Transport / Timeout / Persistence 由 RetryPolicy 有界重试，耗尽后才终止本轮。

use thiserror::Error;

/// 一轮对话中可能出现的错误
#[derive(Error, Debug)]
pub enum SalesError {
    /// 数据格式错误：入站信封缺字段、持久化快照损坏、工具参数无法解析
    #[error("Validation error: {0}")]
    Validation(String),

    /// strict 工具的参数不符合声明的 schema（模型违反契约）
    #[error("Protocol violation in tool '{tool}': {reason}")]
    ProtocolViolation { tool: String, reason: String },

    /// 模型或消息网关调用失败
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    /// 挂起 / 归档存储不可用
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl SalesError {
    /// 是否值得重试（网络、超时、存储）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SalesError::Transport(_) | SalesError::Timeout { .. } | SalesError::Persistence(_)
        )
    }
}

impl From<sqlx::Error> for SalesError {
    fn from(e: sqlx::Error) -> Self {
        SalesError::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for SalesError {
    fn from(e: reqwest::Error) -> Self {
        SalesError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SalesError::Transport("reset".into()).is_retryable());
        assert!(SalesError::Persistence("locked".into()).is_retryable());
        assert!(SalesError::Timeout {
            operation: "model".into(),
            secs: 60
        }
        .is_retryable());
        assert!(!SalesError::Validation("bad".into()).is_retryable());
        assert!(!SalesError::ProtocolViolation {
            tool: "finalize_checkout".into(),
            reason: "missing field".into()
        }
        .is_retryable());
        assert!(!SalesError::Config("x".into()).is_retryable());
    }
}

//! Mock 模型网关（用于测试，无需 API）
//!
//! 按顺序返回预置响应，并记录收到的每个请求；预置响应用尽时返回 Transport 错误。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::SalesError;
use crate::llm::{ChatCompletionRequest, ChatCompletionResponse, ModelGateway};

#[derive(Debug, Default)]
pub struct MockModelGateway {
    script: Mutex<VecDeque<Result<ChatCompletionResponse, String>>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl MockModelGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: impl IntoIterator<Item = ChatCompletionResponse>) -> Self {
        let mock = Self::new();
        for r in responses {
            mock.push(r);
        }
        mock
    }

    pub fn push(&self, response: ChatCompletionResponse) {
        self.lock_script().push_back(Ok(response));
    }

    /// 预置一次传输失败
    pub fn push_failure(&self, reason: &str) {
        self.lock_script().push_back(Err(reason.to_string()));
    }

    /// 已收到的请求（按顺序）
    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<ChatCompletionResponse, String>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ModelGateway for MockModelGateway {
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, SalesError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        match self.lock_script().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(SalesError::Transport(reason)),
            None => Err(SalesError::Transport("mock script exhausted".to_string())),
        }
    }
}

//! 模型网关抽象
//!
//! 编排层只依赖 ModelGateway：给定请求，返回含 assistant 消息与 tool calls 的补全响应。
//! 后端实现（OpenAI 兼容 / Mock）负责把传输失败映射为 SalesError::Transport。

use async_trait::async_trait;

use crate::core::SalesError;
use crate::llm::{ChatCompletionRequest, ChatCompletionResponse};

#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// 非流式补全
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, SalesError>;
}

//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。请求 / 响应使用
//! crate::llm::types 中的自定义类型（byot），以便原样回放 tool call 信封。

use async_openai::config::OpenAIConfig;
use async_openai::Client;
use async_trait::async_trait;

use crate::core::SalesError;
use crate::llm::{ChatCompletionRequest, ChatCompletionResponse, ModelGateway};

pub struct OpenAiGateway {
    client: Client<OpenAIConfig>,
}

impl OpenAiGateway {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
        }
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, SalesError> {
        let response: ChatCompletionResponse = self
            .client
            .chat()
            .create_byot(request)
            .await
            .map_err(|e| SalesError::Transport(format!("model completion failed: {e}")))?;

        if response.choices.is_empty() {
            return Err(SalesError::Transport(
                "model completion returned no choices".to_string(),
            ));
        }
        Ok(response)
    }
}

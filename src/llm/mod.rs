//! LLM 层：线上格式、网关抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;
pub mod types;

pub use mock::MockModelGateway;
pub use openai::OpenAiGateway;
pub use traits::ModelGateway;
pub use types::{
    AssistantMessage, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice,
    ContentPart, FunctionCall, FunctionDeclaration, ImageUrl, RequestMessage, ToolCall,
    ToolDeclaration, UserContent,
};

//! Chat Completions 线上格式（请求 / 响应）
//!
//! 自定义类型而非 SDK 内置类型：需要 developer 角色、strict 工具声明、seed，
//! 并把模型发出的 tool_calls 原样回放给模型。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 一次补全请求
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
    pub temperature: f32,
    pub seed: i64,
}

/// 请求中的一条消息：正常构造的消息，或原样回放的 assistant tool-call 信封
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestMessage {
    Chat(ChatMessage),
    Replay(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System { content: String },
    Developer { content: String },
    User { content: UserContent },
    Assistant { content: String },
    Tool { content: String, tool_call_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// 工具声明：`{"type": "function", "function": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDeclaration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub strict: bool,
}

impl ToolDeclaration {
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDeclaration {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
                strict: true,
            },
        }
    }
}

/// 补全响应（只保留编排需要的字段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantMessage {
    /// 回放用信封：role + content + 被分发的那一个 tool call（id / name / arguments 不做任何改写）
    ///
    /// 其余 tool call 不回放：每个回放的 id 都必须有对应的 tool 结果消息。
    pub fn replay_envelope(&self, tool_call_id: &str) -> Value {
        let calls: Vec<&ToolCall> = self
            .tool_calls
            .iter()
            .filter(|call| call.id == tool_call_id)
            .collect();
        serde_json::json!({
            "role": self.role,
            "content": self.content,
            "tool_calls": calls,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON 编码的参数字符串
    pub arguments: String,
}

impl ChatCompletionResponse {
    /// 最后一个 choice（编排只看最后一个）
    pub fn last_choice(&self) -> Option<&Choice> {
        self.choices.last()
    }

    /// 便于测试与 mock 构造：单 choice 的纯文本回复
    pub fn text(content: &str) -> Self {
        Self {
            id: String::new(),
            model: String::new(),
            choices: vec![Choice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content: Some(content.to_string()),
                    tool_calls: Vec::new(),
                },
                finish_reason: Some("stop".to_string()),
            }],
        }
    }

    /// 单 choice、单 tool call 的响应
    pub fn tool_call(id: &str, name: &str, arguments: &str) -> Self {
        Self::tool_calls(&[(id, name, arguments)])
    }

    /// 单 choice、多个 tool call（`(id, name, arguments)`）的响应
    pub fn tool_calls(calls: &[(&str, &str, &str)]) -> Self {
        Self {
            id: String::new(),
            model: String::new(),
            choices: vec![Choice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant".to_string(),
                    content: None,
                    tool_calls: calls
                        .iter()
                        .map(|(id, name, arguments)| ToolCall {
                            id: id.to_string(),
                            kind: default_tool_call_type(),
                            function: FunctionCall {
                                name: name.to_string(),
                                arguments: arguments.to_string(),
                            },
                        })
                        .collect(),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
        }
    }
}

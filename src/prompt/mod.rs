//! 提示词构建：Conversation → 补全请求
//!
//! 顺序固定：system（替换 `#today` 为当天日期）→ 历史消息逐条翻译。
//! 附件规则：图片作为内联 data URI 发送；PDF 内容不发送，用一条 developer 说明代替。

use chrono::NaiveDate;

use crate::conversation::{AttachmentKind, Conversation, Message, Role};
use crate::llm::{
    ChatCompletionRequest, ChatMessage, ContentPart, ImageUrl, RequestMessage, ToolDeclaration,
    UserContent,
};

/// 系统提示词模板中的日期占位符
pub const TODAY_PLACEHOLDER: &str = "#today";

const PDF_RECEIVED_NOTE: &str = "Arquivo recebido é pdf, não é necessário realizar validação.";

/// 采样参数：固定 seed + 固定温度，仅“尽力可复现”
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub model: String,
    pub temperature: f32,
    pub seed: i64,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            model: "gpt-4.1".to_string(),
            temperature: 1.0,
            seed: 0,
        }
    }
}

pub struct PromptBuilder {
    system_template: String,
    sampling: SamplingParams,
    tools: Vec<ToolDeclaration>,
}

impl PromptBuilder {
    pub fn new(
        system_template: impl Into<String>,
        sampling: SamplingParams,
        tools: Vec<ToolDeclaration>,
    ) -> Self {
        Self {
            system_template: system_template.into(),
            sampling,
            tools,
        }
    }

    pub fn system_message(&self, today: NaiveDate) -> String {
        self.system_template
            .replace(TODAY_PLACEHOLDER, &today.format("%d/%m/%Y").to_string())
    }

    /// 按当前本地日期构建
    pub fn build(&self, conversation: &Conversation) -> ChatCompletionRequest {
        self.build_on(conversation, chrono::Local::now().date_naive())
    }

    pub fn build_on(&self, conversation: &Conversation, today: NaiveDate) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.push(RequestMessage::Chat(ChatMessage::System {
            content: self.system_message(today),
        }));
        messages.extend(conversation.messages().iter().map(translate));

        ChatCompletionRequest {
            model: self.sampling.model.clone(),
            messages,
            tools: self.tools.clone(),
            temperature: self.sampling.temperature,
            seed: self.sampling.seed,
        }
    }
}

/// 老客户新会话的一次性说明：会话为空且缓存了全名时返回
pub fn returning_customer_note(conversation: &Conversation) -> Option<Message> {
    if !conversation.is_empty() {
        return None;
    }
    conversation.full_name().map(|name| {
        Message::developer(format!(
            "Este usuário já interagiu conosco antes e o nome completo dele é {name}"
        ))
    })
}

fn translate(message: &Message) -> RequestMessage {
    let chat = match message.role {
        Role::User => match &message.attachment {
            None => ChatMessage::User {
                content: UserContent::Text(message.text.clone()),
            },
            Some(attachment) => match attachment.kind() {
                Some(AttachmentKind::Image) => ChatMessage::User {
                    content: UserContent::Parts(vec![
                        ContentPart::Text {
                            text: message.text.clone(),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: attachment.data_uri(),
                            },
                        },
                    ]),
                },
                Some(AttachmentKind::Pdf) => ChatMessage::Developer {
                    content: PDF_RECEIVED_NOTE.to_string(),
                },
                None => {
                    tracing::warn!(
                        mime = %attachment.mime_type,
                        "unsupported attachment in history, sending text only"
                    );
                    ChatMessage::User {
                        content: UserContent::Text(message.text.clone()),
                    }
                }
            },
        },
        Role::Assistant => ChatMessage::Assistant {
            content: message.text.clone(),
        },
        Role::Developer => ChatMessage::Developer {
            content: message.text.clone(),
        },
        Role::Tool => ChatMessage::Tool {
            content: message.text.clone(),
            tool_call_id: message.tool_call_id.clone().unwrap_or_default(),
        },
        Role::FunctionCall => {
            return RequestMessage::Replay(
                message
                    .tool_call_envelope
                    .clone()
                    .unwrap_or(serde_json::Value::Null),
            )
        }
    };
    RequestMessage::Chat(chat)
}

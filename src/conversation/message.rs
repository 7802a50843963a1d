//! 对话历史中的单条消息与附件

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Developer,
    Tool,
    /// 模型发出的 tool call 信封，回放时原样发送
    FunctionCall,
}

/// 附件在网关上的投递方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Document,
    Image,
}

impl MediaKind {
    /// Evolution 的 messageType：documentMessage 为文档，其余按图片处理
    pub fn from_message_type(message_type: &str) -> Self {
        if message_type == "documentMessage" {
            MediaKind::Document
        } else {
            MediaKind::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Document => "document",
            MediaKind::Image => "image",
        }
    }
}

/// 附件在提示词中的处理方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Pdf,
}

/// 入站接受的 mime 类型
pub const ACCEPTED_MIME_TYPES: [&str; 4] = ["application/pdf", "image/jpeg", "image/jpg", "image/png"];

impl AttachmentKind {
    pub fn classify(mime_type: &str) -> Option<Self> {
        match mime_type {
            "application/pdf" => Some(AttachmentKind::Pdf),
            "image/jpeg" | "image/jpg" | "image/png" => Some(AttachmentKind::Image),
            _ => None,
        }
    }
}

/// 客户发送的文件（候选支付凭证）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub base64: String,
    pub mime_type: String,
    pub media_kind: MediaKind,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl Attachment {
    pub fn kind(&self) -> Option<AttachmentKind> {
        AttachmentKind::classify(&self.mime_type)
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// 历史中的一条消息；历史只追加，不修改不重排
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_envelope: Option<Value>,
}

impl Message {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            attachment: None,
            tool_call_id: None,
            tool_call_envelope: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn user_with_attachment(text: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            attachment: Some(attachment),
            ..Self::new(Role::User, text)
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn developer(text: impl Into<String>) -> Self {
        Self::new(Role::Developer, text)
    }

    pub fn tool_result(text: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, text)
        }
    }

    pub fn function_call(envelope: Value) -> Self {
        Self {
            tool_call_envelope: Some(envelope),
            ..Self::new(Role::FunctionCall, "")
        }
    }
}

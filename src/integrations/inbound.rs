//! 入站事件：Evolution `messages.upsert` 信封的强类型解析
//!
//! 缺字段或类型不符在反序列化时报错（Validation），不会中断其他客户的处理。

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::core::SalesError;

#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    pub data: InboundData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundData {
    pub key: MessageKey,
    pub message_type: String,
    #[serde(default)]
    pub message: Option<MessageBody>,
    #[serde(default)]
    pub push_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub extended_text_message: Option<ExtendedText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendedText {
    pub text: String,
}

/// 分类后的入站事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text { address: String, text: String },
    /// 图片或文档：需要再向网关取内容
    Media {
        address: String,
        message_id: String,
        message_type: String,
    },
    Ignored { reason: String },
}

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)@.+").expect("static regex"))
}

/// 从 `<digits>@<domain>` 取出客户地址
pub fn extract_address(remote_jid: &str) -> Option<String> {
    address_pattern()
        .captures(remote_jid)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

impl InboundEnvelope {
    pub fn from_json(raw: &[u8]) -> Result<Self, SalesError> {
        serde_json::from_slice(raw)
            .map_err(|e| SalesError::Validation(format!("malformed inbound envelope: {e}")))
    }

    /// 分类；`allow_self` 为 false 时跳过自己发出的消息
    pub fn classify(&self, allow_self: bool) -> InboundEvent {
        let data = &self.data;
        if data.key.from_me && !allow_self {
            return InboundEvent::Ignored {
                reason: "self message".to_string(),
            };
        }

        let Some(address) = extract_address(&data.key.remote_jid) else {
            return InboundEvent::Ignored {
                reason: format!("cannot extract phone number from '{}'", data.key.remote_jid),
            };
        };

        match data.message_type.as_str() {
            "conversation" | "extendedTextMessage" => {
                let body = data.message.clone().unwrap_or_default();
                let text = body
                    .conversation
                    .or(body.extended_text_message.map(|e| e.text));
                match text {
                    Some(text) => InboundEvent::Text { address, text },
                    None => InboundEvent::Ignored {
                        reason: format!("{} without text", data.message_type),
                    },
                }
            }
            "imageMessage" | "documentMessage" => InboundEvent::Media {
                address,
                message_id: data.key.id.clone(),
                message_type: data.message_type.clone(),
            },
            other => InboundEvent::Ignored {
                reason: format!("unsupported message type '{other}'"),
            },
        }
    }
}

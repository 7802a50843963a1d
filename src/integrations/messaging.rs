//! 消息网关抽象：发文本、发媒体、按消息 id 取媒体

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::{Attachment, MediaKind};
use crate::core::SalesError;

/// 待发送的媒体
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMedia {
    pub recipient: String,
    pub mime_type: String,
    pub media_kind: MediaKind,
    pub file_name: String,
    /// 已 base64 编码的内容
    pub base64: String,
}

/// 从网关取回的媒体（Evolution getBase64FromMediaMessage 的响应体）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMedia {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(default, rename = "mimetype")]
    pub mime_type: String,
    #[serde(default)]
    pub base64: String,
}

impl InboundMedia {
    pub fn into_attachment(self) -> Attachment {
        Attachment {
            media_kind: MediaKind::from_message_type(&self.media_type),
            base64: self.base64,
            mime_type: self.mime_type,
            file_name: self.file_name,
        }
    }
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), SalesError>;

    async fn send_media(&self, media: &OutboundMedia) -> Result<(), SalesError>;

    async fn fetch_media(&self, message_id: &str) -> Result<InboundMedia, SalesError>;
}

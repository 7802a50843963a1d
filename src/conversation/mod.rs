//! 会话聚合：单个客户的有序消息历史与派生状态
//!
//! 以客户手机号为身份。每处理一个入站事件修改一次（一轮），订单确认后归档并清空，
//! 清空时保留身份与缓存的客户全名，供下次会话使用。

pub mod message;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::SalesError;
use crate::llm::ChatCompletionResponse;
use crate::order::Order;

pub use message::{
    Attachment, AttachmentKind, MediaKind, Message, Role, ACCEPTED_MIME_TYPES,
};

/// 待处理的 tool call；被分发器消费后清除
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    /// JSON 编码的原始参数
    pub arguments: String,
    /// 产生该调用的 assistant 消息信封（回放用）
    pub envelope: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub address: String,
    #[serde(default)]
    messages: Vec<Message>,
    pub last_interaction: DateTime<Utc>,
    #[serde(default)]
    last_response: Option<ChatCompletionResponse>,
    #[serde(default)]
    pending_tool_call: Option<PendingToolCall>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    last_attachment: Option<Attachment>,
    #[serde(default)]
    allow_receipt_forward: bool,
    #[serde(default)]
    order: Option<Order>,
}

impl Conversation {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            messages: Vec::new(),
            last_interaction: Utc::now(),
            last_response: None,
            pending_tool_call: None,
            full_name: None,
            last_attachment: None,
            allow_receipt_forward: false,
            order: None,
        }
    }

    /// 从挂起快照恢复；快照损坏返回 Validation
    pub fn from_snapshot(data: &str) -> Result<Self, SalesError> {
        serde_json::from_str(data)
            .map_err(|e| SalesError::Validation(format!("malformed conversation snapshot: {e}")))
    }

    pub fn to_snapshot(&self) -> Result<String, SalesError> {
        serde_json::to_string(self)
            .map_err(|e| SalesError::Validation(format!("cannot serialize conversation: {e}")))
    }

    /// 追加一条消息（纯追加，不会失败）
    pub fn append_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn touch(&mut self) {
        self.last_interaction = Utc::now();
    }

    /// 最近一条 assistant 回复的文本
    pub fn last_assistant_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.text.as_str())
    }

    pub fn record_response(&mut self, response: ChatCompletionResponse) {
        self.last_response = Some(response);
    }

    pub fn last_response(&self) -> Option<&ChatCompletionResponse> {
        self.last_response.as_ref()
    }

    /// 最近一次模型响应中名为 `name` 的 tool call（只看最后一个 choice，无副作用）
    pub fn pending_tool_call(&self, name: &str) -> Option<PendingToolCall> {
        let message = &self.last_response.as_ref()?.last_choice()?.message;
        message
            .tool_calls
            .iter()
            .find(|call| call.function.name == name)
            .map(|call| PendingToolCall {
                id: call.id.clone(),
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
                envelope: message.replay_envelope(&call.id),
            })
    }

    /// 记录待处理的 tool call；同一时刻至多一个，新的覆盖旧的
    pub fn track_tool_call(&mut self, call: PendingToolCall) {
        if let Some(previous) = self.pending_tool_call.replace(call) {
            tracing::warn!(
                customer = %self.address,
                tool = %previous.name,
                "unconsumed tool call replaced"
            );
        }
    }

    pub fn tracked_tool_call(&self) -> Option<&PendingToolCall> {
        self.pending_tool_call.as_ref()
    }

    pub fn take_pending_tool_call(&mut self) -> Option<PendingToolCall> {
        self.pending_tool_call.take()
    }

    /// 解析 finalize_checkout 参数为订单（不写入会话）
    pub fn extract_order(&self, raw_arguments: &str) -> Result<Order, SalesError> {
        Order::from_tool_arguments(raw_arguments)
    }

    /// 只在 checkout 分发成功后调用
    pub fn set_order(&mut self, order: Order) {
        self.order = Some(order);
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    /// 订单已确认但会话尚未归档；归档成功后 clear 会清掉订单
    pub fn archive_pending(&self) -> bool {
        self.order.is_some()
    }

    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref().filter(|n| !n.is_empty())
    }

    pub fn cache_full_name(&mut self, name: impl Into<String>) {
        self.full_name = Some(name.into());
    }

    pub fn record_attachment(&mut self, attachment: Attachment) {
        self.last_attachment = Some(attachment);
    }

    pub fn last_attachment(&self) -> Option<&Attachment> {
        self.last_attachment.as_ref()
    }

    /// 取走缓存的附件（转发凭证后即清除）
    pub fn take_last_attachment(&mut self) -> Option<Attachment> {
        self.last_attachment.take()
    }

    pub fn allow_receipt_forward(&self) -> bool {
        self.allow_receipt_forward
    }

    pub fn set_allow_receipt_forward(&mut self, allow: bool) {
        self.allow_receipt_forward = allow;
    }

    /// 清空历史与会话标记；保留地址与全名
    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_response = None;
        self.pending_tool_call = None;
        self.last_attachment = None;
        self.allow_receipt_forward = false;
        self.order = None;
    }
}

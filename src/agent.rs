//! Headless 销售 Agent 运行时
//!
//! AgentComponents 是启动时构建一次的显式上下文（配置、模型、消息网关、提示词、工具表、持久化），
//! 在每一轮中以引用传递；SalesAgent 在其上加按客户串行化的会话锁，对单个入站事件跑完整一轮：
//! 加载或新建会话 → 追加入站消息 → 补全 → 分发 tool call → 回复客户 → 归档/清空 → 挂起。
//!
//! 一轮在会话的副本上执行，失败时副本丢弃，内存与检查点中的旧状态保持不变。
//! Webhook 事件经 `enqueue` 进入按客户的邮箱，每位客户一个 worker，事件按到达顺序处理。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::AppConfig;
use crate::conversation::{Attachment, Conversation, Message};
use crate::core::{Mailboxes, RetryPolicy, SalesError, SessionRegistry};
use crate::integrations::{InboundEnvelope, InboundEvent, MessagingGateway, OutboundMedia};
use crate::llm::{ChatCompletionRequest, ChatCompletionResponse, ModelGateway};
use crate::order::OrderFinalizer;
use crate::persistence::{ConversationStore, PersistenceManager};
use crate::prompt::{returning_customer_note, PromptBuilder, SamplingParams};
use crate::tools::{dispatch, FinalizeCheckoutTool, SendCatalogTool, ToolKind, ToolRegistry};

/// 收到支付凭证时记录的用户消息
pub const RECEIPT_MESSAGE: &str = "comprovante de pagamento";
/// 附件格式不受支持时插入的说明
pub const UNSUPPORTED_ATTACHMENT_NOTE: &str =
    "O usuário enviou o comprovante porém não reconheci o formato.";

#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// 接收订单通知与凭证的运营方号码
    pub operator_number: String,
    pub enable_self_messages: bool,
    /// 客户邮箱空闲多久后回收 worker 与内存中的会话
    pub session_idle: Duration,
}

/// 预构建的 Agent 组件，多客户共享
pub struct AgentComponents {
    pub settings: AgentSettings,
    pub model: Arc<dyn ModelGateway>,
    pub messaging: Arc<dyn MessagingGateway>,
    pub prompts: PromptBuilder,
    pub tools: ToolRegistry,
    pub persistence: PersistenceManager,
    pub model_retry: RetryPolicy,
    pub messaging_retry: RetryPolicy,
}

impl AgentComponents {
    /// 模型补全（有界重试 + 单次超时）
    pub async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, SalesError> {
        let model = &self.model;
        self.model_retry
            .run("model.complete", || model.complete(request))
            .await
    }

    pub async fn send_text(&self, recipient: &str, text: &str) -> Result<(), SalesError> {
        let messaging = &self.messaging;
        self.messaging_retry
            .run("messaging.send_text", || messaging.send_text(recipient, text))
            .await
    }

    pub async fn send_media(&self, media: &OutboundMedia) -> Result<(), SalesError> {
        let messaging = &self.messaging;
        self.messaging_retry
            .run("messaging.send_media", || messaging.send_media(media))
            .await
    }

    async fn fetch_media(&self, message_id: &str) -> Result<Attachment, SalesError> {
        let messaging = &self.messaging;
        let media = self
            .messaging_retry
            .run("messaging.fetch_media", || messaging.fetch_media(message_id))
            .await?;
        Ok(media.into_attachment())
    }
}

/// 注册 finalize_checkout 与 send_catalog
pub fn default_tools(operator_number: &str, catalog: &[u8]) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(FinalizeCheckoutTool::new(OrderFinalizer::new(operator_number)));
    tools.register(SendCatalogTool::new(catalog));
    tools
}

/// 从配置与外部协作方构建组件
pub fn create_agent_components(
    cfg: &AppConfig,
    model: Arc<dyn ModelGateway>,
    messaging: Arc<dyn MessagingGateway>,
    store: Arc<dyn ConversationStore>,
    system_prompt: &str,
    catalog: &[u8],
) -> AgentComponents {
    let tools = default_tools(&cfg.app.operator_number, catalog);
    let sampling = SamplingParams {
        model: cfg.llm.model.clone(),
        temperature: cfg.llm.temperature,
        seed: cfg.llm.seed,
    };
    let retry = cfg.retry.policy();

    AgentComponents {
        settings: AgentSettings {
            operator_number: cfg.app.operator_number.clone(),
            enable_self_messages: cfg.app.enable_self_messages,
            session_idle: Duration::from_secs(cfg.app.session_idle_secs),
        },
        model,
        messaging,
        prompts: PromptBuilder::new(system_prompt, sampling, tools.declarations()),
        tools,
        persistence: PersistenceManager::new(store, retry.clone()),
        model_retry: retry.with_call_timeout(Duration::from_secs(cfg.llm.timeouts.request)),
        messaging_retry: retry.with_call_timeout(Duration::from_secs(cfg.messaging.timeout_secs)),
    }
}

/// 已分类、已取回内容的入站消息
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Text(String),
    /// mime 类型已通过校验的附件
    Receipt(Attachment),
    UnsupportedAttachment { mime_type: String },
}

impl InboundMessage {
    /// 附件按 mime 类型校验：受支持的成为凭证，其余在组装提示词前被拒绝
    pub fn from_attachment(attachment: Attachment) -> Self {
        match attachment.kind() {
            Some(_) => InboundMessage::Receipt(attachment),
            None => InboundMessage::UnsupportedAttachment {
                mime_type: attachment.mime_type,
            },
        }
    }

    fn is_media(&self) -> bool {
        !matches!(self, InboundMessage::Text(_))
    }
}

/// 一轮的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// 发给客户的回复；模型返回空文本时为 None
    pub reply: Option<String>,
    pub tool: Option<ToolKind>,
    /// 本轮完成了订单并已归档
    pub archived: bool,
    /// 本轮发起的模型补全次数（1 或 2）
    pub model_calls: usize,
}

pub struct SalesAgent {
    components: Arc<AgentComponents>,
    sessions: SessionRegistry,
    mailboxes: Mailboxes<InboundEvent>,
}

impl SalesAgent {
    pub fn new(components: AgentComponents) -> Self {
        Self {
            components: Arc::new(components),
            sessions: SessionRegistry::new(),
            mailboxes: Mailboxes::new(),
        }
    }

    pub fn components(&self) -> &AgentComponents {
        &self.components
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// 存活的客户邮箱 worker 数
    pub async fn active_mailboxes(&self) -> usize {
        self.mailboxes.active_count().await
    }

    /// 把入站信封投进该客户的邮箱，立即返回；被忽略的事件返回 false
    ///
    /// 同一客户的事件按调用顺序由同一个 worker 逐个处理（媒体取回也在 worker 内完成）。
    pub async fn enqueue(self: &Arc<Self>, envelope: InboundEnvelope) -> bool {
        let event = envelope.classify(self.components.settings.enable_self_messages);
        let address = match &event {
            InboundEvent::Ignored { reason } => {
                tracing::debug!(reason = %reason, "inbound event ignored");
                return false;
            }
            InboundEvent::Text { address, .. } | InboundEvent::Media { address, .. } => address.clone(),
        };

        let agent = Arc::clone(self);
        let key = address.clone();
        let started = self
            .mailboxes
            .enqueue(&address, event, move |rx| {
                tokio::spawn(agent.run_mailbox(key, rx));
            })
            .await;
        if started {
            tracing::debug!(customer = %address, "mailbox worker started");
        }
        true
    }

    /// 单个客户邮箱的 worker：空闲超时后注销，把内存中的会话写回并释放
    async fn run_mailbox(self: Arc<Self>, address: String, mut rx: UnboundedReceiver<InboundEvent>) {
        let idle = self.components.settings.session_idle;
        loop {
            let event = match tokio::time::timeout(idle, rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(_) => match self.mailboxes.retire_if_idle(&address, &mut rx).await {
                    Some(event) => event,
                    None => break,
                },
            };
            // 失败只影响这一位客户的这一轮
            if let Err(e) = self.handle_event(event).await {
                tracing::error!(customer = %address, "inbound event failed: {}", e);
            }
        }
        self.release_session(&address).await;
        tracing::debug!(customer = %address, "mailbox worker retired");
    }

    /// 把内存中的会话写回检查点后移出注册表；写回失败时保留在内存中
    async fn release_session(&self, address: &str) {
        {
            let mut slot = self.sessions.acquire(address).await;
            if let Some(conversation) = slot.as_ref() {
                if let Err(e) = self.components.persistence.suspend(conversation).await {
                    tracing::warn!(customer = address, "cannot flush idle session, kept in memory: {}", e);
                    return;
                }
            }
            *slot = None;
        }
        self.sessions.evict(address).await;
    }

    /// 处理一个入站信封；被忽略的事件返回 Ok(None)
    pub async fn handle_envelope(
        &self,
        envelope: InboundEnvelope,
    ) -> Result<Option<TurnOutcome>, SalesError> {
        self.handle_event(envelope.classify(self.components.settings.enable_self_messages))
            .await
    }

    async fn handle_event(&self, event: InboundEvent) -> Result<Option<TurnOutcome>, SalesError> {
        match event {
            InboundEvent::Ignored { reason } => {
                tracing::debug!(reason = %reason, "inbound event ignored");
                Ok(None)
            }
            InboundEvent::Text { address, text } => self
                .process_inbound(&address, InboundMessage::Text(text))
                .await
                .map(Some),
            InboundEvent::Media {
                address,
                message_id,
                message_type,
            } => {
                tracing::info!(customer = %address, message_type = %message_type, "media received");
                let attachment = match self.components.fetch_media(&message_id).await {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::error!(customer = %address, "cannot fetch media {}: {}", message_id, e);
                        self.alert_operator(&address, &e).await;
                        return Err(e);
                    }
                };
                let inbound = InboundMessage::from_attachment(attachment);
                if let InboundMessage::UnsupportedAttachment { mime_type } = &inbound {
                    tracing::warn!(customer = %address, mime_type = %mime_type, "unsupported attachment rejected");
                }
                self.process_inbound(&address, inbound).await.map(Some)
            }
        }
    }

    /// 对某客户跑一轮；同一客户的轮次串行，不同客户互不阻塞
    pub async fn process_inbound(
        &self,
        address: &str,
        inbound: InboundMessage,
    ) -> Result<TurnOutcome, SalesError> {
        let result = self.process_locked(address, inbound).await;
        if let Err(e) = &result {
            self.alert_operator(address, e).await;
        }
        result
    }

    async fn process_locked(
        &self,
        address: &str,
        inbound: InboundMessage,
    ) -> Result<TurnOutcome, SalesError> {
        let mut slot = self.sessions.acquire(address).await;
        let components = self.components.as_ref();

        let mut working = match slot.as_ref() {
            Some(conversation) => conversation.clone(),
            None => {
                let loaded = components.persistence.load_or_create(address).await?;
                *slot = Some(loaded.clone());
                loaded
            }
        };

        // 上一轮已确认订单但归档未成功：先补归档，再开始本轮
        let mut archived = false;
        if working.archive_pending() {
            match self.archive_and_clear(&mut working).await {
                Ok(()) => {
                    *slot = Some(working.clone());
                    components.persistence.suspend(&working).await?;
                    archived = true;
                    tracing::info!(customer = address, "pending archive recovered");
                }
                Err(e) => {
                    tracing::warn!(customer = address, "pending archive still failing: {}", e);
                }
            }
        }

        let outcome = match run_turn(components, &mut working, inbound).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(customer = address, "turn failed, state left unchanged: {}", e);
                return Err(e);
            }
        };

        // 回复已发出：从这里起不再丢弃已计算的状态
        *slot = Some(working.clone());

        // 订单留在会话上直到归档成功，失败时下一轮会重试
        let mut archived_now = false;
        let mut archive_error = None;
        if working.archive_pending() {
            match self.archive_and_clear(&mut working).await {
                Ok(()) => {
                    *slot = Some(working.clone());
                    archived_now = true;
                }
                Err(e) => {
                    tracing::error!(customer = address, "archive failed, order kept for retry: {}", e);
                    archive_error = Some(e);
                }
            }
        }

        if let Err(e) = components.persistence.suspend(&working).await {
            tracing::error!(customer = address, "suspend failed, reply kept in memory: {}", e);
            return Err(e);
        }
        if let Some(e) = archive_error {
            return Err(e);
        }
        if archived_now {
            // 已清空且已落盘，下一轮从检查点重新加载
            *slot = None;
        }
        let archived = archived || archived_now;

        tracing::info!(
            customer = address,
            tool = ?outcome.tool,
            archived,
            model_calls = outcome.model_calls,
            "turn complete"
        );
        Ok(TurnOutcome { archived, ..outcome })
    }

    async fn archive_and_clear(&self, conversation: &mut Conversation) -> Result<(), SalesError> {
        self.components.persistence.archive(conversation).await?;
        self.components.persistence.clear(conversation);
        Ok(())
    }

    /// 校验失败或工具契约被破坏时通知运营方；通知本身失败只记日志
    async fn alert_operator(&self, address: &str, error: &SalesError) {
        if !matches!(error, SalesError::Validation(_) | SalesError::ProtocolViolation { .. }) {
            return;
        }
        let operator = &self.components.settings.operator_number;
        let text = format!("Falha ao processar a conversa de {address}: {error}");
        if let Err(e) = self.components.send_text(operator, &text).await {
            tracing::warn!(customer = address, "operator alert not delivered: {}", e);
        }
    }
}

/// 所有修改都落在 `conversation` 上
async fn run_turn(
    components: &AgentComponents,
    conversation: &mut Conversation,
    inbound: InboundMessage,
) -> Result<TurnOutcome, SalesError> {
    let address = conversation.address.clone();
    conversation.touch();

    if let Some(note) = returning_customer_note(conversation) {
        tracing::debug!(customer = %address, "returning customer");
        conversation.append_message(note);
    }

    let media_turn = inbound.is_media();
    match inbound {
        InboundMessage::Text(text) => conversation.append_message(Message::user(text)),
        InboundMessage::Receipt(attachment) => {
            conversation.record_attachment(attachment.clone());
            conversation.append_message(Message::user_with_attachment(RECEIPT_MESSAGE, attachment));
        }
        InboundMessage::UnsupportedAttachment { .. } => {
            conversation.append_message(Message::developer(UNSUPPORTED_ATTACHMENT_NOTE))
        }
    }

    let request = components.prompts.build(conversation);
    let response = components.complete(&request).await?;
    conversation.record_response(response);

    let dispatched = dispatch(components, conversation).await?;
    let model_calls = if dispatched.followup_requested() { 2 } else { 1 };

    let (role, text) = conversation
        .last_response()
        .and_then(|r| r.last_choice())
        .map(|c| {
            (
                c.message.role.clone(),
                c.message.content.clone().unwrap_or_default(),
            )
        })
        .unwrap_or_default();

    let reply = if role == "assistant" && !text.is_empty() {
        components.send_text(&address, &text).await?;
        Some(text.clone())
    } else {
        tracing::warn!(customer = %address, role = %role, "empty model reply, nothing sent");
        None
    };
    conversation.append_message(Message::assistant(text));

    if media_turn {
        conversation.set_allow_receipt_forward(false);
    }

    Ok(TurnOutcome {
        reply,
        tool: dispatched.tool,
        archived: false,
        model_calls,
    })
}

#[cfg(test)]
pub(crate) fn test_components(
    model: Arc<dyn ModelGateway>,
    messaging: Arc<dyn MessagingGateway>,
    store: Arc<dyn ConversationStore>,
) -> AgentComponents {
    let tools = default_tools(TEST_OPERATOR, b"%PDF-1.4");
    let retry = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2));
    AgentComponents {
        settings: AgentSettings {
            operator_number: TEST_OPERATOR.into(),
            enable_self_messages: false,
            session_idle: Duration::from_secs(60),
        },
        model,
        messaging,
        prompts: PromptBuilder::new("Hoje é #today", SamplingParams::default(), tools.declarations()),
        tools,
        persistence: PersistenceManager::new(store, retry.clone()),
        model_retry: retry.clone(),
        messaging_retry: retry,
    }
}

#[cfg(test)]
pub(crate) const TEST_OPERATOR: &str = "5500000000000";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::MediaKind;
    use crate::integrations::{InboundMedia, RecordingMessenger};
    use crate::llm::MockModelGateway;
    use crate::persistence::InMemoryConversationStore;

    fn components(model: Arc<MockModelGateway>, messenger: Arc<RecordingMessenger>) -> AgentComponents {
        test_components(model, messenger, Arc::new(InMemoryConversationStore::new()))
    }

    fn attachment(mime: &str) -> Attachment {
        Attachment {
            base64: "AAAA".into(),
            mime_type: mime.into(),
            media_kind: MediaKind::Image,
            file_name: None,
        }
    }

    fn cash_checkout() -> ChatCompletionResponse {
        let args = serde_json::json!({
            "products": [{"product_id": "p1", "product_name": "Pizza", "quantity": 1, "price": "R$ 45,00", "detail": ""}],
            "total_price": "R$ 45,00",
            "full_name": "Ana Souza",
            "delivery_address": "Rua A, 1",
            "payment_method": "cash"
        });
        ChatCompletionResponse::tool_call("call_1", "finalize_checkout", &args.to_string())
    }

    fn envelope(address: &str, id: &str, message_type: &str, text: Option<&str>) -> InboundEnvelope {
        let message = text
            .map(|t| format!(r#","message":{{"conversation":"{t}"}}"#))
            .unwrap_or_default();
        let raw = format!(
            r#"{{"event":"messages.upsert","data":{{"key":{{"remoteJid":"{address}@s.whatsapp.net","fromMe":false,"id":"{id}"}},"messageType":"{message_type}"{message}}}}}"#
        );
        InboundEnvelope::from_json(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_inbound_attachment_validation() {
        assert!(matches!(
            InboundMessage::from_attachment(attachment("image/png")),
            InboundMessage::Receipt(_)
        ));
        assert_eq!(
            InboundMessage::from_attachment(attachment("video/mp4")),
            InboundMessage::UnsupportedAttachment {
                mime_type: "video/mp4".into()
            }
        );
    }

    #[tokio::test]
    async fn test_text_turn_replies_directly() {
        let model = Arc::new(MockModelGateway::with_responses([ChatCompletionResponse::text("Olá!")]));
        let messenger = Arc::new(RecordingMessenger::new());
        let agent = SalesAgent::new(components(model.clone(), messenger.clone()));

        let outcome = agent
            .process_inbound("5511", InboundMessage::Text("oi".into()))
            .await
            .unwrap();
        assert_eq!(outcome.reply.as_deref(), Some("Olá!"));
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(messenger.texts_to("5511"), vec!["Olá!".to_string()]);

        let conv = agent.sessions().try_snapshot("5511").await.unwrap();
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.last_assistant_reply(), Some("Olá!"));
    }

    #[tokio::test]
    async fn test_receipt_turn_records_attachment_and_resets_flag() {
        let model = Arc::new(MockModelGateway::with_responses([ChatCompletionResponse::text("Recebido")]));
        let messenger = Arc::new(RecordingMessenger::new());
        let agent = SalesAgent::new(components(model, messenger));

        agent
            .process_inbound("5511", InboundMessage::from_attachment(attachment("image/jpeg")))
            .await
            .unwrap();
        let conv = agent.sessions().try_snapshot("5511").await.unwrap();
        assert_eq!(conv.messages()[0].text, RECEIPT_MESSAGE);
        assert!(conv.last_attachment().is_some());
        assert!(!conv.allow_receipt_forward());
    }

    #[tokio::test]
    async fn test_unsupported_attachment_becomes_note() {
        let model = Arc::new(MockModelGateway::with_responses([ChatCompletionResponse::text("Pode reenviar?")]));
        let messenger = Arc::new(RecordingMessenger::new());
        let agent = SalesAgent::new(components(model, messenger));

        agent
            .process_inbound("5511", InboundMessage::from_attachment(attachment("audio/ogg")))
            .await
            .unwrap();
        let conv = agent.sessions().try_snapshot("5511").await.unwrap();
        assert_eq!(conv.messages()[0].text, UNSUPPORTED_ATTACHMENT_NOTE);
        assert!(conv.messages()[0].attachment.is_none());
        assert!(conv.last_attachment().is_none());
    }

    #[tokio::test]
    async fn test_empty_reply_not_sent() {
        let model = Arc::new(MockModelGateway::with_responses([ChatCompletionResponse::text("")]));
        let messenger = Arc::new(RecordingMessenger::new());
        let agent = SalesAgent::new(components(model, messenger.clone()));

        let outcome = agent
            .process_inbound("5511", InboundMessage::Text("oi".into()))
            .await
            .unwrap();
        assert!(outcome.reply.is_none());
        assert!(messenger.texts().is_empty());
    }

    #[tokio::test]
    async fn test_failed_archive_is_retried_on_next_turn() {
        let model = Arc::new(MockModelGateway::with_responses([
            cash_checkout(),
            ChatCompletionResponse::text("Pedido confirmado!"),
            ChatCompletionResponse::text("De nada!"),
        ]));
        let messenger = Arc::new(RecordingMessenger::new());
        let store = Arc::new(InMemoryConversationStore::new());
        let agent = SalesAgent::new(test_components(model, messenger.clone(), store.clone()));

        // 两次归档尝试都失败，随后的挂起成功
        store.fail_next_writes(2).await;
        let err = agent
            .process_inbound("5511", InboundMessage::Text("pago na entrega".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SalesError::Persistence(_)));
        assert!(store.archived("5511").await.unwrap().is_empty());
        assert_eq!(messenger.texts_to("5511"), vec!["Pedido confirmado!".to_string()]);
        let kept = agent.sessions().try_snapshot("5511").await.unwrap();
        assert!(kept.archive_pending());

        let outcome = agent
            .process_inbound("5511", InboundMessage::Text("obrigada".into()))
            .await
            .unwrap();
        assert!(outcome.archived);

        let archived = store.archived("5511").await.unwrap();
        assert_eq!(archived.len(), 1);
        assert!(archived[0].order().is_some());
        assert_eq!(archived[0].last_assistant_reply(), Some("Pedido confirmado!"));

        // 新一轮从清空后的会话开始：老客户说明 + 本轮消息
        let conv = agent.sessions().try_snapshot("5511").await.unwrap();
        assert!(!conv.archive_pending());
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages()[1].text, "obrigada");
        assert_eq!(conv.last_assistant_reply(), Some("De nada!"));
    }

    #[tokio::test]
    async fn test_archived_session_released_from_memory() {
        let model = Arc::new(MockModelGateway::with_responses([
            cash_checkout(),
            ChatCompletionResponse::text("Pedido confirmado!"),
        ]));
        let messenger = Arc::new(RecordingMessenger::new());
        let store = Arc::new(InMemoryConversationStore::new());
        let agent = SalesAgent::new(test_components(model, messenger, store.clone()));

        let outcome = agent
            .process_inbound("5511", InboundMessage::Text("pago na entrega".into()))
            .await
            .unwrap();
        assert!(outcome.archived);
        assert!(agent.sessions().try_snapshot("5511").await.is_none());

        let checkpoint = store.load_suspended("5511").await.unwrap().unwrap();
        assert!(checkpoint.is_empty());
        assert_eq!(checkpoint.full_name(), Some("Ana Souza"));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_alerts_operator() {
        let model = Arc::new(MockModelGateway::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let store = Arc::new(InMemoryConversationStore::new());
        store.put_raw("5511", "{not json").await;
        let agent = SalesAgent::new(test_components(model.clone(), messenger.clone(), store));

        let err = agent
            .process_inbound("5511", InboundMessage::Text("oi".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SalesError::Validation(_)));
        assert_eq!(model.call_count(), 0);
        assert!(messenger.texts_to("5511").is_empty());
        let alerts = messenger.texts_to(TEST_OPERATOR);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("5511"));
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_alert_operator() {
        let model = Arc::new(MockModelGateway::new());
        model.push_failure("connection reset");
        model.push_failure("connection reset");
        let messenger = Arc::new(RecordingMessenger::new());
        let agent = SalesAgent::new(components(model, messenger.clone()));

        let err = agent
            .process_inbound("5511", InboundMessage::Text("oi".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SalesError::Transport(_)));
        assert!(messenger.texts().is_empty());
    }

    #[tokio::test]
    async fn test_mailbox_keeps_arrival_order_across_media_fetch() {
        let model = Arc::new(MockModelGateway::with_responses([
            ChatCompletionResponse::text("Recebido"),
            ChatCompletionResponse::text("Anotado"),
        ]));
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.stage_media(
            "M1",
            InboundMedia {
                media_type: "imageMessage".into(),
                mime_type: "image/jpeg".into(),
                base64: "AAAA".into(),
                ..InboundMedia::default()
            },
        );
        // 取回媒体比文本轮慢得多
        messenger.set_fetch_delay(Duration::from_millis(50));
        let agent = Arc::new(SalesAgent::new(components(model.clone(), messenger.clone())));

        assert!(agent.enqueue(envelope("5511", "M1", "imageMessage", None)).await);
        assert!(agent.enqueue(envelope("5511", "M2", "conversation", Some("paguei"))).await);
        assert_eq!(agent.active_mailboxes().await, 1);

        let mut conv = None;
        for _ in 0..200 {
            conv = agent.sessions().try_snapshot("5511").await.filter(|c| c.len() == 4);
            if conv.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let conv = conv.unwrap();
        assert_eq!(conv.messages()[0].text, RECEIPT_MESSAGE);
        assert_eq!(conv.messages()[2].text, "paguei");
        assert_eq!(
            messenger.texts_to("5511"),
            vec!["Recebido".to_string(), "Anotado".to_string()]
        );
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_idle_mailbox_flushes_and_releases_session() {
        let model = Arc::new(MockModelGateway::with_responses([ChatCompletionResponse::text("Olá!")]));
        let messenger = Arc::new(RecordingMessenger::new());
        let store = Arc::new(InMemoryConversationStore::new());
        let mut components = test_components(model, messenger.clone(), store.clone());
        components.settings.session_idle = Duration::from_millis(20);
        let agent = Arc::new(SalesAgent::new(components));

        assert!(!agent.enqueue(envelope("5511", "M0", "reactionMessage", None)).await);
        assert!(agent.enqueue(envelope("5511", "M1", "conversation", Some("oi"))).await);

        for _ in 0..200 {
            if agent.active_mailboxes().await == 0 && agent.sessions().active_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(agent.active_mailboxes().await, 0);
        assert_eq!(agent.sessions().active_count().await, 0);
        assert_eq!(messenger.texts_to("5511"), vec!["Olá!".to_string()]);
        let checkpoint = store.load_suspended("5511").await.unwrap().unwrap();
        assert_eq!(checkpoint.len(), 2);
    }
}

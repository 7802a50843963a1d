//! Tool call 分发状态机
//!
//! NoToolCall → ToolRecognized → ResultAppended → FollowupRequested → TurnComplete
//!
//! 只看最新响应最后一个 choice 的 tool_calls，取第一个已注册的工具；其余忽略。
//! 识别到工具时恰好发起一次 follow-up 补全，保证模型的 tool call 在持久化前已有对应结果。

use crate::agent::AgentComponents;
use crate::conversation::{Conversation, Message};
use crate::core::SalesError;
use crate::tools::ToolKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    NoToolCall,
    ToolRecognized,
    ResultAppended,
    FollowupRequested,
    TurnComplete,
}

/// 分发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub tool: Option<ToolKind>,
    /// 轮末需要归档并清空
    pub archive: bool,
    /// 经过的状态（按顺序）
    pub states: Vec<DispatchState>,
}

impl DispatchOutcome {
    fn start() -> Self {
        Self {
            tool: None,
            archive: false,
            states: vec![DispatchState::NoToolCall],
        }
    }

    fn enter(&mut self, customer: &str, state: DispatchState) {
        tracing::debug!(customer, state = ?state, tool = ?self.tool, "dispatch transition");
        self.states.push(state);
    }

    pub fn followup_requested(&self) -> bool {
        self.states.contains(&DispatchState::FollowupRequested)
    }
}

/// 在最新响应中找第一个已注册的工具
pub fn recognize(components: &AgentComponents, conversation: &Conversation) -> Option<ToolKind> {
    let choice = conversation.last_response()?.last_choice()?;
    let calls = &choice.message.tool_calls;
    let mut recognized = None;
    for call in calls {
        match components.tools.recognize(&call.function.name) {
            Some(kind) if recognized.is_none() => recognized = Some(kind),
            Some(kind) => tracing::warn!(
                customer = %conversation.address,
                tool = %kind,
                "additional tool call ignored"
            ),
            None => tracing::warn!(
                customer = %conversation.address,
                tool = %call.function.name,
                "unrecognized tool call ignored"
            ),
        }
    }
    recognized
}

/// 对最新响应执行分发；会话上 last_response 会被 follow-up 响应替换
pub async fn dispatch(
    components: &AgentComponents,
    conversation: &mut Conversation,
) -> Result<DispatchOutcome, SalesError> {
    let mut outcome = DispatchOutcome::start();
    let customer = conversation.address.clone();

    let Some(kind) = recognize(components, conversation) else {
        outcome.enter(&customer, DispatchState::TurnComplete);
        return Ok(outcome);
    };
    let (Some(handler), Some(call)) = (
        components.tools.get(kind),
        conversation.pending_tool_call(kind.name()),
    ) else {
        outcome.enter(&customer, DispatchState::TurnComplete);
        return Ok(outcome);
    };

    outcome.tool = Some(kind);
    conversation.track_tool_call(call.clone());
    outcome.enter(&customer, DispatchState::ToolRecognized);
    tracing::info!(customer = %customer, tool = %kind, "tool call recognized");

    // 执行期间该 tool call 保持为待处理状态，追加结果消息时才被消费
    let execution = match handler.execute(components, conversation, &call).await {
        Ok(execution) => execution,
        Err(e @ SalesError::ProtocolViolation { .. }) => {
            tracing::error!(
                customer = %customer,
                tool = %kind,
                arguments = %call.arguments,
                "strict tool contract broken, aborting turn: {}",
                e
            );
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    let Some(consumed) = conversation.take_pending_tool_call() else {
        return Err(SalesError::ProtocolViolation {
            tool: kind.name().to_string(),
            reason: "tracked tool call vanished during execution".to_string(),
        });
    };
    conversation.append_message(Message::function_call(consumed.envelope));
    conversation.append_message(Message::tool_result(execution.result_text.clone(), consumed.id));
    outcome.enter(&customer, DispatchState::ResultAppended);

    let request = components.prompts.build(conversation);
    let followup = components.complete(&request).await?;
    conversation.record_response(followup);
    outcome.enter(&customer, DispatchState::FollowupRequested);

    let effect = handler.after_followup(components, conversation, execution).await?;
    outcome.archive = effect.archive;
    outcome.enter(&customer, DispatchState::TurnComplete);
    Ok(outcome)
}

//! 工具注册表
//!
//! 工具名是封闭集合 ToolKind；每个 ToolKind 对应一个实现 ToolHandler 的处理器。
//! 新增工具 = 增加一个 ToolKind 变体 + register 一个处理器。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::AgentComponents;
use crate::conversation::{Conversation, PendingToolCall};
use crate::core::SalesError;
use crate::llm::ToolDeclaration;

/// 已声明的工具
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolKind {
    FinalizeCheckout,
    SendCatalog,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::FinalizeCheckout, ToolKind::SendCatalog];

    /// 模型看到的函数名
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::FinalizeCheckout => "finalize_checkout",
            ToolKind::SendCatalog => "send_catalog",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// execute 的产物：写回给模型的结果文本，以及 follow-up 之后要用的数据
#[derive(Debug, Clone)]
pub struct ToolExecution {
    pub result_text: String,
    pub order: Option<crate::order::Order>,
}

impl ToolExecution {
    pub fn result(text: impl Into<String>) -> Self {
        Self {
            result_text: text.into(),
            order: None,
        }
    }
}

/// follow-up 之后对本轮的影响
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolEffect {
    /// 轮末归档并清空会话
    pub archive: bool,
}

/// 工具处理器：声明（名称 / 描述 / 参数 schema）+ 两段执行
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn kind(&self) -> ToolKind;

    fn description(&self) -> &str;

    /// strict 参数 schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": [],
            "additionalProperties": false
        })
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::function(self.kind().name(), self.description(), self.parameters_schema())
    }

    /// 在追加 tool 结果消息之前执行
    async fn execute(
        &self,
        components: &AgentComponents,
        conversation: &mut Conversation,
        call: &PendingToolCall,
    ) -> Result<ToolExecution, SalesError>;

    /// follow-up 补全完成之后执行
    async fn after_followup(
        &self,
        _components: &AgentComponents,
        _conversation: &mut Conversation,
        _execution: ToolExecution,
    ) -> Result<ToolEffect, SalesError> {
        Ok(ToolEffect::default())
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    handlers: BTreeMap<ToolKind, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: impl ToolHandler + 'static) {
        self.handlers.insert(handler.kind(), Arc::new(handler));
    }

    pub fn get(&self, kind: ToolKind) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(&kind).cloned()
    }

    /// 按名称识别已注册的工具
    pub fn recognize(&self, name: &str) -> Option<ToolKind> {
        ToolKind::from_name(name).filter(|k| self.handlers.contains_key(k))
    }

    pub fn kinds(&self) -> Vec<ToolKind> {
        self.handlers.keys().copied().collect()
    }

    /// 发给模型的工具声明（按 ToolKind 顺序）
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.handlers.values().map(|h| h.declaration()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_kind_names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("finalizar_checkout"), None);
    }
}

//! Salesbot - WhatsApp 销售对话智能体
//!
//! 模块划分：
//! - **agent**: 无头 Agent 运行时（显式上下文 + 按客户串行化的一轮处理）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **conversation**: 会话聚合与消息
//! - **core**: 错误分类、重试与超时、会话锁
//! - **integrations**: Evolution API 消息网关、入站信封、Webhook
//! - **llm**: 补全线上格式与模型网关（OpenAI 兼容 / Mock）
//! - **order**: 订单与订单收尾（运营方通知、凭证转发）
//! - **persistence**: 挂起检查点与归档日志（SQLite / 内存）
//! - **prompt**: 提示词组装
//! - **tools**: 工具表与 tool call 分发状态机

pub mod agent;
pub mod config;
pub mod conversation;
pub mod core;
pub mod integrations;
pub mod llm;
pub mod observability;
pub mod order;
pub mod persistence;
pub mod prompt;
pub mod tools;

pub use agent::{AgentComponents, InboundMessage, SalesAgent, TurnOutcome};
pub use core::SalesError;

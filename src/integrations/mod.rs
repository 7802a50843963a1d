//! 外部集成：Evolution API 消息网关、入站信封、Webhook 路由（需 feature webhook）

pub mod evolution;
pub mod inbound;
pub mod messaging;
pub mod mock;

#[cfg(feature = "webhook")]
pub mod webhook;

pub use evolution::EvolutionGateway;
pub use inbound::{extract_address, InboundEnvelope, InboundEvent};
pub use messaging::{InboundMedia, MessagingGateway, OutboundMedia};
pub use mock::{RecordingMessenger, SentText};

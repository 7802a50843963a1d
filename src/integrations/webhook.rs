//! Webhook 入口：接收 Evolution `messages.upsert` 事件
//!
//! 事件按到达顺序投进该客户的邮箱后立即返回 200；信封缺字段或类型不符由 Json 提取器拒绝（422）。

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};

use crate::agent::SalesAgent;
use crate::integrations::InboundEnvelope;

pub fn create_router(agent: Arc<SalesAgent>) -> Router {
    Router::new()
        .route("/webhook", post(webhook_receive))
        .route("/health", get(|| async { "OK" }))
        .with_state(agent)
}

/// POST /webhook
async fn webhook_receive(
    State(agent): State<Arc<SalesAgent>>,
    Json(envelope): Json<InboundEnvelope>,
) -> StatusCode {
    tracing::debug!(
        event = envelope.event.as_deref().unwrap_or(""),
        message_type = %envelope.data.message_type,
        "webhook event"
    );
    agent.enqueue(envelope).await;
    StatusCode::OK
}

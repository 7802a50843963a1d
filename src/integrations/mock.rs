//! 记录型消息网关（用于测试）：记录所有发送，可预置媒体与失败次数

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::SalesError;
use crate::integrations::messaging::{InboundMedia, MessagingGateway, OutboundMedia};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentText {
    pub recipient: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct RecordingMessenger {
    texts: Mutex<Vec<SentText>>,
    media: Mutex<Vec<OutboundMedia>>,
    inbound_media: Mutex<HashMap<String, InboundMedia>>,
    /// 接下来这么多次 send_* 调用返回 Transport 错误
    failures_left: Mutex<usize>,
    /// fetch_media 返回前等待的时间
    fetch_delay: Mutex<Duration>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置某条消息 id 对应的媒体
    pub fn stage_media(&self, message_id: &str, media: InboundMedia) {
        lock(&self.inbound_media).insert(message_id.to_string(), media);
    }

    /// 让取回媒体变慢，用于观察并发下的处理顺序
    pub fn set_fetch_delay(&self, delay: Duration) {
        *lock(&self.fetch_delay) = delay;
    }

    pub fn fail_next_sends(&self, count: usize) {
        *lock(&self.failures_left) = count;
    }

    pub fn texts(&self) -> Vec<SentText> {
        lock(&self.texts).clone()
    }

    pub fn texts_to(&self, recipient: &str) -> Vec<String> {
        lock(&self.texts)
            .iter()
            .filter(|t| t.recipient == recipient)
            .map(|t| t.text.clone())
            .collect()
    }

    pub fn media(&self) -> Vec<OutboundMedia> {
        lock(&self.media).clone()
    }

    pub fn media_to(&self, recipient: &str) -> Vec<OutboundMedia> {
        lock(&self.media)
            .iter()
            .filter(|m| m.recipient == recipient)
            .cloned()
            .collect()
    }

    fn injected_failure(&self) -> Result<(), SalesError> {
        let mut left = lock(&self.failures_left);
        if *left > 0 {
            *left -= 1;
            return Err(SalesError::Transport("injected send failure".to_string()));
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl MessagingGateway for RecordingMessenger {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), SalesError> {
        self.injected_failure()?;
        lock(&self.texts).push(SentText {
            recipient: recipient.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_media(&self, media: &OutboundMedia) -> Result<(), SalesError> {
        self.injected_failure()?;
        lock(&self.media).push(media.clone());
        Ok(())
    }

    async fn fetch_media(&self, message_id: &str) -> Result<InboundMedia, SalesError> {
        let delay = *lock(&self.fetch_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        lock(&self.inbound_media)
            .get(message_id)
            .cloned()
            .ok_or_else(|| SalesError::Transport(format!("no media staged for {message_id}")))
    }
}

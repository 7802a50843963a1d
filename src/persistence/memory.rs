//! 内存存储（用于测试与本地运行）

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::conversation::Conversation;
use crate::core::SalesError;
use crate::persistence::ConversationStore;

/// 快照以序列化字符串保存，与 SQLite 实现走同一条编解码路径
#[derive(Default)]
pub struct InMemoryConversationStore {
    suspended: Mutex<HashMap<String, String>>,
    archive: Mutex<Vec<(String, String)>>,
    /// 接下来这么多次写操作返回 Persistence 错误
    failures_left: Mutex<usize>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_next_writes(&self, count: usize) {
        *self.failures_left.lock().await = count;
    }

    pub async fn suspended_count(&self) -> usize {
        self.suspended.lock().await.len()
    }

    /// 直接写入原始快照（模拟损坏数据）
    pub async fn put_raw(&self, address: &str, data: &str) {
        self.suspended
            .lock()
            .await
            .insert(address.to_string(), data.to_string());
    }

    pub async fn archived(&self, address: &str) -> Result<Vec<Conversation>, SalesError> {
        self.archive
            .lock()
            .await
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, d)| Conversation::from_snapshot(d))
            .collect()
    }

    async fn injected_failure(&self) -> Result<(), SalesError> {
        let mut left = self.failures_left.lock().await;
        if *left > 0 {
            *left -= 1;
            return Err(SalesError::Persistence("injected store failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load_suspended(&self, address: &str) -> Result<Option<Conversation>, SalesError> {
        self.suspended
            .lock()
            .await
            .get(address)
            .map(|d| Conversation::from_snapshot(d))
            .transpose()
    }

    async fn upsert_suspended(&self, conversation: &Conversation) -> Result<(), SalesError> {
        self.injected_failure().await?;
        let data = conversation.to_snapshot()?;
        self.suspended
            .lock()
            .await
            .insert(conversation.address.clone(), data);
        Ok(())
    }

    async fn append_archive(&self, conversation: &Conversation) -> Result<(), SalesError> {
        self.injected_failure().await?;
        let data = conversation.to_snapshot()?;
        self.archive
            .lock()
            .await
            .push((conversation.address.clone(), data));
        Ok(())
    }
}

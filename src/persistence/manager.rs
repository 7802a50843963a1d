//! 持久化管理：挂起（每轮都调用）、归档（订单确认时）、清空（只动内存）
//!
//! 存储调用经 RetryPolicy 有界重试。

use std::sync::Arc;
use std::time::Duration;

use crate::conversation::Conversation;
use crate::core::{RetryPolicy, SalesError};
use crate::persistence::ConversationStore;

const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct PersistenceManager {
    store: Arc<dyn ConversationStore>,
    retry: RetryPolicy,
}

impl PersistenceManager {
    pub fn new(store: Arc<dyn ConversationStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry: retry.with_call_timeout(STORE_CALL_TIMEOUT),
        }
    }

    /// 有挂起快照则恢复，否则新建空会话
    pub async fn load_or_create(&self, address: &str) -> Result<Conversation, SalesError> {
        let store = &self.store;
        let loaded = self
            .retry
            .run("load_suspended", || store.load_suspended(address))
            .await?;
        match loaded {
            Some(conversation) => {
                tracing::info!(customer = address, messages = conversation.len(), "resumed suspended conversation");
                Ok(conversation)
            }
            None => {
                tracing::info!(customer = address, "new conversation");
                Ok(Conversation::new(address))
            }
        }
    }

    /// 检查点 upsert
    pub async fn suspend(&self, conversation: &Conversation) -> Result<(), SalesError> {
        let store = &self.store;
        self.retry
            .run("suspend", || store.upsert_suspended(conversation))
            .await?;
        tracing::debug!(customer = %conversation.address, messages = conversation.len(), "conversation suspended");
        Ok(())
    }

    /// 写入不可变归档记录
    pub async fn archive(&self, conversation: &Conversation) -> Result<(), SalesError> {
        let store = &self.store;
        self.retry
            .run("archive", || store.append_archive(conversation))
            .await?;
        tracing::info!(customer = %conversation.address, messages = conversation.len(), "conversation archived");
        Ok(())
    }

    /// 清空内存中的历史与标记；挂起快照由随后的 suspend 覆盖
    pub fn clear(&self, conversation: &mut Conversation) {
        conversation.clear();
    }
}

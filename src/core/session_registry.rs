//! 会话注册表：按客户地址串行化对话轮次
//!
//! 每个地址一个槽位 `Arc<Mutex<Option<Conversation>>>`。外层表锁只在取/建槽位时短暂持有，
//! 槽位锁在整轮对话（含持久化）期间持有：同一地址同一时刻至多一轮在执行，不同地址互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::conversation::Conversation;

/// 槽位：None 表示需要从挂起存储（重新）加载该客户
pub type SessionSlot = Arc<Mutex<Option<Conversation>>>;

#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得（或创建）地址对应的槽位
    pub async fn slot(&self, address: &str) -> SessionSlot {
        let mut slots = self.slots.lock().await;
        slots
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// 独占某个地址直到 guard 被释放
    pub async fn acquire(&self, address: &str) -> OwnedMutexGuard<Option<Conversation>> {
        self.slot(address).await.lock_owned().await
    }

    /// 当前内存中已加载的会话快照（不等待正在执行的轮次）
    pub async fn try_snapshot(&self, address: &str) -> Option<Conversation> {
        let slot = self.slots.lock().await.get(address).cloned()?;
        let guard = slot.try_lock().ok()?;
        guard.clone()
    }

    /// 移除空闲地址的槽位；有人持有（或正在等待）该槽位时不移除
    pub async fn evict(&self, address: &str) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.get(address) {
            Some(slot) if Arc::strong_count(slot) == 1 => {
                slots.remove(address);
                true
            }
            _ => false,
        }
    }

    pub async fn active_count(&self) -> usize {
        self.slots.lock().await.len()
    }
}

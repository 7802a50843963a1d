//! 按 key 的单写者邮箱：每个 key 一个 mpsc 通道 + 一个 worker
//!
//! 事件按 enqueue 的调用顺序进入通道，worker 逐个处理，同一 key 的事件严格先进先出。
//! worker 空闲退出时经 `retire_if_idle` 在同一把锁下注销，不会与新事件的投递交错丢失。

use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::SendError, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

pub struct Mailboxes<E> {
    senders: Mutex<HashMap<String, UnboundedSender<E>>>,
}

impl<E> Default for Mailboxes<E> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
        }
    }
}

impl<E: Send + 'static> Mailboxes<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 投递事件；key 没有存活的 worker 时新建通道并调用 `start` 启动 worker
    ///
    /// 返回是否新建了 worker。`start` 在持锁期间调用，应只做 spawn。
    pub async fn enqueue<F>(&self, key: &str, event: E, start: F) -> bool
    where
        F: FnOnce(UnboundedReceiver<E>),
    {
        let mut senders = self.senders.lock().await;
        let event = match senders.get(key) {
            Some(tx) => match tx.send(event) {
                Ok(()) => return false,
                // worker 已退出但未注销
                Err(SendError(event)) => event,
            },
            None => event,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // rx 仍在本作用域内，send 不会失败
        let _ = tx.send(event);
        senders.insert(key.to_string(), tx);
        start(rx);
        true
    }

    /// worker 空闲时调用：通道为空则注销并返回 None（worker 应退出），否则返回刚到达的事件
    pub async fn retire_if_idle(&self, key: &str, rx: &mut UnboundedReceiver<E>) -> Option<E> {
        let mut senders = self.senders.lock().await;
        match rx.try_recv() {
            Ok(event) => Some(event),
            Err(_) => {
                senders.remove(key);
                None
            }
        }
    }

    /// 当前存活的 worker 数
    pub async fn active_count(&self) -> usize {
        self.senders.lock().await.len()
    }
}

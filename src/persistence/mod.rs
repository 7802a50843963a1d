//! 会话持久化：挂起检查点（upsert）与归档日志（只追加）

pub mod manager;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::conversation::Conversation;
use crate::core::SalesError;

pub use manager::PersistenceManager;
pub use memory::InMemoryConversationStore;
pub use sqlite::SqliteConversationStore;

/// 存储接口
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// 读取挂起快照；不存在返回 None，损坏返回 Validation
    async fn load_suspended(&self, address: &str) -> Result<Option<Conversation>, SalesError>;

    /// 单条语句原子 upsert，以客户地址为键
    async fn upsert_suspended(&self, conversation: &Conversation) -> Result<(), SalesError>;

    /// 追加一条不可变归档记录
    async fn append_archive(&self, conversation: &Conversation) -> Result<(), SalesError>;
}

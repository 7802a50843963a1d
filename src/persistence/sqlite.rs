//! SQLite 持久化（sqlx，异步）

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::conversation::Conversation;
use crate::core::SalesError;
use crate::persistence::ConversationStore;

pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// 连接并建表；url 形如 `sqlite:salesbot.db?mode=rwc` 或 `sqlite::memory:`
    pub async fn connect(database_url: &str) -> Result<Self, SalesError> {
        // 内存库每个连接各自独立，只能用单连接
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_tables(&self) -> Result<(), SalesError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS suspended_chats (
                phone_number TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chat_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phone_number TEXT NOT NULL,
                data TEXT NOT NULL,
                archived_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_logs_phone ON chat_logs(phone_number)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// 某客户的挂起记录条数（0 或 1）
    pub async fn suspended_count(&self, address: &str) -> Result<i64, SalesError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM suspended_chats WHERE phone_number = ?")
                .bind(address)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// 某客户的全部归档快照（按写入顺序）
    pub async fn archived(&self, address: &str) -> Result<Vec<Conversation>, SalesError> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT data FROM chat_logs WHERE phone_number = ? ORDER BY id")
                .bind(address)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(|d| Conversation::from_snapshot(d)).collect()
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn load_suspended(&self, address: &str) -> Result<Option<Conversation>, SalesError> {
        let data: Option<String> =
            sqlx::query_scalar("SELECT data FROM suspended_chats WHERE phone_number = ?")
                .bind(address)
                .fetch_optional(&self.pool)
                .await?;
        data.map(|d| Conversation::from_snapshot(&d)).transpose()
    }

    async fn upsert_suspended(&self, conversation: &Conversation) -> Result<(), SalesError> {
        let data = conversation.to_snapshot()?;
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO suspended_chats (phone_number, data, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(phone_number) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(&conversation.address)
        .bind(&data)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_archive(&self, conversation: &Conversation) -> Result<(), SalesError> {
        let data = conversation.to_snapshot()?;
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO chat_logs (phone_number, data, archived_at) VALUES (?, ?, ?)")
            .bind(&conversation.address)
            .bind(&data)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;

    async fn store() -> SqliteConversationStore {
        SqliteConversationStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_checkpoint_is_none() {
        let store = store().await;
        assert!(store.load_suspended("5511").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_suspend_round_trip() {
        let store = store().await;
        let mut conv = Conversation::new("5511");
        conv.append_message(Message::user("Quero 2 pizzas"));
        conv.append_message(Message::assistant("Claro!"));
        conv.cache_full_name("Maria Silva");
        conv.set_allow_receipt_forward(true);

        store.upsert_suspended(&conv).await.unwrap();
        let loaded = store.load_suspended("5511").await.unwrap().unwrap();
        assert_eq!(loaded.messages(), conv.messages());
        assert_eq!(loaded.full_name(), Some("Maria Silva"));
        assert!(loaded.allow_receipt_forward());
        assert_eq!(loaded, conv);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = store().await;
        let mut conv = Conversation::new("5511");
        conv.append_message(Message::user("oi"));
        store.upsert_suspended(&conv).await.unwrap();
        store.upsert_suspended(&conv).await.unwrap();
        assert_eq!(store.suspended_count("5511").await.unwrap(), 1);

        conv.append_message(Message::assistant("Olá"));
        store.upsert_suspended(&conv).await.unwrap();
        assert_eq!(store.suspended_count("5511").await.unwrap(), 1);
        let loaded = store.load_suspended("5511").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn test_archive_appends() {
        let store = store().await;
        let mut conv = Conversation::new("5511");
        conv.append_message(Message::user("pedido 1"));
        store.append_archive(&conv).await.unwrap();
        conv.append_message(Message::user("pedido 2"));
        store.append_archive(&conv).await.unwrap();

        let archived = store.archived("5511").await.unwrap();
        assert_eq!(archived.len(), 2);
        assert_eq!(archived[0].len(), 1);
        assert_eq!(archived[1].len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_validation_error() {
        let store = store().await;
        sqlx::query("INSERT INTO suspended_chats (phone_number, data, updated_at) VALUES ('9', 'not json', '')")
            .execute(&store.pool)
            .await
            .unwrap();
        let err = store.load_suspended("9").await.unwrap_err();
        assert!(matches!(err, SalesError::Validation(_)));
    }
}

//! 核心层：错误分类、有界重试、按客户串行化的会话锁与邮箱、优雅关闭

pub mod error;
pub mod mailbox;
pub mod retry;
pub mod session_registry;
pub mod shutdown;

pub use error::SalesError;
pub use mailbox::Mailboxes;
pub use retry::RetryPolicy;
pub use session_registry::{SessionRegistry, SessionSlot};
pub use shutdown::install_signal_handlers;

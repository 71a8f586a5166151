//! 记忆层：对话消息与截断策略、会话持久化、TTL 缓存

pub mod cache;
pub mod conversation;
pub mod persistence;

pub use cache::TtlCache;
pub use conversation::{truncate, Message, Role};
pub use persistence::ConversationMemoryManager;

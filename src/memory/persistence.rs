//! 对话持久化
//!
//! 每个会话一行：消息列表序列化为 JSON，按 session_id upsert；用于跨进程重启恢复多轮上下文。

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};

use crate::core::AgentError;
use crate::memory::{truncate, Message};
use crate::store::{now_rfc3339, Database};

/// 会话记忆管理器：load / save 整个有界的消息列表
#[derive(Debug, Clone)]
pub struct ConversationMemoryManager {
    db: Arc<Database>,
    max_turns: usize,
}

impl ConversationMemoryManager {
    pub fn new(db: Arc<Database>, max_turns: usize) -> Self {
        Self { db, max_turns }
    }

    /// 加载会话历史；会话不存在时返回空 Vec
    pub fn load_conversation(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        let raw: Option<String> = self.db.with_conn(|c| {
            c.query_row(
                "SELECT messages FROM agent_conversations WHERE session_id = ?1",
                [session_id],
                |r| r.get(0),
            )
            .optional()
        })?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let messages: Vec<Message> = serde_json::from_str(&raw)?;
        Ok(truncate(&messages, self.max_turns))
    }

    /// 以整表覆盖的方式保存（幂等 upsert）；超出上限的最旧消息被丢弃
    pub fn save_conversation(
        &self,
        session_id: &str,
        user_id: &str,
        turns: &[Message],
    ) -> Result<(), AgentError> {
        let kept = truncate(turns, self.max_turns);
        let raw = serde_json::to_string(&kept)?;
        self.db.with_conn(|c| {
            c.execute(
                "INSERT INTO agent_conversations (session_id, user_id, messages, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id) DO UPDATE SET
                   user_id = excluded.user_id,
                   messages = excluded.messages,
                   updated_at = excluded.updated_at",
                params![session_id, user_id, raw, now_rfc3339()],
            )
        })?;
        tracing::debug!(session_id, turns = kept.len(), "conversation saved");
        Ok(())
    }

    pub fn clear_conversation(&self, session_id: &str) -> Result<(), AgentError> {
        self.db.with_conn(|c| {
            c.execute(
                "DELETE FROM agent_conversations WHERE session_id = ?1",
                [session_id],
            )
        })?;
        Ok(())
    }
}

//! 短期记忆：对话消息与截断策略
//!
//! 会话历史按插入顺序保存；超出上限时由 `truncate` 从最旧的一端丢弃，保留最近部分。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（Tool 仅出现在单轮的工作历史中，不会持久化）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// 单条消息（ConversationTurn）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// assistant 最终回复上挂载本轮执行的步骤等元数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// 截断策略：最多保留 max_turns 条，超出时丢弃最旧的
pub fn truncate(turns: &[Message], max_turns: usize) -> Vec<Message> {
    let skip = turns.len().saturating_sub(max_turns);
    turns[skip..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(format!("m{i}"))).collect()
    }

    #[test]
    fn test_truncate_keeps_most_recent() {
        let turns = numbered(5);
        let kept = truncate(&turns, 3);
        let contents: Vec<&str> = kept.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_truncate_under_cap_is_identity() {
        let turns = numbered(2);
        assert_eq!(truncate(&turns, 10), turns);
        assert!(truncate(&turns, 0).is_empty());
    }

    #[test]
    fn test_metadata_is_omitted_when_absent() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}

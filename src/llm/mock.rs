//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按脚本依次返回预设的回复或错误；脚本耗尽后返回 fallback，未设置 fallback 时
//! 把最后一条 User 消息回显为最终回答。记录每次收到的消息列表，便于断言提示词内容。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定的回复
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    /// 依次返回给定的结果（可夹杂错误）
    pub fn with_results(results: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    /// 脚本耗尽后一直返回该回复
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// 每次调用前等待
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的完整消息列表
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        if let Some(result) = next {
            return result;
        }
        if let Some(fallback) = &self.fallback {
            return Ok(fallback.clone());
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {last_user}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let mock = MockLlmClient::with_results(vec![
            Err(LlmError::Timeout),
            Ok("first".to_string()),
        ])
        .with_fallback("again");

        let msgs = [Message::user("hi")];
        assert_eq!(mock.complete(&msgs).await, Err(LlmError::Timeout));
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(mock.complete(&msgs).await.unwrap(), "again");
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_echoes_last_user_message() {
        let mock = MockLlmClient::new();
        let reply = mock
            .complete(&[Message::system("s"), Message::user("find KOLs")])
            .await
            .unwrap();
        assert_eq!(reply, "Echo from Mock: find KOLs");
    }
}

//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::complete；
//! 错误统一为 LlmError，由 RetryConfig 计算退避时间。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("API error: {0}")]
    Api(String),

    #[error("Empty response")]
    EmptyResponse,
}

impl LlmError {
    /// 网络、超时、限流、空响应可重试；API 错误（鉴权、参数）重试无意义
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::Api(_))
    }

    /// 从底层错误文本归类（async-openai 的错误只暴露可读文本）
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("429") {
            LlmError::RateLimited {
                retry_after_ms: 1_000,
            }
        } else if lower.contains("timed out") || lower.contains("timeout") {
            LlmError::Timeout
        } else if lower.contains("error sending request")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
        {
            LlmError::Network(message.to_string())
        } else {
            LlmError::Api(message.to_string())
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 规划调用的重试策略：指数退避，带上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试（从 0 开始）前的等待时间：base * 2^attempt，不超过 max；
    /// 限流时至少等待服务端给出的 retry_after
    pub fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_delay_ms);
        let ms = match err {
            LlmError::RateLimited { retry_after_ms } => exp.max(*retry_after_ms),
            _ => exp,
        };
        Duration::from_millis(ms)
    }
}

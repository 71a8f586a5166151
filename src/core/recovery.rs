//! 错误恢复引擎
//!
//! 根据 AgentError 类型与已重试次数返回 RecoveryAction，供控制循环决定是退避重试、注入纠正提示、
//! 优雅终止还是放弃本轮。工具级错误已由 ToolExecutor 转成 ToolResult，不经过这里。

use crate::core::{AgentError, RecoveryAction};
use crate::llm::RetryConfig;

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default, Clone)]
pub struct RecoveryEngine {
    retry: RetryConfig,
}

impl RecoveryEngine {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// attempt 为本次规划已失败的次数（从 0 开始）
    pub fn handle(&self, err: &AgentError, attempt: u32) -> RecoveryAction {
        match err {
            AgentError::PlanningTransport(e) => {
                if e.is_retryable() && attempt < self.retry.max_retries {
                    RecoveryAction::RetryAfter(self.retry.delay_for(attempt, e))
                } else {
                    RecoveryAction::Abort
                }
            }
            AgentError::MalformedPlan(raw) => {
                if attempt < self.retry.max_retries {
                    RecoveryAction::RetryWithPrompt(format!(
                        "Your previous output was not a valid tool call: {raw}. \
                         To call a tool, output exactly one JSON object and nothing else: \
                         {{\"tool\": \"<tool name>\", \"args\": {{...}}}}. \
                         To answer the user, reply in plain text without JSON."
                    ))
                } else {
                    RecoveryAction::Abort
                }
            }
            AgentError::BudgetExceeded(reason) => RecoveryAction::Stop(reason.clone()),
            _ => RecoveryAction::Abort,
        }
    }
}

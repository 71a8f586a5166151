//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryAfter / RetryWithPrompt / Stop / Abort。
//! 步骤级错误（参数校验、工具执行、未知工具）只会以 ToolResult 的形式出现在单步结果中，不会中止一轮对话。

use std::time::Duration;

use thiserror::Error;

use crate::core::AgentPhase;
use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 工具参数未通过 schema 校验
    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// 规划调用（LLM）不可达或返回错误
    #[error("Planning transport error: {0}")]
    PlanningTransport(#[from] LlmError),

    /// LLM 输出了无法解析的 tool call
    #[error("Malformed planner output: {0}")]
    MalformedPlan(String),

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// 撤销目标不存在、不可撤销或已撤销
    #[error("Undo conflict: {0}")]
    UndoConflict(String),

    /// 补偿操作本身失败，记录保持未撤销
    #[error("Undo failed: {0}")]
    UndoExecution(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Illegal phase transition: {from:?} -> {to:?}")]
    IllegalTransition { from: AgentPhase, to: AgentPhase },
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::Config(e.to_string())
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 等待退避时间后重新发起规划调用
    RetryAfter(Duration),
    /// 将纠正提示注入下一轮，让 LLM 重新输出（如 JSON 格式错误）
    RetryWithPrompt(String),
    /// 预算耗尽：优雅终止并汇总已完成的步骤
    Stop(String),
    /// 终止当前轮
    Abort,
}

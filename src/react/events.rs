//! 编排过程事件：用于控制台 / 流式前端展示阶段、工具调用、观察与回复

use serde::Serialize;

use crate::core::AgentPhase;

/// 单轮过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 状态机阶段变化
    PhaseChanged { phase: AgentPhase },
    /// 步数更新（已执行的工具调用数）
    StepUpdate { step: usize, max_steps: usize },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        tool: String,
        success: bool,
        preview: String,
    },
    /// 错误恢复动作（RetryAfter / RetryWithPrompt 等）
    Recovery { action: String, detail: String },
    /// 最终回复
    MessageDone { message: String },
    Error { text: String },
}

//! 单轮编排的状态机
//!
//! `Idle → Thinking → [ExecutingTool → Thinking]* → Completed | Error`。
//! Completed / Error 为终止态；非法转换返回 `AgentError::IllegalTransition`。

use serde::Serialize;

use crate::core::AgentError;

/// Agent 阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Idle,
    /// 等待规划结果
    Thinking,
    ExecutingTool,
    Completed,
    Error,
}

impl AgentPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentPhase::Completed | AgentPhase::Error)
    }

    pub fn can_transition_to(self, to: AgentPhase) -> bool {
        use AgentPhase::*;
        match (self, to) {
            (Idle, Thinking)
            | (Thinking, ExecutingTool)
            | (ExecutingTool, Thinking)
            | (Thinking, Completed) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }

    /// 校验并执行一次状态转换
    pub fn transition(self, to: AgentPhase) -> Result<AgentPhase, AgentError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(AgentError::IllegalTransition { from: self, to })
        }
    }
}

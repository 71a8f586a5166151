//! 规划与控制循环：Planner、上下文收集、过程事件、单轮主循环

pub mod context;
pub mod events;
pub mod loop_;
pub mod planner;

pub use context::{ContextGatherer, WorkspaceContext};
pub use events::AgentEvent;
pub use loop_::{run_turn, StopReason, TurnBudget, TurnOutcome, TurnRunner};
pub use planner::{parse_llm_output, Planner, PlannerOutput, ToolCall, DEFAULT_SYSTEM_PROMPT};

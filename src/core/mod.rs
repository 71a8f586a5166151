//! 核心编排层：错误与恢复、状态机、会话监管、编排器与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use builder::AgentBuilder;
pub use error::{AgentError, RecoveryAction};
pub use orchestrator::{Orchestrator, SessionContext, TurnMetadata, TurnResponse};
pub use recovery::RecoveryEngine;
pub use session_supervisor::{SessionSupervisor, SessionTurn};
pub use state::AgentPhase;

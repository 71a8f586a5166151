//! 编排器：对上层暴露的唯一入口
//!
//! process_turn：加载会话历史 -> 收集工作区上下文 -> 拼 system prompt -> 控制循环 -> 持久化历史。
//! 每个工具步骤完成后立即写动作日志，变更类步骤成功时失效该用户的上下文缓存。
//! 同一会话的轮次由 SessionSupervisor 串行化；任何失败都以 success=false 的 TurnResponse 返回，不会向上抛错。

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, RecoveryEngine, SessionSupervisor};
use crate::ledger::{classify_action, ActionLedger, ActionType, AgentActionRecord};
use crate::memory::{ConversationMemoryManager, Message};
use crate::react::{run_turn, AgentEvent, ContextGatherer, Planner, TurnBudget, TurnRunner};
use crate::store::Database;
use crate::tools::{ToolCallStep, ToolContext, ToolExecutor};

/// 调用方身份与会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: String,
    pub user_role: String,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        user_role: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            user_role: user_role.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnMetadata {
    /// 本轮用到的工具（去重，按首次调用顺序）
    pub tools_used: Vec<String>,
    pub context_gathered: Vec<String>,
    pub stop_reason: String,
    pub steps_executed: usize,
}

/// 单轮的对外返回
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResponse {
    pub message: String,
    pub steps: Vec<ToolCallStep>,
    pub success: bool,
    pub total_execution_time_ms: u64,
    pub metadata: TurnMetadata,
}

pub struct Orchestrator {
    pub(crate) planner: Planner,
    pub(crate) executor: ToolExecutor,
    pub(crate) recovery: RecoveryEngine,
    pub(crate) memory: ConversationMemoryManager,
    pub(crate) ledger: ActionLedger,
    pub(crate) context: ContextGatherer,
    pub(crate) supervisor: SessionSupervisor,
    pub(crate) store: Arc<Database>,
    pub(crate) budget: TurnBudget,
}

impl Orchestrator {
    pub async fn process_turn(&self, session: &SessionContext, message: &str) -> TurnResponse {
        self.process_turn_with_events(session, message, None).await
    }

    pub async fn process_turn_with_events(
        &self,
        session: &SessionContext,
        message: &str,
        event_tx: Option<&UnboundedSender<AgentEvent>>,
    ) -> TurnResponse {
        let start = Instant::now();
        let _turn = self.supervisor.acquire(&session.session_id).await;
        tracing::info!(session_id = %session.session_id, user_id = %session.user_id, "turn started");

        let history = self
            .memory
            .load_conversation(&session.session_id)
            .unwrap_or_else(|e| {
                tracing::warn!(session_id = %session.session_id, error = %e, "history unavailable, starting fresh");
                Vec::new()
            });

        let (context_prompt, context_gathered) =
            match self.context.gather(&session.user_id, &self.store) {
                Ok(ws) => (Some(ws.to_prompt()), ws.keys()),
                Err(e) => {
                    tracing::warn!(error = %e, "context gathering failed");
                    (None, Vec::new())
                }
            };
        let system = self
            .planner
            .build_system_prompt(&self.executor.definitions(), context_prompt.as_deref());

        let mut working = history.clone();
        working.push(Message::user(message));

        let ctx = ToolContext::new(
            session.user_id.clone(),
            session.user_role.clone(),
            session.session_id.clone(),
            self.store.clone(),
        );
        let hook = |step: &ToolCallStep| self.after_step(session, step);
        let mut runner = TurnRunner::new(&self.planner, &self.executor, &self.recovery, self.budget)
            .with_step_hook(&hook);
        if let Some(tx) = event_tx {
            runner = runner.with_event_tx(tx);
        }
        let outcome = run_turn(&runner, &system, working, &ctx).await;

        let assistant = Message::assistant(outcome.message.clone()).with_metadata(json!({
            "steps": outcome.steps,
            "success": outcome.success,
            "stop_reason": outcome.stop_reason.as_str(),
        }));
        let mut turns = history;
        turns.push(Message::user(message));
        turns.push(assistant);
        if let Err(e) = self
            .memory
            .save_conversation(&session.session_id, &session.user_id, &turns)
        {
            tracing::error!(session_id = %session.session_id, error = %e, "failed to persist conversation");
        }

        let mut tools_used: Vec<String> = Vec::new();
        for step in &outcome.steps {
            if !tools_used.contains(&step.tool_name) {
                tools_used.push(step.tool_name.clone());
            }
        }
        TurnResponse {
            metadata: TurnMetadata {
                tools_used,
                context_gathered,
                stop_reason: outcome.stop_reason.as_str().to_string(),
                steps_executed: outcome.steps.len(),
            },
            message: outcome.message,
            steps: outcome.steps,
            success: outcome.success,
            total_execution_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn after_step(&self, session: &SessionContext, step: &ToolCallStep) {
        if let Err(e) = self
            .ledger
            .record_action(&session.session_id, &session.user_id, step)
        {
            tracing::error!(tool = %step.tool_name, error = %e, "failed to record action");
        }
        let mutating = matches!(
            classify_action(&step.tool_name),
            ActionType::Create | ActionType::Update | ActionType::Delete
        );
        if mutating && step.result.success() {
            self.context.invalidate(&session.user_id);
        }
    }

    /// 撤销一条动作；成功返回 true
    pub fn undo_action(&self, action_id: &str, user_id: &str) -> Result<bool, AgentError> {
        self.ledger.undo(action_id, user_id)?;
        self.context.invalidate(user_id);
        Ok(true)
    }

    pub fn list_reversible_actions(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Vec<AgentActionRecord>, AgentError> {
        self.ledger.list_reversible_actions(session_id, user_id)
    }

    /// 会话已持久化的历史
    pub fn history(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        self.memory.load_conversation(session_id)
    }

    pub fn clear_history(&self, session_id: &str) -> Result<(), AgentError> {
        self.memory.clear_conversation(session_id)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.executor.tool_names()
    }

    pub fn store(&self) -> &Arc<Database> {
        &self.store
    }

    /// LLM 累计 token 使用：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.planner.token_usage()
    }
}

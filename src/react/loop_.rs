//! 单轮控制循环
//!
//! Plan -> Act (Tool) -> Observe -> 下一轮 Plan，直到 LLM 给出最终回复或预算耗尽。
//! 规划失败交给 RecoveryEngine：传输错误退避重试，格式错误注入纠正提示重试，两者共用同一重试额度；
//! 步数或墙钟预算耗尽时优雅终止并汇总已完成的步骤。工具失败只是观察结果，不会中止本轮。

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, AgentPhase, RecoveryAction, RecoveryEngine};
use crate::memory::Message;
use crate::react::{parse_llm_output, AgentEvent, Planner, PlannerOutput};
use crate::tools::{ToolCallStep, ToolContext, ToolExecutor};

/// 工具结果写回工作历史时的最大字符数
const OBSERVATION_MAX_CHARS: usize = 2_000;
/// Observation 事件预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 单轮预算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnBudget {
    pub max_steps: usize,
    pub max_duration: Duration,
}

/// 本轮结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    FinalAnswer,
    MaxSteps,
    TimeBudget,
    PlanningFailed,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::FinalAnswer => "final_answer",
            StopReason::MaxSteps => "max_steps",
            StopReason::TimeBudget => "time_budget",
            StopReason::PlanningFailed => "planning_failed",
        }
    }
}

/// 单轮结果
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub message: String,
    pub steps: Vec<ToolCallStep>,
    pub success: bool,
    pub stop_reason: StopReason,
    pub phase: AgentPhase,
    pub elapsed: Duration,
}

/// 每个工具步骤完成后的回调（写动作日志、失效缓存等）
pub type StepHook<'a> = &'a (dyn Fn(&ToolCallStep) + Send + Sync);

/// 单轮运行所需的协作者
pub struct TurnRunner<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub recovery: &'a RecoveryEngine,
    pub budget: TurnBudget,
    pub event_tx: Option<&'a UnboundedSender<AgentEvent>>,
    pub on_step: Option<StepHook<'a>>,
}

impl<'a> TurnRunner<'a> {
    pub fn new(
        planner: &'a Planner,
        executor: &'a ToolExecutor,
        recovery: &'a RecoveryEngine,
        budget: TurnBudget,
    ) -> Self {
        Self {
            planner,
            executor,
            recovery,
            budget,
            event_tx: None,
            on_step: None,
        }
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<AgentEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_step_hook(mut self, hook: StepHook<'a>) -> Self {
        self.on_step = Some(hook);
        self
    }

    fn send(&self, ev: AgentEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn enter(&self, phase: &mut AgentPhase, to: AgentPhase) {
        match phase.transition(to) {
            Ok(next) => {
                *phase = next;
                self.send(AgentEvent::PhaseChanged { phase: next });
            }
            Err(e) => tracing::error!(error = %e, "phase transition rejected"),
        }
    }
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 已完成步骤的简短汇总（预算耗尽或规划失败时告知用户）
fn summarize_progress(steps: &[ToolCallStep]) -> String {
    if steps.is_empty() {
        return "No actions were completed.".to_string();
    }
    let lines: Vec<String> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let outcome = if s.result.success() {
                s.result.message().unwrap_or("ok").to_string()
            } else {
                format!("failed: {}", s.result.error().unwrap_or("unknown error"))
            };
            format!("{}. {} - {}", i + 1, s.tool_name, outcome)
        })
        .collect();
    format!("Completed so far:\n{}", lines.join("\n"))
}

/// 执行一轮：history 为已有对话加本轮用户消息
pub async fn run_turn(
    runner: &TurnRunner<'_>,
    system: &str,
    history: Vec<Message>,
    ctx: &ToolContext,
) -> TurnOutcome {
    let start = Instant::now();
    let budget = runner.budget;
    let mut phase = AgentPhase::Idle;
    let mut working = history;
    let mut steps: Vec<ToolCallStep> = Vec::new();
    let mut attempt: u32 = 0;

    runner.enter(&mut phase, AgentPhase::Thinking);

    let (message, success, stop_reason) = loop {
        runner.send(AgentEvent::StepUpdate {
            step: steps.len(),
            max_steps: budget.max_steps,
        });

        let remaining = budget.max_duration.saturating_sub(start.elapsed());
        let exhausted = if steps.len() >= budget.max_steps {
            Some((StopReason::MaxSteps, format!("step limit of {} reached", budget.max_steps)))
        } else if remaining.is_zero() {
            Some((
                StopReason::TimeBudget,
                format!("time budget of {}s exhausted", budget.max_duration.as_secs()),
            ))
        } else {
            None
        };
        if let Some((reason, detail)) = exhausted {
            break budget_stop(runner, reason, detail, &steps);
        }

        let planned = tokio::time::timeout(remaining, runner.planner.plan(system, &working)).await;
        let raw = match planned {
            Err(_) => {
                let detail = format!("time budget of {}s exhausted", budget.max_duration.as_secs());
                break budget_stop(runner, StopReason::TimeBudget, detail, &steps);
            }
            Ok(Ok(raw)) if raw.trim().is_empty() => {
                Err(AgentError::PlanningTransport(crate::llm::LlmError::EmptyResponse))
            }
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => Err(e),
        };

        let parsed = raw.and_then(|raw| parse_llm_output(&raw).map(|out| (raw, out)));
        let (raw, output) = match parsed {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, attempt, "planning failed");
                match runner.recovery.handle(&err, attempt) {
                    RecoveryAction::RetryAfter(delay) => {
                        runner.send(AgentEvent::Recovery {
                            action: "retry_after".into(),
                            detail: format!("{err}; retrying in {}ms", delay.as_millis()),
                        });
                        let remaining = budget.max_duration.saturating_sub(start.elapsed());
                        tokio::time::sleep(delay.min(remaining)).await;
                        attempt += 1;
                        continue;
                    }
                    RecoveryAction::RetryWithPrompt(prompt) => {
                        runner.send(AgentEvent::Recovery {
                            action: "retry_with_prompt".into(),
                            detail: err.to_string(),
                        });
                        working.push(Message::user(prompt));
                        attempt += 1;
                        continue;
                    }
                    RecoveryAction::Stop(detail) => {
                        break (
                            format!("I had to stop: {detail}.\n\n{}", summarize_progress(&steps)),
                            false,
                            StopReason::PlanningFailed,
                        );
                    }
                    RecoveryAction::Abort => {
                        runner.send(AgentEvent::Error {
                            text: err.to_string(),
                        });
                        let message = format!(
                            "Sorry, I couldn't complete your request because the planning service failed ({err}). {}",
                            summarize_progress(&steps)
                        );
                        break (message, false, StopReason::PlanningFailed);
                    }
                }
            }
        };

        match output {
            PlannerOutput::Response(text) => break (text, true, StopReason::FinalAnswer),
            PlannerOutput::ToolCall(call) => {
                attempt = 0;
                runner.enter(&mut phase, AgentPhase::ExecutingTool);
                runner.send(AgentEvent::ToolCall {
                    tool: call.tool.clone(),
                    args: call.args.clone(),
                });
                working.push(Message::assistant(raw));

                let step = runner.executor.execute(&call.tool, call.args, ctx).await;
                let observation = step.result.to_observation(OBSERVATION_MAX_CHARS);
                runner.send(AgentEvent::Observation {
                    tool: step.tool_name.clone(),
                    success: step.result.success(),
                    preview: preview(&observation, OBSERVATION_PREVIEW_CHARS),
                });
                working.push(Message::tool(format!("{}: {}", step.tool_name, observation)));
                if let Some(hook) = runner.on_step {
                    hook(&step);
                }
                steps.push(step);
                runner.enter(&mut phase, AgentPhase::Thinking);
            }
        }
    };

    let terminal = if stop_reason == StopReason::PlanningFailed {
        AgentPhase::Error
    } else {
        AgentPhase::Completed
    };
    runner.enter(&mut phase, terminal);
    if success {
        runner.send(AgentEvent::MessageDone {
            message: message.clone(),
        });
    }

    let elapsed = start.elapsed();
    tracing::info!(
        steps = steps.len(),
        success,
        stop_reason = stop_reason.as_str(),
        elapsed_ms = elapsed.as_millis() as u64,
        "turn finished"
    );
    TurnOutcome {
        message,
        steps,
        success,
        stop_reason,
        phase,
        elapsed,
    }
}

fn budget_stop(
    runner: &TurnRunner<'_>,
    reason: StopReason,
    detail: String,
    steps: &[ToolCallStep],
) -> (String, bool, StopReason) {
    let action = runner
        .recovery
        .handle(&AgentError::BudgetExceeded(detail.clone()), 0);
    runner.send(AgentEvent::Recovery {
        action: "stop".into(),
        detail: detail.clone(),
    });
    tracing::warn!(?action, reason = reason.as_str(), "turn budget exhausted");
    (
        format!(
            "I stopped before finishing because the {detail}. {}",
            summarize_progress(steps)
        ),
        false,
        reason,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient, RetryConfig};
    use crate::store::Database;
    use crate::tools::{Tool, ToolRegistry, ToolResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        order: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "records invocation order"
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            self.order.lock().unwrap().push(self.name.to_string());
            Ok(ToolResult::ok(json!({"tool": self.name})))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("u1", "manager", "s1", Arc::new(Database::open_in_memory().unwrap()))
    }

    fn executor(order: Arc<Mutex<Vec<String>>>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Recorder { name: "tool_a", order: order.clone() }).unwrap();
        registry.register(Recorder { name: "tool_b", order }).unwrap();
        ToolExecutor::new(registry, 5)
    }

    fn recovery() -> RecoveryEngine {
        RecoveryEngine::new(RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 4,
        })
    }

    fn budget(max_steps: usize) -> TurnBudget {
        TurnBudget {
            max_steps,
            max_duration: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn test_steps_follow_issuance_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "tool_a", "args": {}}"#,
            r#"{"tool": "tool_b", "args": {}}"#,
            "All done.",
        ]));
        let planner = Planner::new(llm, "sys");
        let exec = executor(order.clone());
        let recovery = recovery();
        let hooked = AtomicUsize::new(0);
        let hook = |_: &ToolCallStep| {
            hooked.fetch_add(1, Ordering::SeqCst);
        };
        let runner = TurnRunner::new(&planner, &exec, &recovery, budget(8)).with_step_hook(&hook);

        let out = run_turn(&runner, "sys", vec![Message::user("do A then B")], &ctx()).await;
        assert!(out.success);
        assert_eq!(out.message, "All done.");
        assert_eq!(out.phase, AgentPhase::Completed);
        let names: Vec<&str> = out.steps.iter().map(|s| s.tool_name.as_str()).collect();
        assert_eq!(names, vec!["tool_a", "tool_b"]);
        assert_eq!(*order.lock().unwrap(), vec!["tool_a", "tool_b"]);
        assert_eq!(hooked.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_step_bound_forces_stop() {
        let llm = Arc::new(MockLlmClient::new().with_fallback(r#"{"tool": "tool_a", "args": {}}"#));
        let planner = Planner::new(llm.clone(), "sys");
        let exec = executor(Arc::new(Mutex::new(Vec::new())));
        let recovery = recovery();
        let runner = TurnRunner::new(&planner, &exec, &recovery, budget(5));

        let out = run_turn(&runner, "sys", vec![Message::user("loop")], &ctx()).await;
        assert_eq!(out.steps.len(), 5);
        assert_eq!(llm.call_count(), 5);
        assert!(!out.success);
        assert_eq!(out.stop_reason, StopReason::MaxSteps);
        assert_eq!(out.phase, AgentPhase::Completed);
        assert!(out.message.contains("Completed so far"));
    }

    #[tokio::test]
    async fn test_time_budget_stops_slow_planner() {
        let llm = Arc::new(MockLlmClient::new().with_latency(Duration::from_millis(200)));
        let planner = Planner::new(llm, "sys");
        let exec = executor(Arc::new(Mutex::new(Vec::new())));
        let recovery = recovery();
        let runner = TurnRunner::new(
            &planner,
            &exec,
            &recovery,
            TurnBudget {
                max_steps: 5,
                max_duration: Duration::from_millis(20),
            },
        );
        let out = run_turn(&runner, "sys", vec![Message::user("hi")], &ctx()).await;
        assert!(!out.success);
        assert_eq!(out.stop_reason, StopReason::TimeBudget);
    }

    #[tokio::test]
    async fn test_transport_error_retried_then_succeeds() {
        let llm = Arc::new(MockLlmClient::with_results(vec![
            Err(LlmError::Network("reset".into())),
            Ok("Recovered answer".to_string()),
        ]));
        let planner = Planner::new(llm.clone(), "sys");
        let exec = executor(Arc::new(Mutex::new(Vec::new())));
        let recovery = recovery();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let runner = TurnRunner::new(&planner, &exec, &recovery, budget(5)).with_event_tx(&tx);

        let out = run_turn(&runner, "sys", vec![Message::user("hi")], &ctx()).await;
        assert!(out.success);
        assert_eq!(out.message, "Recovered answer");
        assert_eq!(llm.call_count(), 2);

        drop(tx);
        let mut saw_retry = false;
        while let Some(ev) = rx.recv().await {
            if matches!(&ev, AgentEvent::Recovery { action, .. } if action == "retry_after") {
                saw_retry = true;
            }
        }
        assert!(saw_retry);
    }

    #[tokio::test]
    async fn test_exhausted_retries_end_in_error_phase() {
        let llm = Arc::new(MockLlmClient::with_results(vec![
            Err(LlmError::Timeout),
            Err(LlmError::Timeout),
            Err(LlmError::Timeout),
        ]));
        let planner = Planner::new(llm.clone(), "sys");
        let exec = executor(Arc::new(Mutex::new(Vec::new())));
        let recovery = recovery();
        let runner = TurnRunner::new(&planner, &exec, &recovery, budget(5));

        let out = run_turn(&runner, "sys", vec![Message::user("hi")], &ctx()).await;
        assert!(!out.success);
        assert_eq!(out.phase, AgentPhase::Error);
        assert_eq!(out.stop_reason, StopReason::PlanningFailed);
        assert!(out.message.starts_with("Sorry"));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_malformed_output_gets_correction_prompt() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "tool_a", "args": {"x": }"#,
            r#"{"tool": "tool_a", "args": {}}"#,
            "Done",
        ]));
        let planner = Planner::new(llm.clone(), "sys");
        let exec = executor(Arc::new(Mutex::new(Vec::new())));
        let recovery = recovery();
        let runner = TurnRunner::new(&planner, &exec, &recovery, budget(5));

        let out = run_turn(&runner, "sys", vec![Message::user("hi")], &ctx()).await;
        assert!(out.success);
        assert_eq!(out.steps.len(), 1);
        let requests = llm.requests();
        let second_request = &requests[1];
        assert!(second_request
            .last()
            .unwrap()
            .content
            .contains("not a valid tool call"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "does_not_exist", "args": {}}"#,
            r#"{"tool": "tool_a", "args": {}}"#,
            "Recovered",
        ]));
        let planner = Planner::new(llm.clone(), "sys");
        let exec = executor(Arc::new(Mutex::new(Vec::new())));
        let recovery = recovery();
        let runner = TurnRunner::new(&planner, &exec, &recovery, budget(5));

        let out = run_turn(&runner, "sys", vec![Message::user("hi")], &ctx()).await;
        assert!(out.success);
        assert_eq!(out.steps.len(), 2);
        assert!(!out.steps[0].result.success());
        assert!(out.steps[1].result.success());
        let requests = llm.requests();
        let observation = &requests[1].last().unwrap().content;
        assert!(observation.contains("Unknown tool: does_not_exist"));
    }
}

//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时。execute(tool_name, args, ctx) 依次做：查找工具、参数校验、
//! 在超时内执行 handler；未知工具、校验失败、handler 返回错误、panic、超时都被收敛为失败的 ToolResult，
//! 不会向上抛出。每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{Tool, ToolCallStep, ToolContext, ToolDefinition, ToolRegistry, ToolResult};

/// 工具执行器：对每次调用施加超时，并把所有异常收敛为失败结果
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// 执行指定工具，总是返回一条 ToolCallStep（parameters 为校验后的参数）
    pub async fn execute(&self, tool_name: &str, args: Value, ctx: &ToolContext) -> ToolCallStep {
        let start = Instant::now();
        let preview = args_preview(&args);
        let (result, outcome, parameters) = self.run(tool_name, args, ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "session_id": ctx.session_id,
            "ok": result.success(),
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        ToolCallStep {
            tool_name: tool_name.to_string(),
            parameters,
            result,
            execution_time_ms: duration_ms,
        }
    }

    async fn run(
        &self,
        tool_name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> (ToolResult, &'static str, Value) {
        let fail = |err: AgentError| ToolResult::failure(err.to_string());

        let Some(tool) = self.registry.get(tool_name) else {
            let err = AgentError::UnknownTool(tool_name.to_string());
            return (fail(err), "unknown_tool", args);
        };

        let validated = match tool.validate(&args) {
            Ok(v) => v,
            Err(e) => {
                let err = AgentError::Validation(format!("{tool_name}: {e}"));
                return (fail(err), "invalid_args", args);
            }
        };

        let fut = AssertUnwindSafe(tool.execute(validated.clone(), ctx)).catch_unwind();
        let (result, outcome) = match timeout(self.timeout, fut).await {
            Ok(Ok(Ok(result))) => {
                let outcome = if result.success() { "ok" } else { "error" };
                (result, outcome)
            }
            Ok(Ok(Err(e))) => (fail(AgentError::ToolExecution(format!("{tool_name}: {e}"))), "error"),
            Ok(Err(panic)) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(tool = %tool_name, %detail, "tool handler panicked");
                let err = AgentError::ToolExecution(format!("{tool_name} crashed: {detail}"));
                (fail(err), "panic")
            }
            Err(_) => {
                let err = AgentError::ToolTimeout(format!(
                    "{tool_name} timed out after {}s",
                    self.timeout.as_secs_f64()
                ));
                (fail(err), "timeout")
            }
        };
        (result, outcome, validated)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.list_definitions()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use crate::tools::{ListCampaignsTool, TypedToolAdaptor};
    use std::sync::Arc;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "count"
        }

        fn description(&self) -> &str {
            "counts calls"
        }

        fn validate(&self, args: &Value) -> Result<Value, String> {
            match args.get("n").and_then(Value::as_u64) {
                Some(_) => Ok(args.clone()),
                None => Err("missing field `n`".into()),
            }
        }

        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::ok(args))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "panics"
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            panic!("kaboom");
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolResult::ok(Value::Null))
        }
    }

    fn ctx() -> ToolContext {
        let db = Arc::new(Database::open_in_memory().unwrap());
        ToolContext::new("u1", "manager", "s1", db)
    }

    fn executor(calls: Arc<AtomicUsize>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(CountingTool { calls }).unwrap();
        registry.register(PanickingTool).unwrap();
        registry.register(SlowTool).unwrap();
        ToolExecutor::with_timeout(registry, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failed_step() {
        let exec = executor(Arc::new(AtomicUsize::new(0)));
        let step = exec.execute("nope", json!({}), &ctx()).await;
        assert!(!step.result.success());
        assert!(step.result.error().unwrap().contains("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn test_invalid_args_skip_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let exec = executor(calls.clone());
        let step = exec.execute("count", json!({"x": 1}), &ctx()).await;
        assert!(!step.result.success());
        assert!(step.result.error().unwrap().contains("missing field `n`"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let step = exec.execute("count", json!({"n": 2}), &ctx()).await;
        assert!(step.result.success());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(step.parameters, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_panic_and_timeout_are_contained() {
        let exec = executor(Arc::new(AtomicUsize::new(0)));
        let step = exec.execute("explode", json!({}), &ctx()).await;
        assert!(!step.result.success());
        assert!(step.result.error().unwrap().contains("kaboom"));

        let step = exec.execute("slow", json!({}), &ctx()).await;
        assert!(!step.result.success());
        assert!(step.result.error().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_step_records_validated_parameters() {
        let mut registry = ToolRegistry::new();
        registry.register(TypedToolAdaptor::new(ListCampaignsTool)).unwrap();
        let exec = ToolExecutor::new(registry, 5);

        let step = exec.execute("list_campaigns", Value::Null, &ctx()).await;
        assert!(step.result.success());
        assert_eq!(step.parameters, json!({}));
    }

    #[tokio::test]
    async fn test_failures_use_error_taxonomy_text() {
        let exec = executor(Arc::new(AtomicUsize::new(0)));
        let step = exec.execute("count", json!({}), &ctx()).await;
        assert!(step.result.error().unwrap().starts_with("Invalid arguments: count:"));

        let step = exec.execute("explode", json!({}), &ctx()).await;
        assert!(step.result.error().unwrap().starts_with("Tool execution failed: explode crashed"));

        let step = exec.execute("slow", json!({}), &ctx()).await;
        assert!(step.result.error().unwrap().starts_with("Tool timeout: slow timed out"));
    }
}

//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / validate / execute），
//! 由 ToolRegistry 按名注册与查找；同名重复注册返回错误，不会静默覆盖。
//! list_definitions 生成每轮提供给 Planner 的工具菜单。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::{ToolContext, ToolResult};

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、参数校验、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 判断何时使用）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 校验原始参数，返回规范化后的参数；失败时返回校验详情，handler 不会被调用
    fn validate(&self, args: &Value) -> Result<Value, String> {
        Ok(args.clone())
    }

    /// 执行工具（args 已通过 validate）
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String>;
}

/// Planner 可消费的工具定义
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        tracing::debug!(tool = %name, "tool registered");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 按名称排序的工具名
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 全部工具定义（按名称排序，保证每轮提示词稳定）
    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// 工具菜单 JSON，拼入 system prompt
    pub fn to_schema_json(&self) -> String {
        serde_json::to_string_pretty(&self.list_definitions()).unwrap_or_else(|_| "[]".to_string())
    }
}

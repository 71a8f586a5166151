//! Planner：规划提示词拼装与 Tool Call 解析
//!
//! 调用 LLM 得到最终回复或 JSON Tool Call；parse_llm_output 从文本中提取 JSON 并解析为 ToolCall 或直接回复。
//! 看起来像 tool call 却无法解析的输出返回 MalformedPlan，由控制循环注入纠正提示后重试。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::{tool_call_schema_json, ToolDefinition};

/// 默认 system prompt（KOL / 活动管理助手）
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the operations assistant of an influencer-marketing agency. \
You help account managers find KOLs (influencers), manage clients and campaigns, draft outreach and analyse results.

Work step by step. At each step either:
1. call exactly ONE tool by replying with a single JSON object and nothing else:
   {\"tool\": \"<tool name>\", \"args\": {<arguments matching the tool's parameters>}}
2. or, when you have everything you need, reply to the user in plain text (no JSON).

Rules:
- Only use tools from the tool list. Use ids returned by earlier tool results; never invent ids.
- If a tool fails, read the error and fix the arguments or choose another approach.
- Never send a message to a KOL unless the user explicitly asked you to send it.
- Keep final answers short and concrete: mention names, counts and ids the user may need.";

/// LLM 返回的 Tool Call（{"tool": "search_kols", "args": {...}}，兼容 name / arguments 写法）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(alias = "name")]
    pub tool: String,
    #[serde(default, alias = "arguments", alias = "parameters")]
    pub args: Value,
}

/// Planner 输出
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 直接回复用户（本轮结束）
    Response(String),
    /// 需要执行工具
    ToolCall(ToolCall),
}

/// 文本是否在尝试发起 tool call
fn looks_like_tool_call(text: &str) -> bool {
    text.contains("```json") || text.contains("\"tool\"") || text.contains("\"arguments\"")
}

/// 解析 LLM 输出：若含有效 JSON 且 tool 非空则为 ToolCall，否则为 Response
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();

    // 尝试提取 JSON 块（```json ... ``` 或纯 JSON）
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            return Ok(PlannerOutput::Response(trimmed.to_string()));
        }
    } else {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    };

    let mut parsed: ToolCall = match serde_json::from_str(json_str) {
        Ok(call) => call,
        Err(e) if looks_like_tool_call(trimmed) => {
            return Err(AgentError::MalformedPlan(format!("{e}: {json_str}")));
        }
        // 普通文本里恰好带了花括号
        Err(_) => return Ok(PlannerOutput::Response(trimmed.to_string())),
    };

    if parsed.tool.trim().is_empty() {
        return Err(AgentError::MalformedPlan(format!("empty tool name: {json_str}")));
    }
    // OpenAI 风格的 arguments 是 JSON 字符串
    if let Value::String(raw) = &parsed.args {
        parsed.args = serde_json::from_str(raw)
            .map_err(|e| AgentError::MalformedPlan(format!("arguments are not JSON: {e}")))?;
    }
    if parsed.args.is_null() {
        parsed.args = Value::Object(Default::default());
    }
    parsed.tool = parsed.tool.trim().to_string();
    Ok(PlannerOutput::ToolCall(parsed))
}

/// Planner：持有 LLM 与基础 system prompt
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn base_system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 基础 prompt + 工具菜单 + 调用格式 schema + 工作区上下文
    pub fn build_system_prompt(&self, tools: &[ToolDefinition], context: Option<&str>) -> String {
        let menu = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());
        let mut system = format!(
            "{}\n\n## Available tools\n```json\n{}\n```\n\n## Tool call JSON Schema\n```json\n{}\n```",
            self.system_prompt,
            menu,
            tool_call_schema_json()
        );
        if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
            system.push_str("\n\n## Workspace context\n");
            system.push_str(ctx);
        }
        system
    }

    /// 拼上 system 后调用 LLM；传输错误映射为 PlanningTransport
    pub async fn plan(&self, system: &str, history: &[Message]) -> Result<String, AgentError> {
        let mut full_messages = Vec::with_capacity(history.len() + 1);
        full_messages.push(Message::system(system.to_string()));
        full_messages.extend_from_slice(history);
        Ok(self.llm.complete(&full_messages).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    #[test]
    fn test_plain_text_is_response() {
        assert_eq!(
            parse_llm_output("  Found 3 KOLs for you. ").unwrap(),
            PlannerOutput::Response("Found 3 KOLs for you.".into())
        );
        // 文本中的花括号不是 tool call
        assert!(matches!(
            parse_llm_output("Use the {name} placeholder").unwrap(),
            PlannerOutput::Response(_)
        ));
    }

    #[test]
    fn test_tool_call_variants() {
        let plain = parse_llm_output(r#"{"tool": "search_kols", "args": {"country": "South Korea"}}"#)
            .unwrap();
        assert_eq!(
            plain,
            PlannerOutput::ToolCall(ToolCall {
                tool: "search_kols".into(),
                args: json!({"country": "South Korea"}),
            })
        );

        let fenced = parse_llm_output(
            "Let me search.\n```json\n{\"name\": \"list_campaigns\", \"arguments\": \"{\\\"limit\\\": 5}\"}\n```",
        )
        .unwrap();
        assert_eq!(
            fenced,
            PlannerOutput::ToolCall(ToolCall {
                tool: "list_campaigns".into(),
                args: json!({"limit": 5}),
            })
        );

        let no_args = parse_llm_output(r#"{"tool": "list_campaigns"}"#).unwrap();
        assert!(matches!(no_args, PlannerOutput::ToolCall(c) if c.args == json!({})));
    }

    #[test]
    fn test_broken_tool_call_is_malformed() {
        let err = parse_llm_output(r#"{"tool": "search_kols", "args": {"country": }"#).unwrap_err();
        assert!(matches!(err, AgentError::MalformedPlan(_)));
        let err = parse_llm_output(r#"{"tool": "", "args": {}}"#).unwrap_err();
        assert!(matches!(err, AgentError::MalformedPlan(_)));
    }

    #[tokio::test]
    async fn test_plan_prepends_system() {
        let llm = Arc::new(MockLlmClient::scripted(["done"]));
        let planner = Planner::new(llm.clone(), DEFAULT_SYSTEM_PROMPT);
        let defs = vec![ToolDefinition {
            name: "search_kols".into(),
            description: "search".into(),
            parameters: json!({"type": "object"}),
        }];
        let system = planner.build_system_prompt(&defs, Some("Campaigns: 2 draft"));
        assert!(system.contains("\"search_kols\""));
        assert!(system.contains("## Workspace context\nCampaigns: 2 draft"));

        let out = planner.plan(&system, &[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "done");
        let requests = llm.requests();
        let sent = &requests[0];
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].content, system);
    }
}

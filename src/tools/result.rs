//! 工具统一返回信封与单步记录

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 所有工具的统一返回：成功（可带 data / message）或失败（带 error），只能通过构造函数创建
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn ok_with_message(data: Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 供 Planner 阅读的一行摘要（data 截断到 max_chars）
    pub fn to_observation(&self, max_chars: usize) -> String {
        if !self.success {
            return format!("FAILED: {}", self.error.as_deref().unwrap_or("unknown error"));
        }
        let data = self
            .data
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();
        let data = if data.chars().count() > max_chars {
            format!("{}...[truncated]", data.chars().take(max_chars).collect::<String>())
        } else {
            data
        };
        match &self.message {
            Some(m) => format!("OK: {m} {data}"),
            None => format!("OK: {data}"),
        }
    }
}

/// 单次工具调用的完整记录（按发出顺序保存在本轮步骤列表中）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallStep {
    pub tool_name: String,
    pub parameters: Value,
    pub result: ToolResult,
    pub execution_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_never_mixes_fields() {
        let ok = serde_json::to_value(ToolResult::ok(json!({"id": 1}))).unwrap();
        assert_eq!(ok, json!({"success": true, "data": {"id": 1}}));

        let fail = serde_json::to_value(ToolResult::failure("nope")).unwrap();
        assert_eq!(fail, json!({"success": false, "error": "nope"}));
    }

    #[test]
    fn test_observation_truncates_data() {
        let r = ToolResult::ok_with_message(json!({"text": "x".repeat(50)}), "done");
        let obs = r.to_observation(10);
        assert!(obs.starts_with("OK: done "));
        assert!(obs.ends_with("...[truncated]"));
        assert_eq!(ToolResult::failure("boom").to_observation(10), "FAILED: boom");
    }
}

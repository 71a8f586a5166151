//! 动作日志与撤销
//!
//! 每个工具步骤都会按名称前缀归类（create / update / delete / search / generate / analyze / other），
//! 但只有白名单中的可撤销工具、且执行成功并能取出实体 ID 时才落库。撤销时在同一事务中执行补偿并标记
//! is_reversed，补偿失败则整体回滚，记录保持未撤销。

pub mod compensation;

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::store::{new_id, now_rfc3339, Database};
use crate::tools::ToolCallStep;

pub use compensation::Compensation;

/// 可撤销工具白名单：(工具名, 实体类型, 结果中实体 ID 字段)
pub const REVERSIBLE_TOOLS: &[(&str, &str, &str)] = &[
    ("create_campaign", "campaign", "campaign_id"),
    ("create_client", "client", "client_id"),
    ("add_kols_to_campaign", "campaign", "campaign_id"),
    ("update_campaign_status", "campaign", "campaign_id"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    Search,
    Generate,
    Analyze,
    Other,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Update => "update",
            ActionType::Delete => "delete",
            ActionType::Search => "search",
            ActionType::Generate => "generate",
            ActionType::Analyze => "analyze",
            ActionType::Other => "other",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "create" => ActionType::Create,
            "update" => ActionType::Update,
            "delete" => ActionType::Delete,
            "search" => ActionType::Search,
            "generate" => ActionType::Generate,
            "analyze" => ActionType::Analyze,
            _ => ActionType::Other,
        }
    }
}

/// 按工具名前缀归类；与是否可撤销无关
pub fn classify_action(tool_name: &str) -> ActionType {
    let prefix = tool_name.split('_').next().unwrap_or_default();
    match prefix {
        "create" | "add" => ActionType::Create,
        "update" => ActionType::Update,
        "delete" | "remove" => ActionType::Delete,
        "search" | "semantic" | "get" | "list" => ActionType::Search,
        "generate" => ActionType::Generate,
        "analyze" => ActionType::Analyze,
        _ => ActionType::Other,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentActionRecord {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub action_type: ActionType,
    pub tool_name: String,
    pub entity_type: String,
    pub entity_id: String,
    /// {"parameters": .., "result": ..}
    pub action_data: Value,
    pub is_reversible: bool,
    pub is_reversed: bool,
    pub created_at: String,
    pub reversed_at: Option<String>,
}

const COLUMNS: &str = "id, session_id, user_id, action_type, tool_name, entity_type, entity_id, \
                       action_data, is_reversible, is_reversed, created_at, reversed_at";

impl AgentActionRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let action_type: String = row.get(3)?;
        let data: String = row.get(7)?;
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            user_id: row.get(2)?,
            action_type: ActionType::parse(&action_type),
            tool_name: row.get(4)?,
            entity_type: row.get(5)?,
            entity_id: row.get(6)?,
            action_data: serde_json::from_str(&data).unwrap_or(Value::Null),
            is_reversible: row.get(8)?,
            is_reversed: row.get(9)?,
            created_at: row.get(10)?,
            reversed_at: row.get(11)?,
        })
    }
}

fn find_undoable(
    conn: &Connection,
    action_id: &str,
    user_id: &str,
) -> rusqlite::Result<Option<AgentActionRecord>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM agent_actions
             WHERE id = ?1 AND user_id = ?2 AND is_reversible = 1 AND is_reversed = 0"
        ),
        params![action_id, user_id],
        AgentActionRecord::from_row,
    )
    .optional()
}

/// 动作日志
pub struct ActionLedger {
    db: Arc<Database>,
}

impl ActionLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// 记录一个工具步骤；只有可撤销的成功步骤会落库并返回记录
    pub fn record_action(
        &self,
        session_id: &str,
        user_id: &str,
        step: &ToolCallStep,
    ) -> Result<Option<AgentActionRecord>, AgentError> {
        let action_type = classify_action(&step.tool_name);
        tracing::debug!(tool = %step.tool_name, action_type = action_type.as_str(), ok = step.result.success(), "action classified");

        let Some(&(_, entity_type, id_field)) = REVERSIBLE_TOOLS
            .iter()
            .find(|(name, _, _)| *name == step.tool_name)
        else {
            return Ok(None);
        };
        if !step.result.success() {
            return Ok(None);
        }
        let Some(entity_id) = step
            .result
            .data()
            .and_then(|d| d.get(id_field))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        else {
            tracing::warn!(tool = %step.tool_name, "reversible step without entity id, not recorded");
            return Ok(None);
        };

        let record = AgentActionRecord {
            id: new_id("act"),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            action_type,
            tool_name: step.tool_name.clone(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action_data: json!({
                "parameters": step.parameters,
                "result": step.result,
            }),
            is_reversible: true,
            is_reversed: false,
            created_at: now_rfc3339(),
            reversed_at: None,
        };
        let data = serde_json::to_string(&record.action_data)?;
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO agent_actions ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    record.id,
                    record.session_id,
                    record.user_id,
                    record.action_type.as_str(),
                    record.tool_name,
                    record.entity_type,
                    record.entity_id,
                    data,
                    record.is_reversible,
                    record.is_reversed,
                    record.created_at,
                    record.reversed_at,
                ],
            )
        })?;
        tracing::info!(action_id = %record.id, tool = %record.tool_name, entity_id = %record.entity_id, "reversible action recorded");
        Ok(Some(record))
    }

    /// 撤销：补偿与标记在同一事务中完成
    pub fn undo(&self, action_id: &str, user_id: &str) -> Result<AgentActionRecord, AgentError> {
        let record = self.db.with_tx(|tx| {
            let Some(mut record) = find_undoable(tx, action_id, user_id)? else {
                return Err(AgentError::UndoConflict(format!(
                    "no reversible, unreversed action {action_id} for this user"
                )));
            };
            Compensation::from_record(&record)?.apply(tx, user_id)?;

            let reversed_at = now_rfc3339();
            let updated = tx.execute(
                "UPDATE agent_actions SET is_reversed = 1, reversed_at = ?1
                 WHERE id = ?2 AND is_reversed = 0",
                params![reversed_at, action_id],
            )?;
            if updated != 1 {
                return Err(AgentError::UndoConflict(format!(
                    "action {action_id} was reversed concurrently"
                )));
            }
            record.is_reversed = true;
            record.reversed_at = Some(reversed_at);
            Ok(record)
        });
        match &record {
            Ok(r) => tracing::info!(action_id = %r.id, tool = %r.tool_name, "action undone"),
            Err(e) => tracing::warn!(%action_id, error = %e, "undo failed"),
        }
        record
    }

    /// 会话内未撤销的可撤销动作，最新的在前
    pub fn list_reversible_actions(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<Vec<AgentActionRecord>, AgentError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM agent_actions
                 WHERE session_id = ?1 AND user_id = ?2 AND is_reversible = 1 AND is_reversed = 0
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt.query_map(params![session_id, user_id], AgentActionRecord::from_row)?;
            rows.collect()
        })
    }
}

//! 补偿操作：每个可撤销工具对应一种反向操作
//!
//! 补偿只依据动作记录中保存的 parameters 与 result，永远不做更宽的匹配。

use rusqlite::Connection;
use serde_json::Value;

use crate::core::AgentError;
use crate::ledger::AgentActionRecord;
use crate::store::{campaigns, clients, CampaignStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    DeleteCampaign { campaign_id: String },
    DeleteClient { client_id: String },
    /// 只移除「既被请求、又被报告为新加入」的 KOL
    RemoveKols {
        campaign_id: String,
        kol_ids: Vec<String>,
    },
    RestoreStatus {
        campaign_id: String,
        status: CampaignStatus,
    },
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    v.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

impl Compensation {
    /// 由动作记录推导补偿；记录内容不完整时返回 UndoExecution
    pub fn from_record(record: &AgentActionRecord) -> Result<Self, AgentError> {
        let params = record.action_data.get("parameters");
        let data = record
            .action_data
            .get("result")
            .and_then(|r| r.get("data"));
        let missing =
            |what: &str| AgentError::UndoExecution(format!("action {} has no {what}", record.id));

        match record.tool_name.as_str() {
            "create_campaign" => Ok(Compensation::DeleteCampaign {
                campaign_id: record.entity_id.clone(),
            }),
            "create_client" => Ok(Compensation::DeleteClient {
                client_id: record.entity_id.clone(),
            }),
            "add_kols_to_campaign" => {
                let requested = string_list(params.and_then(|p| p.get("kol_ids")));
                let added = string_list(data.and_then(|d| d.get("added_kol_ids")));
                let kol_ids = requested
                    .into_iter()
                    .filter(|id| added.contains(id))
                    .collect();
                Ok(Compensation::RemoveKols {
                    campaign_id: record.entity_id.clone(),
                    kol_ids,
                })
            }
            "update_campaign_status" => {
                let status = data
                    .and_then(|d| d.get("previous_status"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| missing("previous_status"))?
                    .parse::<CampaignStatus>()
                    .map_err(AgentError::UndoExecution)?;
                Ok(Compensation::RestoreStatus {
                    campaign_id: record.entity_id.clone(),
                    status,
                })
            }
            other => Err(AgentError::UndoExecution(format!(
                "no compensation for tool {other}"
            ))),
        }
    }

    /// 执行补偿；删除已不存在的行不算失败
    pub fn apply(&self, conn: &Connection, user_id: &str) -> Result<(), AgentError> {
        let failed = |e: rusqlite::Error| AgentError::UndoExecution(e.to_string());
        match self {
            Compensation::DeleteCampaign { campaign_id } => {
                campaigns::delete(conn, campaign_id, user_id).map_err(failed)?;
            }
            Compensation::DeleteClient { client_id } => {
                let used = campaigns::count_for_client(conn, client_id, user_id).map_err(failed)?;
                if used > 0 {
                    return Err(AgentError::UndoExecution(format!(
                        "client {client_id} is still used by {used} campaign(s)"
                    )));
                }
                clients::delete(conn, client_id, user_id).map_err(failed)?;
            }
            Compensation::RemoveKols {
                campaign_id,
                kol_ids,
            } => {
                if campaigns::get(conn, campaign_id, user_id).map_err(failed)?.is_some() {
                    campaigns::remove_kols(conn, campaign_id, kol_ids).map_err(failed)?;
                }
            }
            Compensation::RestoreStatus {
                campaign_id,
                status,
            } => {
                let previous = campaigns::update_status(conn, campaign_id, user_id, *status)
                    .map_err(failed)?;
                if previous.is_none() {
                    return Err(AgentError::UndoExecution(format!(
                        "campaign {campaign_id} no longer exists"
                    )));
                }
            }
        }
        Ok(())
    }
}

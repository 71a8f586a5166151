//! 活动工具：创建、列表、状态变更、批量加入 KOL
//!
//! 所有操作只作用于 ctx.user_id 名下的活动。

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::store::{campaigns, clients, kols, new_id, now_rfc3339, Campaign, CampaignStatus};
use crate::tools::{ToolContext, ToolResult, TypedTool};

const MAX_KOLS_PER_CALL: usize = 100;

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{field} must be a date in YYYY-MM-DD format, got '{value}'"))
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateCampaignParams {
    pub name: String,
    /// Id of an existing client (see create_client)
    #[serde(default)]
    pub client_id: Option<String>,
    /// Total budget, must be >= 0
    #[serde(default)]
    pub budget: Option<f64>,
    /// YYYY-MM-DD
    #[serde(default)]
    pub start_date: Option<String>,
    /// YYYY-MM-DD, not before start_date
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub struct CreateCampaignTool;

#[async_trait]
impl TypedTool for CreateCampaignTool {
    type Params = CreateCampaignParams;

    fn name(&self) -> &'static str {
        "create_campaign"
    }

    fn description(&self) -> &str {
        "Create a new marketing campaign in draft status. Returns the new campaign_id."
    }

    fn check(&self, p: &CreateCampaignParams) -> Result<(), String> {
        if p.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if let Some(budget) = p.budget {
            if !budget.is_finite() || budget < 0.0 {
                return Err("budget must be a non-negative number".into());
            }
        }
        let start = p.start_date.as_deref().map(|d| parse_date("start_date", d)).transpose()?;
        let end = p.end_date.as_deref().map(|d| parse_date("end_date", d)).transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err("end_date must not be before start_date".into());
            }
        }
        Ok(())
    }

    async fn run(&self, p: CreateCampaignParams, ctx: &ToolContext) -> Result<ToolResult, String> {
        let campaign = Campaign {
            id: new_id("camp"),
            user_id: ctx.user_id.clone(),
            name: p.name.trim().to_string(),
            client_id: p.client_id.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            status: CampaignStatus::Draft,
            budget: p.budget,
            start_date: p.start_date.map(|d| d.trim().to_string()),
            end_date: p.end_date.map(|d| d.trim().to_string()),
            description: p.description,
            created_at: now_rfc3339(),
        };

        let client_found = ctx
            .store
            .with_conn(|conn| {
                if let Some(client_id) = &campaign.client_id {
                    if clients::get(conn, client_id, &ctx.user_id)?.is_none() {
                        return Ok(false);
                    }
                }
                campaigns::insert(conn, &campaign)?;
                Ok(true)
            })
            .map_err(|e| e.to_string())?;

        if !client_found {
            return Ok(ToolResult::failure(format!(
                "Client not found: {}",
                campaign.client_id.as_deref().unwrap_or_default()
            )));
        }
        tracing::info!(campaign_id = %campaign.id, "campaign created");
        Ok(ToolResult::ok_with_message(
            json!({ "campaign_id": campaign.id, "campaign": campaign }),
            format!("Created campaign {}", campaign.name),
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListCampaignsParams {
    #[serde(default)]
    pub status: Option<CampaignStatus>,
    /// 1..=50, default 20
    #[serde(default)]
    pub limit: Option<usize>,
}

pub struct ListCampaignsTool;

#[async_trait]
impl TypedTool for ListCampaignsTool {
    type Params = ListCampaignsParams;

    fn name(&self) -> &'static str {
        "list_campaigns"
    }

    fn description(&self) -> &str {
        "List your campaigns, newest first, optionally filtered by status."
    }

    fn check(&self, p: &ListCampaignsParams) -> Result<(), String> {
        match p.limit {
            Some(l) if l == 0 || l > 50 => Err("limit must be between 1 and 50".into()),
            _ => Ok(()),
        }
    }

    async fn run(&self, p: ListCampaignsParams, ctx: &ToolContext) -> Result<ToolResult, String> {
        let list = ctx
            .store
            .with_conn(|conn| campaigns::list(conn, &ctx.user_id, p.status, p.limit.unwrap_or(20)))
            .map_err(|e| e.to_string())?;
        let count = list.len();
        Ok(ToolResult::ok(json!({ "campaigns": list, "count": count })))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateStatusParams {
    pub campaign_id: String,
    pub status: CampaignStatus,
}

pub struct UpdateCampaignStatusTool;

#[async_trait]
impl TypedTool for UpdateCampaignStatusTool {
    type Params = UpdateStatusParams;

    fn name(&self) -> &'static str {
        "update_campaign_status"
    }

    fn description(&self) -> &str {
        "Change a campaign's status (draft, active, paused, completed, cancelled)."
    }

    async fn run(&self, p: UpdateStatusParams, ctx: &ToolContext) -> Result<ToolResult, String> {
        let previous = ctx
            .store
            .with_conn(|conn| campaigns::update_status(conn, &p.campaign_id, &ctx.user_id, p.status))
            .map_err(|e| e.to_string())?;
        match previous {
            Some(previous) => Ok(ToolResult::ok_with_message(
                json!({
                    "campaign_id": p.campaign_id,
                    "previous_status": previous,
                    "status": p.status,
                }),
                format!("Status changed from {previous} to {}", p.status),
            )),
            None => Ok(ToolResult::failure(format!("Campaign not found: {}", p.campaign_id))),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AddKolsParams {
    pub campaign_id: String,
    /// 1 to 100 distinct KOL ids
    pub kol_ids: Vec<String>,
}

pub struct AddKolsToCampaignTool;

#[async_trait]
impl TypedTool for AddKolsToCampaignTool {
    type Params = AddKolsParams;

    fn name(&self) -> &'static str {
        "add_kols_to_campaign"
    }

    fn description(&self) -> &str {
        "Add KOLs to one of your campaigns. KOLs already in the campaign are skipped and reported."
    }

    fn check(&self, p: &AddKolsParams) -> Result<(), String> {
        if p.kol_ids.is_empty() || p.kol_ids.len() > MAX_KOLS_PER_CALL {
            return Err(format!("kol_ids must contain 1 to {MAX_KOLS_PER_CALL} ids"));
        }
        let mut seen = HashSet::new();
        for id in &p.kol_ids {
            if !seen.insert(id.as_str()) {
                return Err(format!("duplicate kol id: {id}"));
            }
        }
        Ok(())
    }

    async fn run(&self, p: AddKolsParams, ctx: &ToolContext) -> Result<ToolResult, String> {
        let outcome = ctx
            .store
            .with_tx(|tx| {
                if campaigns::get(tx, &p.campaign_id, &ctx.user_id)?.is_none() {
                    return Ok(Err(format!("Campaign not found: {}", p.campaign_id)));
                }
                let existing = kols::existing_ids(tx, &p.kol_ids)?;
                let unknown: Vec<&String> =
                    p.kol_ids.iter().filter(|id| !existing.contains(id)).collect();
                if !unknown.is_empty() {
                    return Ok(Err(format!("Unknown KOL ids: {unknown:?}")));
                }
                Ok(Ok(campaigns::add_kols(tx, &p.campaign_id, &p.kol_ids)?))
            })
            .map_err(|e| e.to_string())?;

        let (added, skipped) = match outcome {
            Ok(v) => v,
            Err(reason) => return Ok(ToolResult::failure(reason)),
        };
        Ok(ToolResult::ok_with_message(
            json!({
                "campaign_id": p.campaign_id,
                "added_kol_ids": added,
                "skipped_kol_ids": skipped,
            }),
            format!("Added {} KOLs, skipped {}", added.len(), skipped.len()),
        ))
    }
}

//! analyze_campaign_performance：汇总活动投放数据

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::store::{campaigns, CampaignKol, Kol};
use crate::tools::{ToolContext, ToolResult, TypedTool};

const TOP_KOLS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KolPerformance {
    pub kol_id: String,
    pub name: String,
    pub views: i64,
    pub engagements: i64,
    pub cost: f64,
    pub engagement_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignPerformance {
    pub kol_count: usize,
    pub published_count: usize,
    pub total_views: i64,
    pub total_engagements: i64,
    pub total_cost: f64,
    /// engagements / views * 100
    pub engagement_rate: Option<f64>,
    /// cost per 1000 views
    pub cpm: Option<f64>,
    /// cost per engagement
    pub cpe: Option<f64>,
    pub budget_used_pct: Option<f64>,
    pub top_kols: Vec<KolPerformance>,
}

fn ratio(num: f64, den: f64) -> Option<f64> {
    (den > 0.0).then(|| (num / den * 100.0).round() / 100.0)
}

/// 纯计算：views 为 0 时相关比率为 None
pub fn summarize(members: &[(CampaignKol, Kol)], budget: Option<f64>) -> CampaignPerformance {
    let total_views: i64 = members.iter().map(|(m, _)| m.views).sum();
    let total_engagements: i64 = members.iter().map(|(m, _)| m.engagements).sum();
    let total_cost: f64 = members.iter().map(|(m, _)| m.cost).sum();

    let mut per_kol: Vec<KolPerformance> = members
        .iter()
        .map(|(m, k)| KolPerformance {
            kol_id: k.id.clone(),
            name: k.name.clone(),
            views: m.views,
            engagements: m.engagements,
            cost: m.cost,
            engagement_rate: ratio(m.engagements as f64 * 100.0, m.views as f64),
        })
        .collect();
    per_kol.sort_by(|a, b| b.engagements.cmp(&a.engagements).then_with(|| a.kol_id.cmp(&b.kol_id)));
    per_kol.truncate(TOP_KOLS);

    CampaignPerformance {
        kol_count: members.len(),
        published_count: members.iter().filter(|(m, _)| m.status == "published").count(),
        total_views,
        total_engagements,
        total_cost,
        engagement_rate: ratio(total_engagements as f64 * 100.0, total_views as f64),
        cpm: ratio(total_cost * 1000.0, total_views as f64),
        cpe: ratio(total_cost, total_engagements as f64),
        budget_used_pct: budget.and_then(|b| ratio(total_cost * 100.0, b)),
        top_kols: per_kol,
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AnalyzeParams {
    pub campaign_id: String,
}

pub struct AnalyzeCampaignPerformanceTool;

#[async_trait]
impl TypedTool for AnalyzeCampaignPerformanceTool {
    type Params = AnalyzeParams;

    fn name(&self) -> &'static str {
        "analyze_campaign_performance"
    }

    fn description(&self) -> &str {
        "Summarise a campaign's results: total views, engagements, cost, engagement rate, CPM, CPE and top KOLs."
    }

    async fn run(&self, p: AnalyzeParams, ctx: &ToolContext) -> Result<ToolResult, String> {
        let loaded = ctx
            .store
            .with_conn(|conn| {
                let Some(campaign) = campaigns::get(conn, &p.campaign_id, &ctx.user_id)? else {
                    return Ok(None);
                };
                let members = campaigns::members(conn, &campaign.id)?;
                Ok(Some((campaign, members)))
            })
            .map_err(|e| e.to_string())?;

        let Some((campaign, members)) = loaded else {
            return Ok(ToolResult::failure(format!("Campaign not found: {}", p.campaign_id)));
        };
        let performance = summarize(&members, campaign.budget);
        let message = if performance.total_views == 0 {
            "No published content yet".to_string()
        } else {
            format!(
                "{} views, {} engagements",
                performance.total_views, performance.total_engagements
            )
        };
        Ok(ToolResult::ok_with_message(
            json!({
                "campaign_id": campaign.id,
                "campaign_name": campaign.name,
                "status": campaign.status,
                "performance": performance,
            }),
            message,
        ))
    }
}

//! 工作区上下文：每轮首次规划前为用户汇总活动、客户与 KOL 池概况，注入 system prompt
//!
//! 快照按 user_id 缓存在 TtlCache 中；变更类工具成功后由编排器调用 invalidate。

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::core::AgentError;
use crate::memory::TtlCache;
use crate::store::{campaigns, clients, kols, Database};

const RECENT_CAMPAIGNS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentCampaign {
    pub id: String,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkspaceContext {
    pub campaign_counts: Vec<(String, i64)>,
    pub kol_pool: i64,
    pub clients: i64,
    pub recent_campaigns: Vec<RecentCampaign>,
}

impl WorkspaceContext {
    /// 汇总的键名，报告在 TurnMetadata.context_gathered 中
    pub fn keys(&self) -> Vec<String> {
        ["campaign_counts", "kol_pool", "clients", "recent_campaigns"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn to_prompt(&self) -> String {
        let counts = if self.campaign_counts.is_empty() {
            "none".to_string()
        } else {
            self.campaign_counts
                .iter()
                .map(|(status, n)| format!("{n} {status}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut out = format!(
            "- Campaigns: {counts}\n- Clients: {}\n- KOLs in database: {}",
            self.clients, self.kol_pool
        );
        if !self.recent_campaigns.is_empty() {
            out.push_str("\n- Recent campaigns:");
            for c in &self.recent_campaigns {
                out.push_str(&format!("\n  - {} \"{}\" ({})", c.id, c.name, c.status));
            }
        }
        out
    }
}

/// 带 TTL 缓存的上下文收集器
pub struct ContextGatherer {
    cache: Mutex<TtlCache<String, WorkspaceContext>>,
}

impl ContextGatherer {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(TtlCache::new(ttl)),
        }
    }

    pub fn gather(&self, user_id: &str, db: &Database) -> Result<WorkspaceContext, AgentError> {
        let key = user_id.to_string();
        if let Some(hit) = self.cache.lock().ok().and_then(|mut c| c.get(&key)) {
            return Ok(hit);
        }

        let snapshot = db.with_conn(|conn| {
            let recent = campaigns::list(conn, user_id, None, RECENT_CAMPAIGNS)?
                .into_iter()
                .map(|c| RecentCampaign {
                    id: c.id,
                    name: c.name,
                    status: c.status.to_string(),
                })
                .collect();
            Ok(WorkspaceContext {
                campaign_counts: campaigns::status_counts(conn, user_id)?,
                kol_pool: kols::count(conn)?,
                clients: clients::count(conn, user_id)?,
                recent_campaigns: recent,
            })
        })?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, snapshot.clone());
        }
        Ok(snapshot)
    }

    pub fn invalidate(&self, user_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.invalidate(&user_id.to_string());
        }
    }
}

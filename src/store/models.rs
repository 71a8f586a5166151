//! 领域记录：KOL、客户、活动、活动成员、外发消息

use std::fmt;
use std::str::FromStr;

use rusqlite::Row;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kol {
    pub id: String,
    pub name: String,
    pub handle: String,
    pub platform: String,
    pub country: String,
    pub category: String,
    pub followers: i64,
    pub engagement_rate: f64,
    pub bio: String,
}

impl Kol {
    pub(crate) const COLUMNS: &'static str =
        "id, name, handle, platform, country, category, followers, engagement_rate, bio";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            handle: row.get(2)?,
            platform: row.get(3)?,
            country: row.get(4)?,
            category: row.get(5)?,
            followers: row.get(6)?,
            engagement_rate: row.get(7)?,
            bio: row.get(8)?,
        })
    }

    /// 用于嵌入的文本表示
    pub fn profile_text(&self) -> String {
        format!(
            "{} {} {} {} {} {}",
            self.name, self.handle, self.platform, self.country, self.category, self.bio
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub industry: Option<String>,
    pub contact_email: Option<String>,
    pub created_at: String,
}

impl Client {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            industry: row.get(3)?,
            contact_email: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

/// 活动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(CampaignStatus::Draft),
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            other => Err(format!("unknown campaign status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub client_id: Option<String>,
    pub status: CampaignStatus,
    pub budget: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
}

impl Campaign {
    pub(crate) const COLUMNS: &'static str =
        "id, user_id, name, client_id, status, budget, start_date, end_date, description, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(4)?;
        let status = status.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            client_id: row.get(3)?,
            status,
            budget: row.get(5)?,
            start_date: row.get(6)?,
            end_date: row.get(7)?,
            description: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

/// 活动中的 KOL 及其投放数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignKol {
    pub campaign_id: String,
    pub kol_id: String,
    pub status: String,
    pub views: i64,
    pub engagements: i64,
    pub cost: f64,
    pub added_at: String,
}

impl CampaignKol {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            campaign_id: row.get(0)?,
            kol_id: row.get(1)?,
            status: row.get(2)?,
            views: row.get(3)?,
            engagements: row.get(4)?,
            cost: row.get(5)?,
            added_at: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: String,
    pub user_id: String,
    pub chat_id: String,
    pub kol_id: Option<String>,
    pub content: String,
    pub sent_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_text() {
        for s in ["draft", "active", "paused", "completed", "cancelled"] {
            let status: CampaignStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert_eq!("  Active ".parse::<CampaignStatus>(), Ok(CampaignStatus::Active));
        assert!("archived".parse::<CampaignStatus>().is_err());
    }
}

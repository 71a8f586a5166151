//! 活动与活动成员查询

use rusqlite::{params, Connection, OptionalExtension};

use super::models::{Campaign, CampaignKol, CampaignStatus, Kol};
use super::now_rfc3339;

pub fn insert(conn: &Connection, campaign: &Campaign) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO campaigns (id, user_id, name, client_id, status, budget, start_date, end_date, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            campaign.id,
            campaign.user_id,
            campaign.name,
            campaign.client_id,
            campaign.status.as_str(),
            campaign.budget,
            campaign.start_date,
            campaign.end_date,
            campaign.description,
            campaign.created_at
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str, user_id: &str) -> rusqlite::Result<Option<Campaign>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM campaigns WHERE id = ?1 AND user_id = ?2",
            Campaign::COLUMNS
        ),
        params![id, user_id],
        Campaign::from_row,
    )
    .optional()
}

/// 用户的活动，按创建时间倒序
pub fn list(
    conn: &Connection,
    user_id: &str,
    status: Option<CampaignStatus>,
    limit: usize,
) -> rusqlite::Result<Vec<Campaign>> {
    let status = status.map(|s| s.as_str());
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM campaigns
         WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at DESC, id ASC LIMIT ?3",
        Campaign::COLUMNS
    ))?;
    let rows = stmt.query_map(params![user_id, status, limit as i64], Campaign::from_row)?;
    rows.collect()
}

/// 更新状态，返回更新前的状态；活动不存在时返回 None
pub fn update_status(
    conn: &Connection,
    id: &str,
    user_id: &str,
    status: CampaignStatus,
) -> rusqlite::Result<Option<CampaignStatus>> {
    let Some(current) = get(conn, id, user_id)? else {
        return Ok(None);
    };
    conn.execute(
        "UPDATE campaigns SET status = ?1 WHERE id = ?2 AND user_id = ?3",
        params![status.as_str(), id, user_id],
    )?;
    Ok(Some(current.status))
}

/// 删除活动及其成员行；返回删除的活动行数
pub fn delete(conn: &Connection, id: &str, user_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM campaign_kols WHERE campaign_id IN
           (SELECT id FROM campaigns WHERE id = ?1 AND user_id = ?2)",
        params![id, user_id],
    )?;
    conn.execute(
        "DELETE FROM campaigns WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )
}

/// 批量加入 KOL；已在活动中的跳过。返回 (新加入, 跳过)
pub fn add_kols(
    conn: &Connection,
    campaign_id: &str,
    kol_ids: &[String],
) -> rusqlite::Result<(Vec<String>, Vec<String>)> {
    let now = now_rfc3339();
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO campaign_kols (campaign_id, kol_id, added_at) VALUES (?1, ?2, ?3)",
    )?;
    let mut added = Vec::new();
    let mut skipped = Vec::new();
    for kol_id in kol_ids {
        if stmt.execute(params![campaign_id, kol_id, now])? == 1 {
            added.push(kol_id.clone());
        } else {
            skipped.push(kol_id.clone());
        }
    }
    Ok((added, skipped))
}

/// 精确删除指定 (campaign_id, kol_id) 行；返回删除的行数
pub fn remove_kols(conn: &Connection, campaign_id: &str, kol_ids: &[String]) -> rusqlite::Result<usize> {
    let mut stmt =
        conn.prepare("DELETE FROM campaign_kols WHERE campaign_id = ?1 AND kol_id = ?2")?;
    let mut removed = 0;
    for kol_id in kol_ids {
        removed += stmt.execute(params![campaign_id, kol_id])?;
    }
    Ok(removed)
}

/// 活动成员及其 KOL 资料
pub fn members(conn: &Connection, campaign_id: &str) -> rusqlite::Result<Vec<(CampaignKol, Kol)>> {
    let kol_cols = Kol::COLUMNS
        .split(", ")
        .map(|c| format!("k.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT ck.campaign_id, ck.kol_id, ck.status, ck.views, ck.engagements, ck.cost, ck.added_at, {kol_cols}
         FROM campaign_kols ck JOIN kols k ON k.id = ck.kol_id
         WHERE ck.campaign_id = ?1
         ORDER BY ck.added_at ASC, ck.kol_id ASC"
    ))?;
    let rows = stmt.query_map([campaign_id], |row| {
        let member = CampaignKol::from_row(row)?;
        let kol = Kol {
            id: row.get(7)?,
            name: row.get(8)?,
            handle: row.get(9)?,
            platform: row.get(10)?,
            country: row.get(11)?,
            category: row.get(12)?,
            followers: row.get(13)?,
            engagement_rate: row.get(14)?,
            bio: row.get(15)?,
        };
        Ok((member, kol))
    })?;
    rows.collect()
}

pub fn member_ids(conn: &Connection, campaign_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT kol_id FROM campaign_kols WHERE campaign_id = ?1 ORDER BY kol_id",
    )?;
    let rows = stmt.query_map([campaign_id], |r| r.get(0))?;
    rows.collect()
}

/// 引用某客户的活动数
pub fn count_for_client(conn: &Connection, client_id: &str, user_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM campaigns WHERE client_id = ?1 AND user_id = ?2",
        params![client_id, user_id],
        |r| r.get(0),
    )
}

/// 写入某 KOL 在活动中的投放数据
#[cfg(test)]
pub fn record_metrics(
    conn: &Connection,
    campaign_id: &str,
    kol_id: &str,
    views: i64,
    engagements: i64,
    cost: f64,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE campaign_kols SET views = ?1, engagements = ?2, cost = ?3, status = 'published'
         WHERE campaign_id = ?4 AND kol_id = ?5",
        params![views, engagements, cost, campaign_id, kol_id],
    )
}

/// 各状态的活动数
pub fn status_counts(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM campaigns WHERE user_id = ?1 GROUP BY status ORDER BY status",
    )?;
    let rows = stmt.query_map([user_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
    rows.collect()
}

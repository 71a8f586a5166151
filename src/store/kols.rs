//! KOL 查询

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::models::{Campaign, Kol};

/// 结构化检索条件；None 表示不过滤
#[derive(Debug, Clone, Default)]
pub struct KolFilter {
    pub country: Option<String>,
    pub platform: Option<String>,
    pub category: Option<String>,
    pub min_followers: Option<i64>,
    pub max_followers: Option<i64>,
    /// 在 name / handle / bio 中做子串匹配
    pub query: Option<String>,
    pub limit: usize,
}

pub fn insert(conn: &Connection, kol: &Kol) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO kols (id, name, handle, platform, country, category, followers, engagement_rate, bio)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            kol.id,
            kol.name,
            kol.handle,
            kol.platform,
            kol.country,
            kol.category,
            kol.followers,
            kol.engagement_rate,
            kol.bio
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Kol>> {
    conn.query_row(
        &format!("SELECT {} FROM kols WHERE id = ?1", Kol::COLUMNS),
        [id],
        Kol::from_row,
    )
    .optional()
}

/// 按条件检索，粉丝数降序
pub fn search(conn: &Connection, filter: &KolFilter) -> rusqlite::Result<Vec<Kol>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(country) = &filter.country {
        clauses.push("LOWER(country) = LOWER(?)");
        values.push(SqlValue::Text(country.clone()));
    }
    if let Some(platform) = &filter.platform {
        clauses.push("LOWER(platform) = LOWER(?)");
        values.push(SqlValue::Text(platform.clone()));
    }
    if let Some(category) = &filter.category {
        clauses.push("LOWER(category) = LOWER(?)");
        values.push(SqlValue::Text(category.clone()));
    }
    if let Some(min) = filter.min_followers {
        clauses.push("followers >= ?");
        values.push(SqlValue::Integer(min));
    }
    if let Some(max) = filter.max_followers {
        clauses.push("followers <= ?");
        values.push(SqlValue::Integer(max));
    }
    if let Some(q) = &filter.query {
        clauses.push("(LOWER(name) LIKE ? OR LOWER(handle) LIKE ? OR LOWER(bio) LIKE ?)");
        let pattern = format!("%{}%", q.to_lowercase());
        for _ in 0..3 {
            values.push(SqlValue::Text(pattern.clone()));
        }
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    values.push(SqlValue::Integer(filter.limit as i64));

    let sql = format!(
        "SELECT {} FROM kols {} ORDER BY followers DESC, id ASC LIMIT ?",
        Kol::COLUMNS,
        where_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), Kol::from_row)?;
    rows.collect()
}

pub fn list_all(conn: &Connection) -> rusqlite::Result<Vec<Kol>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM kols ORDER BY id", Kol::COLUMNS))?;
    let rows = stmt.query_map([], Kol::from_row)?;
    rows.collect()
}

pub fn count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM kols", [], |r| r.get(0))
}

/// 返回已存在的 KOL id（保持输入顺序）
pub fn existing_ids(conn: &Connection, ids: &[String]) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT 1 FROM kols WHERE id = ?1")?;
    let mut found = Vec::new();
    for id in ids {
        if stmt.exists([id])? {
            found.push(id.clone());
        }
    }
    Ok(found)
}

/// 该 KOL 参与的、属于 user_id 的活动
pub fn campaigns_of(conn: &Connection, kol_id: &str, user_id: &str) -> rusqlite::Result<Vec<Campaign>> {
    let cols = Campaign::COLUMNS
        .split(", ")
        .map(|c| format!("c.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {cols} FROM campaigns c
         JOIN campaign_kols ck ON ck.campaign_id = c.id
         WHERE ck.kol_id = ?1 AND c.user_id = ?2
         ORDER BY c.created_at DESC"
    ))?;
    let rows = stmt.query_map(params![kol_id, user_id], Campaign::from_row)?;
    rows.collect()
}

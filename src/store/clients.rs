//! 客户查询

use rusqlite::{params, Connection, OptionalExtension};

use super::models::Client;

const COLUMNS: &str = "id, user_id, name, industry, contact_email, created_at";

pub fn insert(conn: &Connection, client: &Client) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO clients (id, user_id, name, industry, contact_email, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            client.id,
            client.user_id,
            client.name,
            client.industry,
            client.contact_email,
            client.created_at
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str, user_id: &str) -> rusqlite::Result<Option<Client>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM clients WHERE id = ?1 AND user_id = ?2"),
        params![id, user_id],
        Client::from_row,
    )
    .optional()
}

/// 同名客户（不区分大小写），用于防止重复创建
pub fn find_by_name(conn: &Connection, name: &str, user_id: &str) -> rusqlite::Result<Option<Client>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM clients WHERE LOWER(name) = LOWER(?1) AND user_id = ?2"),
        params![name, user_id],
        Client::from_row,
    )
    .optional()
}

/// 删除客户；返回删除的行数（0 表示已不存在）
pub fn delete(conn: &Connection, id: &str, user_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM clients WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )
}

pub fn count(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM clients WHERE user_id = ?1",
        [user_id],
        |r| r.get(0),
    )
}

//! 外发消息记录

use rusqlite::{params, Connection};

use super::models::OutboundMessage;

pub fn insert(conn: &Connection, msg: &OutboundMessage) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO outbound_messages (id, user_id, chat_id, kol_id, content, sent_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![msg.id, msg.user_id, msg.chat_id, msg.kol_id, msg.content, msg.sent_at],
    )?;
    Ok(())
}

pub fn list_for_chat(conn: &Connection, chat_id: &str) -> rusqlite::Result<Vec<OutboundMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, chat_id, kol_id, content, sent_at
         FROM outbound_messages WHERE chat_id = ?1 ORDER BY sent_at ASC",
    )?;
    let rows = stmt.query_map([chat_id], |r| {
        Ok(OutboundMessage {
            id: r.get(0)?,
            user_id: r.get(1)?,
            chat_id: r.get(2)?,
            kol_id: r.get(3)?,
            content: r.get(4)?,
            sent_at: r.get(5)?,
        })
    })?;
    rows.collect()
}

//! 数据存储：SQLite 上的 KOL / 客户 / 活动 / 对话 / 动作日志
//!
//! 单连接 + Mutex；所有查询都是短小的同步调用。业务查询以 `fn(&Connection, ..)` 形式放在子模块中，
//! 既可以在 `with_conn` 中使用，也可以在 `with_tx` 的事务里组合使用（Transaction 解引用为 Connection）。

pub mod campaigns;
pub mod clients;
pub mod kols;
pub mod messages;
pub mod models;
pub mod seed;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Transaction};

use crate::core::AgentError;

pub use models::{Campaign, CampaignKol, CampaignStatus, Client, Kol, OutboundMessage};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kols (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    handle TEXT NOT NULL,
    platform TEXT NOT NULL,
    country TEXT NOT NULL,
    category TEXT NOT NULL,
    followers INTEGER NOT NULL,
    engagement_rate REAL NOT NULL DEFAULT 0,
    bio TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS clients (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    industry TEXT,
    contact_email TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS campaigns (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    client_id TEXT,
    status TEXT NOT NULL,
    budget REAL,
    start_date TEXT,
    end_date TEXT,
    description TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS campaign_kols (
    campaign_id TEXT NOT NULL,
    kol_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'invited',
    views INTEGER NOT NULL DEFAULT 0,
    engagements INTEGER NOT NULL DEFAULT 0,
    cost REAL NOT NULL DEFAULT 0,
    added_at TEXT NOT NULL,
    PRIMARY KEY (campaign_id, kol_id)
);
CREATE TABLE IF NOT EXISTS outbound_messages (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    chat_id TEXT NOT NULL,
    kol_id TEXT,
    content TEXT NOT NULL,
    sent_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS agent_conversations (
    session_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    messages TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS agent_actions (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    action_type TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    action_data TEXT NOT NULL,
    is_reversible INTEGER NOT NULL,
    is_reversed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    reversed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_campaigns_user ON campaigns(user_id);
CREATE INDEX IF NOT EXISTS idx_agent_actions_session ON agent_actions(session_id, user_id);
";

/// SQLite 数据库句柄（可在多个组件间以 Arc 共享）
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// 打开（或创建）数据库文件并建表；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AgentError::Config(format!("create {}: {e}", parent.display())))?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// 内存数据库（测试与临时会话）
    pub fn open_in_memory() -> Result<Self, AgentError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AgentError> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("database schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 在共享连接上执行一次查询
    pub fn with_conn<R>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<R>,
    ) -> Result<R, AgentError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        Ok(f(&conn)?)
    }

    /// 在单个事务中执行；闭包返回 Err 时整体回滚
    pub fn with_tx<R>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<R, AgentError>,
    ) -> Result<R, AgentError> {
        let mut conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

/// 当前时间的 RFC 3339 字符串（所有时间列统一格式）
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// 生成带前缀的实体 ID，如 `camp-3f2a...`
pub fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_schema_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("kol.db");
        let db = Database::open(&path).unwrap();
        let tables: i64 = db
            .with_conn(|c| {
                c.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                    [],
                    |r| r.get(0),
                )
            })
            .unwrap();
        assert_eq!(tables, 7);
        assert!(path.exists());
    }

    #[test]
    fn test_tx_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let res: Result<(), AgentError> = db.with_tx(|tx| {
            tx.execute(
                "INSERT INTO kols (id, name, handle, platform, country, category, followers)
                 VALUES ('k1', 'A', '@a', 'instagram', 'KR', 'beauty', 10)",
                [],
            )?;
            Err(AgentError::UndoExecution("boom".into()))
        });
        assert!(res.is_err());
        let count: i64 = db
            .with_conn(|c| c.query_row("SELECT COUNT(*) FROM kols", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_new_id_has_prefix() {
        let id = new_id("camp");
        assert!(id.starts_with("camp-"));
        assert_ne!(id, new_id("camp"));
    }
}

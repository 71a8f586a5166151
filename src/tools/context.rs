//! 工具调用上下文：当前用户、角色、会话与数据访问句柄
//!
//! 由 Orchestrator 每轮构造并传给 ToolExecutor；执行器只转交，不读取其中内容。

use std::sync::Arc;

use crate::store::Database;

#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub user_role: String,
    pub session_id: String,
    pub store: Arc<Database>,
}

impl ToolContext {
    pub fn new(
        user_id: impl Into<String>,
        user_role: impl Into<String>,
        session_id: impl Into<String>,
        store: Arc<Database>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_role: user_role.into(),
            session_id: session_id.into(),
            store,
        }
    }
}

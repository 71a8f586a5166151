//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `KOL__*` 覆盖（双下划线表示嵌套，如 `KOL__AGENT__MAX_STEPS=5`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub cache: CacheSection,
}

/// [app] 段：数据库路径、对话历史上限、控制台用户
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// SQLite 文件路径
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// 每个会话持久化保留的最大消息条数（超出时丢弃最旧的）
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
    /// 控制台模式下的用户 ID 与角色
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_user_role")]
    pub user_role: String,
    /// 数据库为空时写入演示 KOL 数据
    #[serde(default)]
    pub seed_demo_data: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/kol_agent.db")
}

fn default_max_history_turns() -> usize {
    40
}

fn default_user_id() -> String {
    "local-user".to_string()
}

fn default_user_role() -> String {
    "manager".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            db_path: default_db_path(),
            max_history_turns: default_max_history_turns(),
            user_id: default_user_id(),
            user_role: default_user_role(),
            seed_demo_data: false,
        }
    }
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 语义检索使用的嵌入模型（仅 openai 兼容端点）
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            embedding_model: default_embedding_model(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [agent] 段：单轮步数 / 时间预算与规划重试
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 单轮最多执行的工具调用数
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// 单轮墙钟预算（秒）
    #[serde(default = "default_max_turn_secs")]
    pub max_turn_secs: u64,
    /// 规划调用失败后的最大重试次数
    #[serde(default = "default_planning_retries")]
    pub planning_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_max_steps() -> usize {
    8
}

fn default_max_turn_secs() -> u64 {
    120
}

fn default_planning_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    8_000
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_turn_secs: default_max_turn_secs(),
            planning_retries: default_planning_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl AgentSection {
    pub fn max_turn_duration(&self) -> Duration {
        Duration::from_secs(self.max_turn_secs)
    }
}

/// [tools] 段：工具超时、检索默认条数、消息投递 webhook
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_search_limit")]
    pub default_search_limit: usize,
    /// 设置后 send_message 会把消息 POST 到该地址
    pub webhook_url: Option<String>,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_search_limit() -> usize {
    10
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            default_search_limit: default_search_limit(),
            webhook_url: None,
        }
    }
}

/// [cache] 段：上下文快照与 KOL 嵌入的缓存时长
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_context_ttl_secs")]
    pub context_ttl_secs: u64,
    #[serde(default = "default_embedding_ttl_secs")]
    pub embedding_ttl_secs: u64,
}

fn default_context_ttl_secs() -> u64 {
    60
}

fn default_embedding_ttl_secs() -> u64 {
    3_600
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            context_ttl_secs: default_context_ttl_secs(),
            embedding_ttl_secs: default_embedding_ttl_secs(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 KOL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 KOL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("KOL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_steps, 8);
        assert_eq!(cfg.agent.planning_retries, 3);
        assert_eq!(cfg.app.max_history_turns, 40);
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.llm.provider, "deepseek");
    }

    #[test]
    fn test_load_from_file_keeps_unset_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[agent]\nmax_steps = 5\n\n[app]\ndb_path = \"/tmp/x.db\"\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.max_steps, 5);
        assert_eq!(cfg.agent.max_turn_secs, 120);
        assert_eq!(cfg.app.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(cfg.app.max_history_turns, 40);
    }
}

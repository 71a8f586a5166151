//! Orchestrator 构建器：统一的初始化逻辑
//!
//! 按配置创建数据库、LLM、嵌入、消息通道与工具注册表；每个协作者都可以替换（测试中注入 Mock）。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator, RecoveryEngine, SessionSupervisor};
use crate::ledger::ActionLedger;
use crate::llm::{create_embedder_from_config, create_llm_from_config, EmbeddingProvider, LlmClient, RetryConfig};
use crate::memory::ConversationMemoryManager;
use crate::react::{ContextGatherer, Planner, TurnBudget, DEFAULT_SYSTEM_PROMPT};
use crate::store::{seed, Database};
use crate::tools::{
    channel_from_config, register_domain_tools, DomainToolDeps, MessagingChannel, Tool,
    ToolExecutor, ToolRegistry,
};

pub struct AgentBuilder {
    config: AppConfig,
    system_prompt: Option<String>,
    database: Option<Arc<Database>>,
    llm: Option<Arc<dyn LlmClient>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    channel: Option<Arc<dyn MessagingChannel>>,
    domain_tools: bool,
    extra_tools: Vec<Arc<dyn Tool>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            system_prompt: None,
            database: None,
            llm: None,
            embedder: None,
            channel: None,
            domain_tools: true,
            extra_tools: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// 从 config/prompts/system.md 加载系统提示词（不存在时使用内置默认）
    pub fn with_system_prompt_from_file(mut self) -> Self {
        self.system_prompt = ["config/prompts/system.md", "../config/prompts/system.md"]
            .into_iter()
            .find_map(|p| std::fs::read_to_string(p).ok())
            .filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.database = Some(db);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn MessagingChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// 不注册内置领域工具（只使用 with_tool 添加的工具）
    pub fn without_domain_tools(mut self) -> Self {
        self.domain_tools = false;
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    fn open_database(&self) -> Result<Arc<Database>, AgentError> {
        if let Some(db) = &self.database {
            return Ok(db.clone());
        }
        let path: &PathBuf = &self.config.app.db_path;
        tracing::info!(path = %path.display(), "opening database");
        Ok(Arc::new(Database::open(path)?))
    }

    pub fn build_tool_registry(
        &self,
        llm: Arc<dyn LlmClient>,
    ) -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();
        if self.domain_tools {
            let deps = DomainToolDeps {
                llm,
                embedder: self
                    .embedder
                    .clone()
                    .unwrap_or_else(|| create_embedder_from_config(&self.config)),
                channel: self
                    .channel
                    .clone()
                    .unwrap_or_else(|| channel_from_config(self.config.tools.webhook_url.as_deref())),
                default_search_limit: self.config.tools.default_search_limit,
                embedding_ttl: Duration::from_secs(self.config.cache.embedding_ttl_secs),
            };
            register_domain_tools(&mut registry, deps)?;
        }
        for tool in &self.extra_tools {
            registry.register_arc(tool.clone())?;
        }
        Ok(registry)
    }

    pub fn build(self) -> Result<Orchestrator, AgentError> {
        let store = self.open_database()?;
        if self.config.app.seed_demo_data {
            store.with_conn(seed::seed_demo_kols)?;
        }
        let llm = match &self.llm {
            Some(llm) => llm.clone(),
            None => create_llm_from_config(&self.config)?,
        };
        let registry = self.build_tool_registry(llm.clone())?;
        tracing::info!(tools = ?registry.tool_names(), "tool registry ready");

        let agent = &self.config.agent;
        let recovery = RecoveryEngine::new(RetryConfig {
            max_retries: agent.planning_retries,
            base_delay_ms: agent.retry_base_delay_ms,
            max_delay_ms: agent.retry_max_delay_ms,
        });
        let budget = TurnBudget {
            max_steps: agent.max_steps,
            max_duration: agent.max_turn_duration(),
        };
        let prompt = self
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(Orchestrator {
            planner: Planner::new(llm, prompt),
            executor: ToolExecutor::new(registry, self.config.tools.tool_timeout_secs),
            recovery,
            memory: ConversationMemoryManager::new(store.clone(), self.config.app.max_history_turns),
            ledger: ActionLedger::new(store.clone()),
            context: ContextGatherer::new(Duration::from_secs(self.config.cache.context_ttl_secs)),
            supervisor: SessionSupervisor::new(),
            store,
            budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{HashingEmbedder, MockLlmClient};

    #[test]
    fn test_build_with_injected_collaborators() {
        let mut cfg = AppConfig::default();
        cfg.app.seed_demo_data = true;
        let orchestrator = AgentBuilder::new(cfg)
            .with_database(Arc::new(Database::open_in_memory().unwrap()))
            .with_llm(Arc::new(MockLlmClient::new()))
            .with_embedder(Arc::new(HashingEmbedder::default()))
            .build()
            .unwrap();
        assert_eq!(orchestrator.tool_names().len(), 11);
        let kols = orchestrator
            .store()
            .with_conn(crate::store::kols::count)
            .unwrap();
        assert_eq!(kols, 10);
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "nope".into();
        let err = AgentBuilder::new(cfg)
            .with_database(Arc::new(Database::open_in_memory().unwrap()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::Config(_)));
    }
}

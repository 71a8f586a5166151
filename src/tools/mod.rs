//! 工具箱：Tool trait、强类型适配、注册表、执行器与领域工具

pub mod analytics;
pub mod campaigns;
pub mod clients;
pub mod context;
pub mod executor;
pub mod kols;
pub mod messaging;
pub mod registry;
pub mod result;
pub mod schema;
pub mod typed;

use std::sync::Arc;
use std::time::Duration;

use crate::core::AgentError;
use crate::llm::{EmbeddingProvider, LlmClient};

pub use analytics::AnalyzeCampaignPerformanceTool;
pub use campaigns::{
    AddKolsToCampaignTool, CreateCampaignTool, ListCampaignsTool, UpdateCampaignStatusTool,
};
pub use clients::CreateClientTool;
pub use context::ToolContext;
pub use executor::ToolExecutor;
pub use kols::{GetKolDetailsTool, SearchKolsTool, SemanticSearchKolsTool};
pub use messaging::{
    channel_from_config, GenerateMessageTool, MessagingChannel, SendMessageTool, StoreChannel,
    WebhookChannel,
};
pub use registry::{Tool, ToolDefinition, ToolRegistry};
pub use result::{ToolCallStep, ToolResult};
pub use schema::tool_call_schema_json;
pub use typed::{TypedTool, TypedToolAdaptor};

/// 领域工具依赖的外部协作者
#[derive(Clone)]
pub struct DomainToolDeps {
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub channel: Arc<dyn MessagingChannel>,
    pub default_search_limit: usize,
    pub embedding_ttl: Duration,
}

/// 注册全部 KOL / 活动领域工具
pub fn register_domain_tools(
    registry: &mut ToolRegistry,
    deps: DomainToolDeps,
) -> Result<(), AgentError> {
    registry.register(TypedToolAdaptor::new(SearchKolsTool::new(deps.default_search_limit)))?;
    registry.register(TypedToolAdaptor::new(SemanticSearchKolsTool::new(
        deps.embedder,
        deps.embedding_ttl,
        deps.default_search_limit,
    )))?;
    registry.register(TypedToolAdaptor::new(GetKolDetailsTool))?;
    registry.register(TypedToolAdaptor::new(CreateClientTool))?;
    registry.register(TypedToolAdaptor::new(CreateCampaignTool))?;
    registry.register(TypedToolAdaptor::new(ListCampaignsTool))?;
    registry.register(TypedToolAdaptor::new(UpdateCampaignStatusTool))?;
    registry.register(TypedToolAdaptor::new(AddKolsToCampaignTool))?;
    registry.register(TypedToolAdaptor::new(GenerateMessageTool::new(deps.llm)))?;
    registry.register(TypedToolAdaptor::new(SendMessageTool::new(deps.channel)))?;
    registry.register(TypedToolAdaptor::new(AnalyzeCampaignPerformanceTool))?;
    Ok(())
}

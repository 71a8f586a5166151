//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）以及嵌入

pub mod deepseek;
pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::AgentError;

pub use deepseek::{create_deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use embedding::{
    cosine_similarity, create_embedder_from_config, EmbeddingProvider, HashingEmbedder,
    OpenAiEmbedder,
};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError, RetryConfig};

/// 按 [llm].provider 创建规划客户端
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let timeout = Duration::from_secs(cfg.llm.timeouts.request);
    let client: Arc<dyn LlmClient> = match cfg.llm.provider.as_str() {
        "deepseek" => Arc::new(
            create_deepseek_client(cfg.llm.base_url.as_deref(), Some(&cfg.llm.model))
                .with_request_timeout(timeout),
        ),
        "openai" => Arc::new(
            OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, None)
                .with_request_timeout(timeout),
        ),
        "mock" => Arc::new(MockLlmClient::new()),
        other => {
            return Err(AgentError::Config(format!("unknown llm provider: {other}")));
        }
    };
    tracing::info!(provider = %cfg.llm.provider, model = %cfg.llm.model, "llm client ready");
    Ok(client)
}

//! 嵌入 API：供 KOL 语义检索使用
//!
//! OpenAiEmbedder 调用 OpenAI 兼容的 /embeddings 端点；HashingEmbedder 是不依赖网络的
//! 词袋哈希向量，结果确定，用于离线运行与测试。

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::config::AppConfig;
use crate::llm::LlmError;

/// 嵌入提供方
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 将文本编码为向量
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// 用于区分缓存（不同模型的向量不可混用）
    fn model_name(&self) -> &str;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    request_timeout: Duration,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| LlmError::Api(e.to_string()))?;
        let response = tokio::time::timeout(self.request_timeout, self.client.embeddings().create(request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(|e| LlmError::classify(&e.to_string()))?;
        response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or(LlmError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// 词袋哈希嵌入：小写分词后哈希到固定维度并做 L2 归一化
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let idx = (hasher.finish() % self.dims as u64) as usize;
            v[idx] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(self.embed_text(text))
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

/// 余弦相似度；维度不一致或存在零向量时为 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// 从应用配置创建嵌入提供方：provider 为 openai 且有 OPENAI_API_KEY 时走 API，否则用哈希嵌入
pub fn create_embedder_from_config(cfg: &AppConfig) -> Arc<dyn EmbeddingProvider> {
    let key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
    match (cfg.llm.provider.as_str(), key) {
        ("openai", Some(key)) => {
            tracing::info!(model = %cfg.llm.embedding_model, "using OpenAI embeddings");
            Arc::new(
                OpenAiEmbedder::new(cfg.llm.base_url.as_deref(), &cfg.llm.embedding_model, &key)
                    .with_request_timeout(Duration::from_secs(cfg.llm.timeouts.request)),
            )
        }
        _ => {
            tracing::debug!("embedding API unavailable, using hashing embedder");
            Arc::new(HashingEmbedder::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_hashing_embedder_ranks_overlap_higher() {
        let e = HashingEmbedder::default();
        let q = e.embed("korean skincare beauty").await.unwrap();
        let beauty = e.embed("K-beauty skincare routines from Seoul").await.unwrap();
        let gaming = e.embed("competitive esports streamer").await.unwrap();
        assert!(cosine_similarity(&q, &beauty) > cosine_similarity(&q, &gaming));
        assert_eq!(q, e.embed("Korean SKINCARE beauty").await.unwrap());
    }
}

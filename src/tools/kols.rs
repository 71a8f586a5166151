//! KOL 检索工具：结构化检索、语义检索、详情

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::llm::{cosine_similarity, EmbeddingProvider};
use crate::memory::TtlCache;
use crate::store::kols::{self, KolFilter};
use crate::store::Kol;
use crate::tools::{ToolContext, ToolResult, TypedTool};

const MAX_LIMIT: usize = 50;

fn check_limit(limit: Option<usize>) -> Result<(), String> {
    match limit {
        Some(l) if l == 0 || l > MAX_LIMIT => Err(format!("limit must be between 1 and {MAX_LIMIT}")),
        _ => Ok(()),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchKolsParams {
    /// Country name, e.g. "South Korea"
    #[serde(default)]
    pub country: Option<String>,
    /// instagram / youtube / tiktok / twitch
    #[serde(default)]
    pub platform: Option<String>,
    /// Content category, e.g. beauty, food, fitness
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub min_followers: Option<i64>,
    #[serde(default)]
    pub max_followers: Option<i64>,
    /// Free text matched against name, handle and bio
    #[serde(default)]
    pub query: Option<String>,
    /// 1..=50, default 10
    #[serde(default)]
    pub limit: Option<usize>,
}

/// search_kols：按国家 / 平台 / 品类 / 粉丝数筛选
pub struct SearchKolsTool {
    default_limit: usize,
}

impl SearchKolsTool {
    pub fn new(default_limit: usize) -> Self {
        Self {
            default_limit: default_limit.clamp(1, MAX_LIMIT),
        }
    }
}

#[async_trait]
impl TypedTool for SearchKolsTool {
    type Params = SearchKolsParams;

    fn name(&self) -> &'static str {
        "search_kols"
    }

    fn description(&self) -> &str {
        "Search the KOL (influencer) database by country, platform, category, follower range or free text. Returns KOLs sorted by followers."
    }

    fn check(&self, p: &SearchKolsParams) -> Result<(), String> {
        check_limit(p.limit)?;
        if let (Some(min), Some(max)) = (p.min_followers, p.max_followers) {
            if min > max {
                return Err("min_followers must not exceed max_followers".into());
            }
        }
        if p.min_followers.is_some_and(|v| v < 0) || p.max_followers.is_some_and(|v| v < 0) {
            return Err("follower bounds must be non-negative".into());
        }
        Ok(())
    }

    async fn run(&self, p: SearchKolsParams, ctx: &ToolContext) -> Result<ToolResult, String> {
        let filter = KolFilter {
            country: non_blank(p.country),
            platform: non_blank(p.platform),
            category: non_blank(p.category),
            min_followers: p.min_followers,
            max_followers: p.max_followers,
            query: non_blank(p.query),
            limit: p.limit.unwrap_or(self.default_limit),
        };
        let found = ctx
            .store
            .with_conn(|conn| kols::search(conn, &filter))
            .map_err(|e| e.to_string())?;
        let count = found.len();
        Ok(ToolResult::ok_with_message(
            json!({ "kols": found, "count": count }),
            format!("Found {count} KOLs"),
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SemanticSearchParams {
    /// Natural-language description of the wanted creators
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// semantic_search_kols：按嵌入向量的余弦相似度排序
pub struct SemanticSearchKolsTool {
    embedder: Arc<dyn EmbeddingProvider>,
    /// (模型名, kol_id) -> 向量
    vectors: Mutex<TtlCache<(String, String), Vec<f32>>>,
    default_limit: usize,
}

impl SemanticSearchKolsTool {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, cache_ttl: Duration, default_limit: usize) -> Self {
        Self {
            embedder,
            vectors: Mutex::new(TtlCache::new(cache_ttl)),
            default_limit: default_limit.clamp(1, MAX_LIMIT),
        }
    }

    async fn kol_vector(&self, kol: &Kol) -> Result<Vec<f32>, String> {
        let key = (self.embedder.model_name().to_string(), kol.id.clone());
        if let Some(v) = self.vectors.lock().ok().and_then(|mut c| c.get(&key)) {
            return Ok(v);
        }
        let v = self
            .embedder
            .embed(&kol.profile_text())
            .await
            .map_err(|e| e.to_string())?;
        if let Ok(mut cache) = self.vectors.lock() {
            cache.insert(key, v.clone());
        }
        Ok(v)
    }
}

#[async_trait]
impl TypedTool for SemanticSearchKolsTool {
    type Params = SemanticSearchParams;

    fn name(&self) -> &'static str {
        "semantic_search_kols"
    }

    fn description(&self) -> &str {
        "Find KOLs whose profile best matches a natural-language description (e.g. 'Korean creators doing skincare reviews'). Returns KOLs with a similarity score."
    }

    fn check(&self, p: &SemanticSearchParams) -> Result<(), String> {
        if p.query.trim().is_empty() {
            return Err("query must not be empty".into());
        }
        check_limit(p.limit)
    }

    async fn run(&self, p: SemanticSearchParams, ctx: &ToolContext) -> Result<ToolResult, String> {
        let query = self
            .embedder
            .embed(p.query.trim())
            .await
            .map_err(|e| e.to_string())?;
        let all = ctx
            .store
            .with_conn(kols::list_all)
            .map_err(|e| e.to_string())?;

        let mut scored = Vec::with_capacity(all.len());
        for kol in all {
            let v = self.kol_vector(&kol).await?;
            scored.push((cosine_similarity(&query, &v), kol));
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        scored.truncate(p.limit.unwrap_or(self.default_limit));

        let results: Vec<_> = scored
            .into_iter()
            .map(|(score, kol)| json!({ "kol": kol, "score": score }))
            .collect();
        let count = results.len();
        Ok(ToolResult::ok(json!({ "results": results, "count": count })))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct KolDetailsParams {
    pub kol_id: String,
}

/// get_kol_details：KOL 资料及其参与的活动
pub struct GetKolDetailsTool;

#[async_trait]
impl TypedTool for GetKolDetailsTool {
    type Params = KolDetailsParams;

    fn name(&self) -> &'static str {
        "get_kol_details"
    }

    fn description(&self) -> &str {
        "Get the full profile of one KOL by id, including the campaigns of yours it already belongs to."
    }

    async fn run(&self, p: KolDetailsParams, ctx: &ToolContext) -> Result<ToolResult, String> {
        let (kol, campaigns) = ctx
            .store
            .with_conn(|conn| {
                let kol = kols::get(conn, &p.kol_id)?;
                let campaigns = kols::campaigns_of(conn, &p.kol_id, &ctx.user_id)?;
                Ok((kol, campaigns))
            })
            .map_err(|e| e.to_string())?;
        match kol {
            Some(kol) => Ok(ToolResult::ok(json!({ "kol": kol, "campaigns": campaigns }))),
            None => Ok(ToolResult::failure(format!("KOL not found: {}", p.kol_id))),
        }
    }
}

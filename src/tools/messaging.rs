//! 外联消息：LLM 起草（generate_message）与发送（send_message）
//!
//! 发送经 MessagingChannel 投递：StoreChannel 只落库；WebhookChannel 先 POST 到配置的地址，成功后落库。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::store::{campaigns, kols, messages, new_id, now_rfc3339, Database, OutboundMessage};
use crate::tools::{ToolContext, ToolResult, TypedTool};

const MAX_MESSAGE_CHARS: usize = 4_000;

/// 消息投递通道
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn deliver(&self, message: &OutboundMessage, store: &Database) -> Result<(), String>;
}

/// 仅写入 outbound_messages 表
#[derive(Debug, Default)]
pub struct StoreChannel;

#[async_trait]
impl MessagingChannel for StoreChannel {
    async fn deliver(&self, message: &OutboundMessage, store: &Database) -> Result<(), String> {
        store
            .with_conn(|conn| messages::insert(conn, message))
            .map_err(|e| e.to_string())
    }
}

/// POST 到 webhook 后再写入 outbound_messages 表
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl MessagingChannel for WebhookChannel {
    async fn deliver(&self, message: &OutboundMessage, store: &Database) -> Result<(), String> {
        let resp = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| format!("webhook delivery failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("webhook returned HTTP {}", resp.status()));
        }
        StoreChannel.deliver(message, store).await
    }
}

/// 按配置选择通道
pub fn channel_from_config(webhook_url: Option<&str>) -> Arc<dyn MessagingChannel> {
    match webhook_url.filter(|u| !u.trim().is_empty()) {
        Some(url) => Arc::new(WebhookChannel::new(url)),
        None => Arc::new(StoreChannel),
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SendMessageParams {
    /// Conversation / chat id with the KOL
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub kol_id: Option<String>,
}

pub struct SendMessageTool {
    channel: Arc<dyn MessagingChannel>,
}

impl SendMessageTool {
    pub fn new(channel: Arc<dyn MessagingChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl TypedTool for SendMessageTool {
    type Params = SendMessageParams;

    fn name(&self) -> &'static str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to a KOL chat. Sent messages cannot be recalled."
    }

    fn check(&self, p: &SendMessageParams) -> Result<(), String> {
        if p.chat_id.trim().is_empty() {
            return Err("chat_id must not be empty".into());
        }
        if p.content.trim().is_empty() {
            return Err("content must not be empty".into());
        }
        if p.content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(format!("content exceeds {MAX_MESSAGE_CHARS} characters"));
        }
        Ok(())
    }

    async fn run(&self, p: SendMessageParams, ctx: &ToolContext) -> Result<ToolResult, String> {
        let message = OutboundMessage {
            id: new_id("msg"),
            user_id: ctx.user_id.clone(),
            chat_id: p.chat_id.trim().to_string(),
            kol_id: p.kol_id,
            content: p.content,
            sent_at: now_rfc3339(),
        };
        self.channel.deliver(&message, &ctx.store).await?;
        tracing::info!(message_id = %message.id, chat_id = %message.chat_id, "message sent");
        Ok(ToolResult::ok_with_message(
            json!({ "message_id": message.id, "chat_id": message.chat_id }),
            "Message sent",
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerateMessageParams {
    pub kol_id: String,
    /// Campaign to pitch; its name, budget and dates are woven into the draft
    #[serde(default)]
    pub campaign_id: Option<String>,
    /// e.g. friendly, formal, playful (default friendly)
    #[serde(default)]
    pub tone: Option<String>,
    /// Output language (default English)
    #[serde(default)]
    pub language: Option<String>,
}

/// generate_message：由 LLM 起草外联消息（不发送）
pub struct GenerateMessageTool {
    llm: Arc<dyn LlmClient>,
}

impl GenerateMessageTool {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl TypedTool for GenerateMessageTool {
    type Params = GenerateMessageParams;

    fn name(&self) -> &'static str {
        "generate_message"
    }

    fn description(&self) -> &str {
        "Draft a personalised outreach message for a KOL, optionally about one of your campaigns. Does not send anything."
    }

    async fn run(&self, p: GenerateMessageParams, ctx: &ToolContext) -> Result<ToolResult, String> {
        let (kol, campaign) = ctx
            .store
            .with_conn(|conn| {
                let kol = kols::get(conn, &p.kol_id)?;
                let campaign = match &p.campaign_id {
                    Some(id) => campaigns::get(conn, id, &ctx.user_id)?,
                    None => None,
                };
                Ok((kol, campaign))
            })
            .map_err(|e| e.to_string())?;

        let Some(kol) = kol else {
            return Ok(ToolResult::failure(format!("KOL not found: {}", p.kol_id)));
        };
        if let (Some(id), None) = (&p.campaign_id, &campaign) {
            return Ok(ToolResult::failure(format!("Campaign not found: {id}")));
        }

        let tone = p.tone.as_deref().unwrap_or("friendly");
        let language = p.language.as_deref().unwrap_or("English");
        let mut brief = format!(
            "Creator: {} ({}) on {}, {} followers, {} content from {}. Bio: {}",
            kol.name, kol.handle, kol.platform, kol.followers, kol.category, kol.country, kol.bio
        );
        if let Some(c) = &campaign {
            brief.push_str(&format!("\nCampaign: {}", c.name));
            if let Some(d) = &c.description {
                brief.push_str(&format!(" - {d}"));
            }
            if let (Some(start), Some(end)) = (&c.start_date, &c.end_date) {
                brief.push_str(&format!(" (runs {start} to {end})"));
            }
        }

        let prompt = [
            Message::system(format!(
                "You write short influencer outreach messages for a marketing agency. \
                 Write in {language} with a {tone} tone. Reply with the message text only."
            )),
            Message::user(brief),
        ];
        let draft = self.llm.complete(&prompt).await.map_err(|e| e.to_string())?;
        Ok(ToolResult::ok(json!({
            "kol_id": kol.id,
            "campaign_id": campaign.map(|c| c.id),
            "draft": draft.trim(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::store::seed;
    use crate::tools::{Tool, TypedToolAdaptor};

    fn ctx() -> ToolContext {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.with_conn(seed::seed_demo_kols).unwrap();
        ToolContext::new("u1", "manager", "s1", db)
    }

    #[tokio::test]
    async fn test_send_records_message() {
        let ctx = ctx();
        let tool = TypedToolAdaptor::new(SendMessageTool::new(Arc::new(StoreChannel)));
        let result = tool
            .execute(json!({"chat_id": "chat-1", "content": "Hello!", "kol_id": "kol-001"}), &ctx)
            .await
            .unwrap();
        assert!(result.success());
        let sent = ctx
            .store
            .with_conn(|c| messages::list_for_chat(c, "chat-1"))
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, result.data().unwrap()["message_id"]);
        assert!(tool.validate(&json!({"chat_id": "c", "content": " "})).is_err());
    }

    #[tokio::test]
    async fn test_generate_uses_llm_draft() {
        let llm = Arc::new(MockLlmClient::scripted(["Hi Min-ji, we'd love to work with you!"]));
        let tool = TypedToolAdaptor::new(GenerateMessageTool::new(llm.clone()));
        let result = tool
            .execute(json!({"kol_id": "kol-001", "tone": "formal"}), &ctx())
            .await
            .unwrap();
        assert_eq!(
            result.data().unwrap()["draft"],
            "Hi Min-ji, we'd love to work with you!"
        );
        let requests = llm.requests();
        let prompt = &requests[0];
        assert!(prompt[0].content.contains("formal"));
        assert!(prompt[1].content.contains("Kim Min-ji"));

        let missing = tool
            .execute(json!({"kol_id": "kol-001", "campaign_id": "camp-x"}), &ctx())
            .await
            .unwrap();
        assert!(!missing.success());
    }
}

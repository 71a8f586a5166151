//! create_client：登记品牌客户

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::store::{clients, new_id, now_rfc3339, Client};
use crate::tools::{ToolContext, ToolResult, TypedTool};

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn is_email(s: &str) -> bool {
    let re = EMAIL_RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
    re.is_match(s)
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateClientParams {
    /// Brand or company name
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
}

pub struct CreateClientTool;

#[async_trait]
impl TypedTool for CreateClientTool {
    type Params = CreateClientParams;

    fn name(&self) -> &'static str {
        "create_client"
    }

    fn description(&self) -> &str {
        "Register a new brand client. Client names are unique per user."
    }

    fn check(&self, p: &CreateClientParams) -> Result<(), String> {
        if p.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if let Some(email) = &p.contact_email {
            if !is_email(email.trim()) {
                return Err(format!("contact_email is not a valid email address: {email}"));
            }
        }
        Ok(())
    }

    async fn run(&self, p: CreateClientParams, ctx: &ToolContext) -> Result<ToolResult, String> {
        let name = p.name.trim().to_string();
        let client = Client {
            id: new_id("client"),
            user_id: ctx.user_id.clone(),
            name: name.clone(),
            industry: p.industry.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            contact_email: p.contact_email.map(|s| s.trim().to_string()),
            created_at: now_rfc3339(),
        };

        let existing = ctx
            .store
            .with_conn(|conn| {
                if let Some(existing) = clients::find_by_name(conn, &name, &ctx.user_id)? {
                    return Ok(Some(existing));
                }
                clients::insert(conn, &client)?;
                Ok(None)
            })
            .map_err(|e| e.to_string())?;

        if let Some(existing) = existing {
            return Ok(ToolResult::failure(format!(
                "Client '{}' already exists with id {}",
                existing.name, existing.id
            )));
        }
        tracing::info!(client_id = %client.id, "client created");
        Ok(ToolResult::ok_with_message(
            json!({ "client_id": client.id, "client": client }),
            format!("Created client {name}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use crate::tools::{Tool, TypedToolAdaptor};
    use std::sync::Arc;

    #[test]
    fn test_email_validation() {
        let tool = TypedToolAdaptor::new(CreateClientTool);
        assert!(tool
            .validate(&json!({"name": "Glow Co", "contact_email": "not-an-email"}))
            .is_err());
        assert!(tool
            .validate(&json!({"name": "Glow Co", "contact_email": "pr@glow.co"}))
            .is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ctx = ToolContext::new("u1", "manager", "s1", db.clone());
        let tool = TypedToolAdaptor::new(CreateClientTool);

        let first = tool.execute(json!({"name": "Glow Co"}), &ctx).await.unwrap();
        assert!(first.success());
        assert!(first.data().unwrap()["client_id"]
            .as_str()
            .unwrap()
            .starts_with("client-"));

        let second = tool.execute(json!({"name": "glow co"}), &ctx).await.unwrap();
        assert!(!second.success());
        assert_eq!(db.with_conn(|c| clients::count(c, "u1")).unwrap(), 1);
    }
}

//! 强类型工具适配
//!
//! 领域工具实现 TypedTool：参数为带 JsonSchema 的结构体，schema 由 schemars 生成，
//! 校验 = 严格的 serde 反序列化 + 工具自定义的语义校验。TypedToolAdaptor 把它桥接为 `dyn Tool`。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::tools::{Tool, ToolContext, ToolResult};

#[async_trait]
pub trait TypedTool: Send + Sync + 'static {
    type Params: DeserializeOwned + JsonSchema + Send + Sync + 'static;

    fn name(&self) -> &'static str;

    fn description(&self) -> &str;

    /// 反序列化之后的语义校验（取值范围、日期先后等）
    fn check(&self, _params: &Self::Params) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, params: Self::Params, ctx: &ToolContext) -> Result<ToolResult, String>;
}

/// 将 TypedTool 适配为注册表中的 `dyn Tool`
pub struct TypedToolAdaptor<T: TypedTool> {
    inner: T,
    schema: Value,
}

impl<T: TypedTool> TypedToolAdaptor<T> {
    pub fn new(inner: T) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T::Params))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
        Self { inner, schema }
    }

    fn parse(&self, args: &Value) -> Result<T::Params, String> {
        // LLM 经常对无参工具给出 null
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args.clone()
        };
        let params: T::Params = serde_json::from_value(args).map_err(|e| e.to_string())?;
        self.inner.check(&params)?;
        Ok(params)
    }
}

#[async_trait]
impl<T: TypedTool> Tool for TypedToolAdaptor<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn validate(&self, args: &Value) -> Result<Value, String> {
        self.parse(args)?;
        Ok(if args.is_null() {
            Value::Object(Default::default())
        } else {
            args.clone()
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolResult, String> {
        let params = self.parse(&args)?;
        self.inner.run(params, ctx).await
    }
}

//! KOL Agent - 网红营销智能体编排核心
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排器、构建器、状态机、错误与恢复、会话监管
//! - **ledger**: 可撤销的动作日志与补偿
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与嵌入
//! - **memory**: 对话消息、会话持久化与 TTL 缓存
//! - **observability**: 日志初始化
//! - **react**: Planner、工作区上下文、工具调用主循环
//! - **store**: SQLite 存储（KOL、客户、活动、消息）
//! - **tools**: 工具注册表、执行器与领域工具

pub mod config;
pub mod core;
pub mod ledger;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod store;
pub mod tools;

pub use crate::core::{AgentBuilder, Orchestrator, SessionContext, TurnResponse};

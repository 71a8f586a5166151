//! 编排器集成测试：Mock LLM + 内存数据库，覆盖完整轮次、历史持久化、动作日志与撤销

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use kol_agent::config::AppConfig;
    use kol_agent::core::{AgentBuilder, AgentError, Orchestrator, SessionContext};
    use kol_agent::llm::{HashingEmbedder, LlmError, MockLlmClient};
    use kol_agent::memory::Role;
    use kol_agent::store::Database;
    use kol_agent::tools::{Tool, ToolContext, ToolResult};
    use serde_json::{json, Value};

    /// 返回固定数据的桩工具
    struct StubTool {
        name: &'static str,
        data: Value,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "returns canned data"
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            Ok(ToolResult::ok(self.data.clone()))
        }
    }

    /// 记录进入 / 退出顺序的慢工具
    struct TracingTool {
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for TracingTool {
        fn name(&self) -> &str {
            "slow_lookup"
        }

        fn description(&self) -> &str {
            "records enter/exit"
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolResult, String> {
            self.events.lock().unwrap().push("enter".into());
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.events.lock().unwrap().push("exit".into());
            Ok(ToolResult::ok(json!({"ok": true})))
        }
    }

    fn config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.agent.retry_base_delay_ms = 1;
        cfg.agent.retry_max_delay_ms = 2;
        cfg
    }

    fn session() -> SessionContext {
        SessionContext::new("sess-1", "user-1", "manager")
    }

    fn with_stubs(llm: Arc<MockLlmClient>, stubs: Vec<Arc<dyn Tool>>) -> Orchestrator {
        let mut builder = AgentBuilder::new(config())
            .with_database(Arc::new(Database::open_in_memory().unwrap()))
            .with_llm(llm)
            .without_domain_tools();
        for stub in stubs {
            builder = builder.with_tool(stub);
        }
        builder.build().unwrap()
    }

    fn with_domain_tools(llm: Arc<MockLlmClient>) -> Orchestrator {
        let mut cfg = config();
        cfg.app.seed_demo_data = true;
        AgentBuilder::new(cfg)
            .with_database(Arc::new(Database::open_in_memory().unwrap()))
            .with_llm(llm)
            .with_embedder(Arc::new(HashingEmbedder::default()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_search_step_then_answer() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "search_kols", "args": {"country": "South Korea", "category": "beauty"}}"#,
            "I found 3 Korean beauty KOLs: Minji, Daeun and Yuna.",
        ]));
        let stub = Arc::new(StubTool {
            name: "search_kols",
            data: json!({"kols": [{"id": "k1"}, {"id": "k2"}, {"id": "k3"}], "count": 3}),
        });
        let orchestrator = with_stubs(llm, vec![stub]);

        let resp = orchestrator
            .process_turn(&session(), "Find Korean beauty influencers")
            .await;
        assert!(resp.success);
        assert_eq!(resp.steps.len(), 1);
        assert_eq!(resp.steps[0].tool_name, "search_kols");
        assert!(resp.message.contains('3'));
        assert_eq!(resp.metadata.tools_used, vec!["search_kols".to_string()]);
        assert_eq!(resp.metadata.steps_executed, 1);
        assert_eq!(resp.metadata.stop_reason, "final_answer");
        assert_eq!(
            resp.metadata.context_gathered,
            vec!["campaign_counts", "kol_pool", "clients", "recent_campaigns"]
        );
    }

    #[tokio::test]
    async fn test_reversible_step_is_recorded_and_undone_once() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "create_campaign", "args": {"name": "Spring"}}"#,
            "Created campaign camp-123.",
        ]));
        let stub = Arc::new(StubTool {
            name: "create_campaign",
            data: json!({"campaign_id": "camp-123"}),
        });
        let orchestrator = with_stubs(llm, vec![stub]);
        let s = session();

        let resp = orchestrator.process_turn(&s, "Create a spring campaign").await;
        assert!(resp.success);

        let actions = orchestrator
            .list_reversible_actions(&s.session_id, &s.user_id)
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].entity_type, "campaign");
        assert_eq!(actions[0].entity_id, "camp-123");
        assert_eq!(actions[0].tool_name, "create_campaign");

        // 其他用户不能撤销
        assert!(matches!(
            orchestrator.undo_action(&actions[0].id, "someone-else"),
            Err(AgentError::UndoConflict(_))
        ));
        assert!(orchestrator.undo_action(&actions[0].id, &s.user_id).unwrap());
        assert!(matches!(
            orchestrator.undo_action(&actions[0].id, &s.user_id),
            Err(AgentError::UndoConflict(_))
        ));
        assert!(orchestrator
            .list_reversible_actions(&s.session_id, &s.user_id)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_history_persists_across_turns() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "lookup", "args": {}}"#,
            "First answer.",
            "Second answer.",
        ]));
        let stub = Arc::new(StubTool {
            name: "lookup",
            data: json!({"value": 42}),
        });
        let orchestrator = with_stubs(llm.clone(), vec![stub]);
        let s = session();

        orchestrator.process_turn(&s, "first question").await;
        let second = orchestrator.process_turn(&s, "second question").await;
        assert!(second.success);
        assert!(second.steps.is_empty());

        let history = orchestrator.history(&s.session_id).unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "first question");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "First answer.");
        let meta = history[1].metadata.as_ref().unwrap();
        assert_eq!(meta["steps"].as_array().unwrap().len(), 1);
        assert_eq!(meta["stop_reason"], "final_answer");
        assert_eq!(history[3].content, "Second answer.");

        // 第二轮规划时能看到第一轮的问答
        let last_request = llm.requests().pop().unwrap();
        assert!(last_request.iter().any(|m| m.content == "First answer."));
        assert_eq!(last_request.last().unwrap().content, "second question");
    }

    #[tokio::test]
    async fn test_planning_failure_apologises() {
        let llm = Arc::new(MockLlmClient::with_results([Err(LlmError::Api(
            "invalid api key".into(),
        ))]));
        let orchestrator = with_stubs(llm, Vec::new());

        let resp = orchestrator.process_turn(&session(), "hello").await;
        assert!(!resp.success);
        assert!(resp.message.starts_with("Sorry"));
        assert_eq!(resp.metadata.stop_reason, "planning_failed");
        assert!(resp.steps.is_empty());
    }

    #[tokio::test]
    async fn test_same_session_turns_are_serialized() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let call = r#"{"tool": "slow_lookup", "args": {}}"#;
        let llm = Arc::new(MockLlmClient::scripted([call, "done one", call, "done two"]));
        let orchestrator = with_stubs(
            llm,
            vec![Arc::new(TracingTool {
                events: events.clone(),
            })],
        );
        let s = session();

        let (a, b) = tokio::join!(
            orchestrator.process_turn(&s, "one"),
            orchestrator.process_turn(&s, "two")
        );
        assert!(a.success && b.success);
        assert_eq!(*events.lock().unwrap(), vec!["enter", "exit", "enter", "exit"]);
        assert_eq!(orchestrator.history(&s.session_id).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_domain_tools_end_to_end_with_undo() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "create_client", "args": {"name": "Glow Cosmetics", "industry": "beauty"}}"#,
            "Client Glow Cosmetics created.",
            "You have one client now.",
        ]));
        let orchestrator = with_domain_tools(llm.clone());
        let s = session();

        let resp = orchestrator.process_turn(&s, "Add Glow Cosmetics as a client").await;
        assert!(resp.success);
        assert!(resp.steps[0].result.success());

        let count_clients = |o: &Orchestrator| {
            o.store()
                .with_conn(|c| c.query_row("SELECT COUNT(*) FROM clients", [], |r| r.get::<_, i64>(0)))
                .unwrap()
        };
        assert_eq!(count_clients(&orchestrator), 1);

        // 变更类步骤成功后上下文缓存失效，下一轮看到新客户
        orchestrator.process_turn(&s, "How many clients?").await;
        let requests = llm.requests();
        assert!(requests[0][0].content.contains("- Clients: 0"));
        assert!(requests[2][0].content.contains("- Clients: 1"));

        let actions = orchestrator
            .list_reversible_actions(&s.session_id, &s.user_id)
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].entity_type, "client");
        assert!(orchestrator.undo_action(&actions[0].id, &s.user_id).unwrap());
        assert_eq!(count_clients(&orchestrator), 0);
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_abort_turn() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"tool": "get_kol_details", "args": {"kol_id": "kol-999"}}"#,
            "That KOL does not exist.",
        ]));
        let orchestrator = with_domain_tools(llm.clone());

        let resp = orchestrator.process_turn(&session(), "Show kol-999").await;
        assert!(resp.success);
        assert_eq!(resp.steps.len(), 1);
        assert!(!resp.steps[0].result.success());
        assert!(orchestrator
            .list_reversible_actions("sess-1", "user-1")
            .unwrap()
            .is_empty());
        // 失败结果作为观察回传给规划
        let requests = llm.requests();
        let second = &requests[1];
        assert!(second
            .iter()
            .any(|m| m.content.contains("KOL not found")));
    }
}

//! KOL Agent 控制台
//!
//! 入口：加载配置、初始化日志、构建编排器，在终端中逐行对话。
//! 命令：/actions 列出可撤销动作，/undo <id> 撤销，/history 查看历史，/clear 清空，/quit 退出。

use std::path::PathBuf;

use anyhow::Context;
use kol_agent::config::load_config;
use kol_agent::observability;
use kol_agent::react::AgentEvent;
use kol_agent::{AgentBuilder, Orchestrator, SessionContext};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::ToolCall { tool, args } => println!("  -> {} {}", tool, args),
        AgentEvent::Observation {
            tool,
            success,
            preview,
        } => println!("  <- {} [{}] {}", tool, if *success { "ok" } else { "err" }, preview),
        AgentEvent::Recovery { action, detail } => println!("  ~ {}: {}", action, detail),
        AgentEvent::Error { text } => println!("  ! {}", text),
        _ => {}
    }
}

async fn handle_command(
    orchestrator: &Orchestrator,
    session: &SessionContext,
    line: &str,
) -> anyhow::Result<bool> {
    let mut parts = line.split_whitespace();
    match parts.next().unwrap_or_default() {
        "/quit" | "/exit" => return Ok(false),
        "/actions" => {
            let actions = orchestrator.list_reversible_actions(&session.session_id, &session.user_id)?;
            if actions.is_empty() {
                println!("No reversible actions.");
            }
            for a in actions {
                println!("{}  {}  {} {}  {}", a.id, a.created_at, a.entity_type, a.entity_id, a.tool_name);
            }
        }
        "/undo" => match parts.next() {
            Some(id) => match orchestrator.undo_action(id, &session.user_id) {
                Ok(_) => println!("Undone {}", id),
                Err(e) => println!("Undo failed: {}", e),
            },
            None => println!("Usage: /undo <action_id>"),
        },
        "/history" => {
            for m in orchestrator.history(&session.session_id)? {
                println!("[{:?}] {}", m.role, m.content);
            }
        }
        "/clear" => {
            orchestrator.clear_history(&session.session_id)?;
            println!("History cleared.");
        }
        other => println!("Unknown command: {}", other),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;
    let session = SessionContext::new(
        uuid::Uuid::new_v4().to_string(),
        config.app.user_id.clone(),
        config.app.user_role.clone(),
    );
    let orchestrator = AgentBuilder::new(config)
        .with_system_prompt_from_file()
        .build()
        .context("Failed to create agent")?;

    println!(
        "KOL Agent ready ({} tools). Type /quit to exit.",
        orchestrator.tool_names().len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('/') {
            if !handle_command(&orchestrator, &session, line).await? {
                break;
            }
            continue;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                print_event(&event);
            }
        });
        let response = orchestrator
            .process_turn_with_events(&session, line, Some(&tx))
            .await;
        drop(tx);
        let _ = printer.await;

        println!("{}", response.message);
        tracing::debug!(
            steps = response.metadata.steps_executed,
            stop_reason = %response.metadata.stop_reason,
            ms = response.total_execution_time_ms,
            "turn finished"
        );
    }
    Ok(())
}

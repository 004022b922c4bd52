//! 命令执行：把CLI子命令接到编排器、检索与存储上

use anyhow::{Context, Result, anyhow, bail};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::Command;
use crate::config::Config;
use crate::llm::LLMClient;
use crate::orchestrator::{Orchestrator, RunResult};
use crate::pipeline::{AgentStatus, RunStatus, StatusHandle};
use crate::retrieval::{ContextBuilder, Indexer, LocalVectorIndex};
use crate::storage::{ChatRecord, ChatStore, Role, SqliteChatStore};
use crate::utils::text::truncate_chars;

/// --watch 模式下的轮询间隔
const WATCH_INTERVAL: Duration = Duration::from_millis(250);

/// 执行一个子命令
pub async fn launch(config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Ask {
            query,
            chat,
            json,
            watch,
            ..
        } => ask(config, &query, chat, json, watch).await,
        Command::Index { rebuild, .. } => index(config, rebuild).await,
        Command::History { search } => history(config, search.as_deref()),
        Command::Show { chat_id } => show(config, chat_id),
        Command::Sources { chat_id, top_k } => sources(config, chat_id, top_k).await,
        Command::Export { chat_id, path } => export(config, chat_id, &path),
        Command::Delete { chat_id } => delete(config, chat_id),
    }
}

fn open_store(config: &Config) -> Result<Arc<SqliteChatStore>> {
    let store = SqliteChatStore::open_at(&config.storage.db_path).context(format!(
        "Failed to open chat database {:?}",
        config.storage.db_path
    ))?;
    Ok(Arc::new(store))
}

async fn open_index(config: &Config) -> Result<LocalVectorIndex> {
    LocalVectorIndex::open(&config.retrieval.persist_dir)
        .await
        .context(format!(
            "Failed to open vector index {:?}",
            config.retrieval.persist_dir
        ))
}

async fn ask(
    config: &Config,
    query: &str,
    follow_up: Option<i64>,
    json: bool,
    watch: bool,
) -> Result<()> {
    let store = open_store(config)?;
    if let Some(chat_id) = follow_up
        && store.get_chat(chat_id)?.is_none()
    {
        bail!("Chat {} not found", chat_id);
    }

    let llm = LLMClient::new(config.llm.clone())?;
    if !json {
        llm.check_connection().await?;
    }

    let index = open_index(config).await?;
    if index.is_empty().await && !json {
        println!("⚠️ 向量索引为空，可先运行 `index` 子命令建立索引");
    }

    let orchestrator =
        Orchestrator::from_config(config, Arc::new(llm), Arc::new(index), store.clone());

    let status = orchestrator.new_status();
    let result = if watch {
        run_watched(&orchestrator, query, &status).await
    } else {
        orchestrator.run_with_status(query, &status).await
    };

    let recorded = record_turn(store.as_ref(), query, &result, follow_up)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if result.is_error() {
            println!("❌ {}", result.response);
        } else {
            println!("{} {}\n", agent_icon(&result.agent), result.agent);
            println!("{}", result.response);
        }
        if let Some(chat_id) = recorded {
            println!("\n💾 对话已保存: #{}", chat_id);
        }
    }
    Ok(())
}

/// 运行的同时轮询状态并打印变化
async fn run_watched(orchestrator: &Orchestrator, query: &str, status: &StatusHandle) -> RunResult {
    let run = orchestrator.run_with_status(query, status);
    tokio::pin!(run);

    let mut watcher = StatusWatcher::default();
    let mut ticker = tokio::time::interval(WATCH_INTERVAL);
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            _ = ticker.tick() => {
                for line in watcher.changes(&status.snapshot()) {
                    println!("{}", line);
                }
            }
        }
    };

    for line in watcher.changes(&status.snapshot()) {
        println!("{}", line);
    }
    println!();
    result
}

/// 把一问一答写入对话消息。追问时写入指定对话并更新其摘要，返回写入的对话ID
pub fn record_turn(
    store: &dyn ChatStore,
    query: &str,
    result: &RunResult,
    follow_up: Option<i64>,
) -> Result<Option<i64>> {
    let chat_id = match (follow_up, result.chat_id) {
        (Some(chat_id), _) => {
            if !result.is_error() {
                store.update_chat_response(chat_id, &result.agent, &result.response)?;
            }
            chat_id
        }
        (None, Some(chat_id)) => chat_id,
        (None, None) => return Ok(None),
    };

    store.add_message(chat_id, Role::User, query)?;
    store.add_message(chat_id, Role::Agent, &result.response)?;
    Ok(Some(chat_id))
}

/// 记录上一次看到的状态，只输出变化的部分
#[derive(Debug, Default)]
pub struct StatusWatcher {
    phase: Option<String>,
    agents: HashMap<String, AgentStatus>,
}

impl StatusWatcher {
    pub fn changes(&mut self, snapshot: &RunStatus) -> Vec<String> {
        let mut lines = Vec::new();

        let phase = snapshot.phase_text();
        if self.phase.as_deref() != Some(phase.as_str()) {
            lines.push(format!("🔄 {}", phase));
            self.phase = Some(phase);
        }

        for record in &snapshot.agents {
            if self.agents.get(&record.name) == Some(&record.status) {
                continue;
            }
            self.agents.insert(record.name.clone(), record.status);
            let line = match record.status {
                AgentStatus::Pending => continue,
                AgentStatus::Running => format!("   ⏳ {} running", record.name),
                AgentStatus::Done => format!("   ✅ {} done", record.name),
                AgentStatus::Error => format!(
                    "   ❌ {} failed: {}",
                    record.name,
                    record.error.as_deref().unwrap_or("unknown error")
                ),
            };
            lines.push(line);
        }

        lines
    }
}

/// 按智能体名称选择展示图标
pub fn agent_icon(agent: &str) -> &'static str {
    let lowered = agent.to_lowercase();
    if lowered.contains("impact") {
        "🔍"
    } else if lowered.contains("blueprint") || lowered.contains("generate") {
        "🧭"
    } else if lowered.contains("doc") {
        "📄"
    } else {
        "💬"
    }
}

/// 历史列表中的一行
pub fn format_chat_line(chat: &ChatRecord) -> String {
    format!(
        "{} {} #{} | {}\n    {}",
        chat.created_at.format("%Y-%m-%d %H:%M:%S"),
        agent_icon(&chat.agent_name),
        chat.id,
        chat.agent_name,
        truncate_chars(chat.query.trim(), 80)
    )
}

async fn index(config: &Config, rebuild: bool) -> Result<()> {
    let index = open_index(config).await?;
    let root = &config.retrieval.source_dir;
    println!("🚀 正在索引 {}", root.display());

    let report = Indexer::new(&config.retrieval)
        .index_directory(&index, root, rebuild)
        .await
        .context("Failed to index source directory")?;

    println!(
        "✅ 索引完成: {} 个文件, {} 个分片 (跳过 {} 个文件)",
        report.files_indexed, report.chunks, report.files_skipped
    );
    Ok(())
}

fn history(config: &Config, search: Option<&str>) -> Result<()> {
    let store = open_store(config)?;
    let chats = match search {
        Some(text) => store.search_chats(text)?,
        None => store.get_all_chats()?,
    };

    if chats.is_empty() {
        println!("📭 暂无对话记录");
        return Ok(());
    }
    for chat in &chats {
        println!("{}", format_chat_line(chat));
    }
    Ok(())
}

fn find_chat(store: &dyn ChatStore, chat_id: i64) -> Result<ChatRecord> {
    store
        .get_chat(chat_id)?
        .ok_or_else(|| anyhow!("Chat {} not found", chat_id))
}

fn show(config: &Config, chat_id: i64) -> Result<()> {
    let store = open_store(config)?;
    let chat = find_chat(store.as_ref(), chat_id)?;

    println!("{}\n", format_chat_line(&chat));
    println!("{}", chat.response);

    let messages = store.get_chat_messages(chat_id)?;
    if !messages.is_empty() {
        println!("\n--- messages ---");
        for message in messages {
            println!(
                "[{}] {}: {}",
                message.created_at.format("%H:%M:%S"),
                message.role,
                message.content
            );
        }
    }
    Ok(())
}

async fn sources(config: &Config, chat_id: i64, top_k: Option<usize>) -> Result<()> {
    let store = open_store(config)?;
    let chat = find_chat(store.as_ref(), chat_id)?;
    let index = open_index(config).await?;

    let builder = ContextBuilder::new(Arc::new(index), config.retrieval.max_context_chars);
    let hits = builder
        .sources(&chat.query, top_k.unwrap_or(config.retrieval.top_k))
        .await;

    if hits.is_empty() {
        println!("📭 没有检索到相关文档");
        return Ok(());
    }
    for (source, document) in hits {
        println!("📄 {}", source);
        println!("{}\n", truncate_chars(document.trim(), 200));
    }
    Ok(())
}

fn export(config: &Config, chat_id: i64, path: &Path) -> Result<()> {
    let store = open_store(config)?;
    let json = store.export_chat(chat_id)?;
    std::fs::write(path, json).context(format!("Failed to write {:?}", path))?;
    println!("✅ 对话 #{} 已导出到 {}", chat_id, path.display());
    Ok(())
}

fn delete(config: &Config, chat_id: i64) -> Result<()> {
    let store = open_store(config)?;
    if store.delete_chat(chat_id)? {
        println!("✅ 对话 #{} 已删除", chat_id);
    } else {
        println!("⚠️ 对话 #{} 不存在", chat_id);
    }
    Ok(())
}

// Include tests
#[cfg(test)]
mod tests;

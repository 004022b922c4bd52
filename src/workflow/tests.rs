use crate::cli::Command;
use crate::config::Config;
use crate::orchestrator::RunResult;
use crate::pipeline::{AgentStatus, RunPhase, StatusHandle, Strategy};
use crate::storage::{ChatExport, ChatStore, Role, SqliteChatStore};
use crate::workflow::{StatusWatcher, agent_icon, launch, record_turn};
use std::fs;
use tempfile::TempDir;

fn test_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.db_path = temp_dir.path().join("data/chats.db");
    config.retrieval.persist_dir = temp_dir.path().join("data/index");
    config.retrieval.source_dir = temp_dir.path().join("project");
    config
}

fn ok_result(chat_id: i64) -> RunResult {
    RunResult {
        chat_id: Some(chat_id),
        agent: "UnderstandingAgent".to_string(),
        response: "The router dispatches requests.".to_string(),
    }
}

#[test]
fn test_agent_icon() {
    assert_eq!(agent_icon("UnderstandingAgent,ImpactAnalyzerAgent"), "🔍");
    assert_eq!(agent_icon("UnderstandingAgent,ImpactAnalyzerAgent,BlueprintGeneratorAgent"), "🔍");
    assert_eq!(agent_icon("BlueprintGeneratorAgent"), "🧭");
    assert_eq!(agent_icon("DocGeneratorAgent"), "📄");
    assert_eq!(agent_icon("UnderstandingAgent"), "💬");
    assert_eq!(agent_icon("error"), "💬");
}

#[test]
fn test_record_turn_new_chat() {
    let store = SqliteChatStore::open_in_memory().unwrap();
    let chat_id = store
        .add_chat("Explain the router", "UnderstandingAgent", "The router dispatches requests.")
        .unwrap();

    let recorded = record_turn(&store, "Explain the router", &ok_result(chat_id), None).unwrap();
    assert_eq!(recorded, Some(chat_id));

    let messages = store.get_chat_messages(chat_id).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "Explain the router");
    assert_eq!(messages[1].role, Role::Agent);
}

#[test]
fn test_record_turn_follow_up_updates_summary() {
    let store = SqliteChatStore::open_in_memory().unwrap();
    let original = store.add_chat("first", "UnderstandingAgent", "old").unwrap();
    let new_row = store.add_chat("second", "DocGeneratorAgent", "new").unwrap();

    let result = RunResult {
        chat_id: Some(new_row),
        agent: "DocGeneratorAgent".to_string(),
        response: "new".to_string(),
    };
    let recorded = record_turn(&store, "second", &result, Some(original)).unwrap();
    assert_eq!(recorded, Some(original));

    let chat = store.get_chat(original).unwrap().unwrap();
    assert_eq!(chat.agent_name, "DocGeneratorAgent");
    assert_eq!(chat.response, "new");
    assert_eq!(store.get_chat_messages(original).unwrap().len(), 2);
    assert!(store.get_chat_messages(new_row).unwrap().is_empty());
}

#[test]
fn test_record_turn_error_without_chat() {
    let store = SqliteChatStore::open_in_memory().unwrap();
    let recorded = record_turn(&store, "q", &RunResult::error("boom"), None).unwrap();
    assert_eq!(recorded, None);
    assert!(store.get_all_chats().unwrap().is_empty());
}

#[test]
fn test_record_turn_error_keeps_follow_up_summary() {
    let store = SqliteChatStore::open_in_memory().unwrap();
    let chat_id = store.add_chat("first", "UnderstandingAgent", "old").unwrap();

    record_turn(&store, "again", &RunResult::error("boom"), Some(chat_id)).unwrap();

    let chat = store.get_chat(chat_id).unwrap().unwrap();
    assert_eq!(chat.response, "old");
    let messages = store.get_chat_messages(chat_id).unwrap();
    assert_eq!(messages[1].content, "Agent error: boom");
}

#[test]
fn test_status_watcher_reports_only_changes() {
    let status = StatusHandle::default();
    let mut watcher = StatusWatcher::default();

    status.set_phase(RunPhase::RunningAgents);
    status.set_strategy(Strategy::Sequence);
    status.register_agents(&["UnderstandingAgent".to_string()]);
    let lines = watcher.changes(&status.snapshot());
    assert_eq!(lines, vec!["🔄 Running agents (sequence)".to_string()]);

    assert!(watcher.changes(&status.snapshot()).is_empty());

    status.update_agent("UnderstandingAgent", AgentStatus::Running, None, None);
    status.update_agent("UnderstandingAgent", AgentStatus::Error, None, Some("timeout"));
    let lines = watcher.changes(&status.snapshot());
    assert_eq!(
        lines,
        vec!["   ❌ UnderstandingAgent failed: timeout".to_string()]
    );
}

#[tokio::test]
async fn test_export_and_delete_commands() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);

    let store = SqliteChatStore::open_at(&config.storage.db_path).unwrap();
    let chat_id = store.add_chat("q", "UnderstandingAgent", "answer").unwrap();
    store.add_message(chat_id, Role::User, "q").unwrap();
    drop(store);

    let path = temp_dir.path().join("chat.json");
    launch(
        &config,
        Command::Export {
            chat_id,
            path: path.clone(),
        },
    )
    .await
    .unwrap();

    let export: ChatExport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(export.chat.id, chat_id);
    assert_eq!(export.messages.len(), 1);

    launch(&config, Command::Delete { chat_id }).await.unwrap();
    let store = SqliteChatStore::open_at(&config.storage.db_path).unwrap();
    assert!(store.get_chat(chat_id).unwrap().is_none());

    // 不存在的对话不算错误
    launch(&config, Command::Delete { chat_id }).await.unwrap();
}

#[tokio::test]
async fn test_show_and_export_missing_chat_fail() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);

    assert!(launch(&config, Command::Show { chat_id: 42 }).await.is_err());
    assert!(
        launch(
            &config,
            Command::Export {
                chat_id: 42,
                path: temp_dir.path().join("x.json")
            }
        )
        .await
        .is_err()
    );
}

#[tokio::test]
async fn test_index_then_sources() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);

    let project = &config.retrieval.source_dir;
    fs::create_dir_all(project.join("src")).unwrap();
    fs::write(
        project.join("src/router.rs"),
        "pub fn route_request(path: &str) -> Handler { lookup(path) }\n",
    )
    .unwrap();

    launch(
        &config,
        Command::Index {
            rebuild: true,
            source_dir: None,
        },
    )
    .await
    .unwrap();
    assert!(config.retrieval.persist_dir.join("index.json").exists());

    let store = SqliteChatStore::open_at(&config.storage.db_path).unwrap();
    let chat_id = store
        .add_chat("how does route_request work", "UnderstandingAgent", "…")
        .unwrap();
    drop(store);

    launch(
        &config,
        Command::Sources {
            chat_id,
            top_k: Some(3),
        },
    )
    .await
    .unwrap();

    launch(&config, Command::History { search: Some("route".to_string()) })
        .await
        .unwrap();
    launch(&config, Command::Show { chat_id }).await.unwrap();
}

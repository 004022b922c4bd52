use crate::cli::{Args, Command};
use crate::config::LLMProvider;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

#[test]
fn test_ask_defaults() {
    let args = Args::try_parse_from(["agentic-architect", "ask", "Explain the router"]).unwrap();

    assert_eq!(
        args.command,
        Command::Ask {
            query: "Explain the router".to_string(),
            chat: None,
            json: false,
            watch: false,
            top_k: None,
        }
    );
    assert!(!args.verbose);
    assert!(!args.keyword_intent);
    assert!(args.config.is_none());
}

#[test]
fn test_ask_options() {
    let args = Args::try_parse_from([
        "agentic-architect",
        "ask",
        "impact of X",
        "--chat",
        "12",
        "--json",
        "--watch",
        "--top-k",
        "8",
    ])
    .unwrap();

    assert_eq!(
        args.command,
        Command::Ask {
            query: "impact of X".to_string(),
            chat: Some(12),
            json: true,
            watch: true,
            top_k: Some(8),
        }
    );
}

#[test]
fn test_global_options_after_subcommand() {
    let args = Args::try_parse_from([
        "agentic-architect",
        "history",
        "--search",
        "cache",
        "-v",
        "--db-path",
        "/tmp/chats.db",
    ])
    .unwrap();

    assert!(args.verbose);
    assert_eq!(args.db_path, Some(PathBuf::from("/tmp/chats.db")));
    assert_eq!(
        args.command,
        Command::History {
            search: Some("cache".to_string())
        }
    );
}

#[test]
fn test_other_subcommands() {
    let parse = |argv: &[&str]| Args::try_parse_from(argv).unwrap().command;

    assert_eq!(
        parse(&["a", "index", "--rebuild"]),
        Command::Index {
            rebuild: true,
            source_dir: None
        }
    );
    assert_eq!(parse(&["a", "show", "3"]), Command::Show { chat_id: 3 });
    assert_eq!(
        parse(&["a", "sources", "3", "--top-k", "2"]),
        Command::Sources {
            chat_id: 3,
            top_k: Some(2)
        }
    );
    assert_eq!(
        parse(&["a", "export", "3", "out.json"]),
        Command::Export {
            chat_id: 3,
            path: PathBuf::from("out.json")
        }
    );
    assert_eq!(parse(&["a", "delete", "9"]), Command::Delete { chat_id: 9 });
}

#[test]
fn test_missing_subcommand_is_error() {
    assert!(Args::try_parse_from(["agentic-architect"]).is_err());
    assert!(Args::try_parse_from(["agentic-architect", "show", "abc"]).is_err());
}

#[test]
fn test_to_config_applies_overrides() {
    let args = Args::try_parse_from([
        "agentic-architect",
        "--llm-provider",
        "openai",
        "--llm-api-key",
        "test-key",
        "--llm-api-base-url",
        "https://api.example.com/v1",
        "--model",
        "gpt-4o-mini",
        "--temperature",
        "0.7",
        "--max-tokens",
        "2048",
        "--index-dir",
        "/tmp/index",
        "--keyword-intent",
        "ask",
        "hello",
        "--top-k",
        "9",
    ])
    .unwrap();

    let config = args.to_config().unwrap();
    assert_eq!(config.llm.provider, LLMProvider::OpenAI);
    assert_eq!(config.llm.api_key, "test-key");
    assert_eq!(config.llm.api_base_url, "https://api.example.com/v1");
    assert_eq!(config.llm.model, "gpt-4o-mini");
    assert_eq!(config.llm.temperature, 0.7);
    assert_eq!(config.llm.max_tokens, 2048);
    assert_eq!(config.retrieval.persist_dir, PathBuf::from("/tmp/index"));
    assert_eq!(config.retrieval.top_k, 9);
    assert!(!config.orchestrator.llm_intent_detection);
}

#[test]
fn test_to_config_unknown_provider_keeps_configured() {
    let args = Args::try_parse_from([
        "agentic-architect",
        "--llm-provider",
        "mistral",
        "show",
        "1",
    ])
    .unwrap();

    let config = args.to_config().unwrap();
    assert_eq!(config.llm.provider, LLMProvider::Gemini);
}

#[test]
fn test_to_config_reads_file_then_overrides() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[llm]
provider = "ollama"
model = "llama3"

[retrieval]
top_k = 3
source_dir = "/srv/code"
"#
    )
    .unwrap();

    let path = file.path().to_string_lossy().to_string();
    let args = Args::try_parse_from([
        "agentic-architect",
        "--config",
        path.as_str(),
        "--model",
        "qwen2.5",
        "index",
        "--source-dir",
        "/srv/other",
    ])
    .unwrap();

    let config = args.to_config().unwrap();
    assert_eq!(config.llm.provider, LLMProvider::Ollama);
    assert_eq!(config.llm.model, "qwen2.5");
    assert_eq!(config.retrieval.top_k, 3);
    assert_eq!(config.retrieval.source_dir, PathBuf::from("/srv/other"));
}

#[test]
fn test_to_config_missing_file_is_error() {
    let args = Args::try_parse_from([
        "agentic-architect",
        "--config",
        "/definitely/not/here.toml",
        "history",
    ])
    .unwrap();
    assert!(args.to_config().is_err());
}

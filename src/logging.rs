use tracing_subscriber::{EnvFilter, fmt};

/// 初始化日志：RUST_LOG 优先，否则按 verbose 选择级别。日志写到stderr，不干扰 --json 输出。
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // 重复初始化（如测试中）时忽略
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "agentic_architect=debug,info"
    } else {
        "agentic_architect=info,warn"
    }
}

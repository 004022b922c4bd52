pub mod agents;
pub mod cli;
pub mod config;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod retrieval;
pub mod storage;
pub mod utils;
pub mod workflow;

// Re-export commonly used types
pub use config::Config;
pub use orchestrator::{Orchestrator, RunResult};
pub use workflow::launch;

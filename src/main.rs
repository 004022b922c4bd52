use agentic_architect::{cli, launch, logging};
use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let args = cli::Args::parse();
    let config = args.to_config()?;
    logging::init(config.verbose);

    launch(&config, args.command).await
}

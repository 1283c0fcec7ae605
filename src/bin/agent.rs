use clap::Parser;

use rust_metrics_pipeline::{agent, config::AgentConfig, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::parse();
    logging::init(&config.log_level);

    agent::run(config).await?;
    Ok(())
}

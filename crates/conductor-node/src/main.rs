use anyhow::{Context, Result};
use conductor_node::config::NodeConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment variables
    let config = NodeConfig::load().context("Failed to load configuration")?;

    // Run the node using the library's run function
    conductor_node::run(config).await.context("Node error")?;

    Ok(())
}

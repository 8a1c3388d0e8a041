//!
//! Conductor node - composition root for one coordination process
//!
//! Opens the document store, prepares its indexes, joins the backplane and keeps
//! the local definition registry converged with storage.

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Node wiring module
pub mod node;

/// Local definition registry
pub mod registry;

pub use config::{NodeConfig, StoreKind};
pub use error::{NodeError, NodeResult};
pub use node::ConductorNode;
pub use registry::InMemoryWorkflowRegistry;

use tracing::{info, warn};

/// Run a node until Ctrl-C
///
/// Startup order: logging, store, indexes, backplane, initial definition load,
/// backplane start, periodic sweep.
pub async fn run(config: NodeConfig) -> NodeResult<()> {
    conductor_monitoring::init_logging(&config.monitoring())
        .map_err(|e| NodeError::MonitoringError(e.to_string()))?;
    info!(store = %config.store_url, "Starting conductor node");

    let node = ConductorNode::build(&config).await?;
    node.run_until(config.sweep_interval(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C, shutting down");
        }
    })
    .await
}

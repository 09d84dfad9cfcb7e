pub mod config;
pub mod error;

pub use config::{Config, ServerConfig, StorageConfig, UiConfig, ValidationResult};
pub use error::{AppError, AuthError, ConfigError, RemoteError, StorageError};

use anyhow::Result;

/// Initialize logging for the tasksync binary.
///
/// Output goes to stderr so rendered task lists on stdout stay clean.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::debug!("tasksync core initialized");
    Ok(())
}

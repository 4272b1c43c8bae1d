//! Command implementations.

pub mod admin;
pub mod backup;
pub mod payments;

use std::path::PathBuf;

use thiserror::Error;

use tienda_admin::config::{AdminConfig, ConfigError};
use tienda_admin::db::RepositoryError;
use tienda_admin::services::{AdminAuthError, BackupError, ReconcileError};
use tienda_admin::state::{AppState, StateError};

/// Errors surfaced by any command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    State(#[from] StateError),

    #[error("{0}")]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Auth(#[from] AdminAuthError),

    #[error("{0}")]
    Backup(#[from] BackupError),

    #[error("{0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Invalid role: {0}. Valid roles: super_admin, admin, viewer")]
    InvalidRole(String),
}

/// Open the data directory with the services configured in the environment.
pub async fn open_state(data_dir: Option<PathBuf>) -> Result<AppState, CommandError> {
    let config = AdminConfig::for_cli(data_dir)?;
    tracing::debug!(data_dir = %config.data_dir.display(), "Opening data directory");
    Ok(AppState::new(config).await?)
}

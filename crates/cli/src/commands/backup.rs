//! Backup commands.

use tracing::{info, warn};

use tienda_admin::state::AppState;

use super::CommandError;

/// Take a backup now.
///
/// # Errors
///
/// Returns `CommandError::Backup` if a data file cannot be read or the
/// bundle cannot be written.
pub async fn create(state: &AppState, label: Option<&str>) -> Result<(), CommandError> {
    let backup = state.backups().create(label).await?;
    info!(
        "Backup created: {} ({} bytes) in {}",
        backup.name,
        backup.size,
        state.config().backup_dir.display()
    );
    Ok(())
}

/// List backups, newest first.
///
/// # Errors
///
/// Returns `CommandError::Backup` if the backup directory cannot be read.
pub async fn list(state: &AppState) -> Result<(), CommandError> {
    let backups = state.backups().list().await?;
    if backups.is_empty() {
        info!("No backups in {}", state.config().backup_dir.display());
        return Ok(());
    }

    for backup in backups {
        info!(
            "{:<40} {:>10} bytes  {}  {}",
            backup.name,
            backup.size,
            backup.created_at.to_rfc3339(),
            backup.label.unwrap_or_default()
        );
    }
    Ok(())
}

/// Restore a backup over the live data.
///
/// # Errors
///
/// Returns `CommandError::Backup` if the backup is missing or corrupt; the
/// live data is left untouched in that case.
pub async fn restore(state: &AppState, name: &str) -> Result<(), CommandError> {
    warn!("Restoring {} over {}", name, state.config().data_dir.display());
    let safety = state.backups().restore(name).await?;
    info!("Backup restored. Previous data saved as {}", safety.name);
    Ok(())
}

//! Backup route handlers.
//!
//! Creating a backup needs write access; restoring and deleting are
//! reserved for super admins.

use askama::Template;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::{FlashQuery, PageContext, check_csrf, non_empty, redirect_flash, render};
use crate::error::AppError;
use crate::filters;
use crate::middleware::{RequireAdminAuth, RequireSuperAdmin, RequireWriter};
use crate::services::{BackupError, BackupInfo};
use crate::state::AppState;

/// Longest accepted backup label.
const MAX_LABEL_LEN: usize = 80;

/// Backups page template.
#[derive(Template)]
#[template(path = "backups/index.html")]
pub struct BackupsTemplate {
    pub page: PageContext,
    pub backups: Vec<BackupView>,
    pub retention: usize,
    pub backup_dir: String,
}

#[derive(Debug, Clone)]
pub struct BackupView {
    pub name: String,
    pub label: String,
    pub created_at: String,
    pub size: String,
}

impl From<BackupInfo> for BackupView {
    fn from(info: BackupInfo) -> Self {
        Self {
            size: human_size(info.size),
            created_at: info.created_at.to_rfc3339(),
            label: info.label.unwrap_or_default(),
            name: info.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupForm {
    #[serde(default)]
    pub csrf_token: String,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BackupNameForm {
    #[serde(default)]
    pub csrf_token: String,
    pub name: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/backups", get(index).post(create))
        .route("/backups/restore", post(restore))
        .route("/backups/delete", post(delete))
        .route("/backups/{name}/download", get(download))
}

/// Backups page.
#[instrument(skip(admin, state, session, flash))]
async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>, AppError> {
    let backups = state.backups().list().await?;
    let template = BackupsTemplate {
        page: PageContext::new(&admin, &session, "/backups", &flash).await?,
        backups: backups.into_iter().map(BackupView::from).collect(),
        retention: state.config().backup_retention,
        backup_dir: state.config().backup_dir.display().to_string(),
    };
    Ok(render(&template))
}

/// Take a backup now.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn create(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CreateBackupForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    let label = non_empty(form.label.as_deref())
        .map(|label| label.chars().take(MAX_LABEL_LEN).collect::<String>());

    match state.backups().create(label.as_deref()).await {
        Ok(info) => {
            tracing::info!(name = %info.name, by = %admin.username, "Backup created from admin");
            Ok(redirect_flash("/backups", "success", "backup"))
        }
        Err(e) => {
            tracing::error!(error = %e, "Backup failed");
            Ok(redirect_flash("/backups", "error", "backup"))
        }
    }
}

/// Restore a backup over the live data files.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id, name = %form.name))]
async fn restore(
    RequireSuperAdmin(admin): RequireSuperAdmin,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<BackupNameForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;

    match state.backups().restore(&form.name).await {
        Ok(safety) => {
            tracing::warn!(
                restored = %form.name,
                safety_backup = %safety.name,
                by = %admin.username,
                "Backup restored"
            );
            Ok(redirect_flash("/backups", "success", "restored"))
        }
        Err(BackupError::Corrupt { .. }) => Ok(redirect_flash("/backups", "error", "restore")),
        Err(BackupError::NotFound(_) | BackupError::InvalidName(_)) => {
            Ok(redirect_flash("/backups", "error", "not_found"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete a backup file.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id, name = %form.name))]
async fn delete(
    RequireSuperAdmin(admin): RequireSuperAdmin,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<BackupNameForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;

    match state.backups().delete(&form.name).await {
        Ok(()) => Ok(redirect_flash("/backups", "success", "deleted")),
        Err(BackupError::NotFound(_) | BackupError::InvalidName(_)) => {
            Ok(redirect_flash("/backups", "error", "not_found"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Download a backup bundle.
#[instrument(skip(admin, state), fields(admin_id = %admin.id))]
async fn download(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let bytes = state.backups().read(&name).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    match bytes {
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{b} B"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(3 * 1024 * 1024 + 512 * 1024), "3.5 MB");
    }
}

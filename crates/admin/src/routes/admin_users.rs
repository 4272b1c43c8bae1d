//! Admin users management and the own-account page.

use askama::Template;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    response::{Html, Redirect},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use tienda_core::{AdminRole, AdminUserId};

use super::{FlashQuery, PageContext, check_csrf, redirect_flash, render};
use crate::db::{AdminUserRepository, RepositoryError};
use crate::error::AppError;
use crate::filters;
use crate::middleware::{RequireAdminAuth, RequireSuperAdmin};
use crate::models::AdminUser;
use crate::services::{AdminAuthError, AdminAuthService, CreateAdmin};
use crate::services::auth::MIN_PASSWORD_LENGTH;
use crate::state::AppState;

/// Admin user view for templates.
#[derive(Debug, Clone)]
pub struct AdminUserListItem {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_self: bool,
}

impl AdminUserListItem {
    fn new(user: &AdminUser, current: &AdminUserId) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.to_string(),
            name: user.name.clone(),
            role: user.role.to_string(),
            created_at: user.created_at,
            last_login_at: user.last_login_at,
            is_self: &user.id == current,
        }
    }
}

/// Admin users page template.
#[derive(Template)]
#[template(path = "admin_users/index.html")]
pub struct AdminUsersIndexTemplate {
    pub page: PageContext,
    pub users: Vec<AdminUserListItem>,
    pub min_password_length: usize,
}

/// Own account page template.
#[derive(Template)]
#[template(path = "account.html")]
pub struct AccountTemplate {
    pub page: PageContext,
    pub email: String,
    pub min_password_length: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateAdminForm {
    #[serde(default)]
    pub csrf_token: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub role: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CsrfForm {
    #[serde(default)]
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub csrf_token: String,
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admins", get(index).post(create))
        .route("/admins/{id}/delete", post(delete))
        .route("/account", get(account))
        .route("/account/password", post(change_password))
}

/// Admin users list page handler (`super_admin` only).
#[instrument(skip(admin, state, session, flash))]
async fn index(
    RequireSuperAdmin(admin): RequireSuperAdmin,
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>, AppError> {
    let users = AdminUserRepository::new(state.store())
        .list()
        .await?
        .iter()
        .map(|u| AdminUserListItem::new(u, &admin.id))
        .collect();

    let template = AdminUsersIndexTemplate {
        page: PageContext::new(&admin, &session, "/admins", &flash).await?,
        users,
        min_password_length: MIN_PASSWORD_LENGTH,
    };
    Ok(render(&template))
}

/// Create an admin user.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id, username = %form.username))]
async fn create(
    RequireSuperAdmin(admin): RequireSuperAdmin,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CreateAdminForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;

    let Ok(role) = form.role.parse::<AdminRole>() else {
        return Ok(redirect_flash("/admins", "error", "invalid"));
    };
    if form.username.trim().is_empty() {
        return Ok(redirect_flash("/admins", "error", "invalid"));
    }

    let result = AdminAuthService::new(state.store())
        .create_admin(CreateAdmin {
            username: form.username.trim(),
            email: form.email.trim(),
            name: form.name.trim(),
            role,
            password: &form.password,
        })
        .await;

    match result {
        Ok(_) => Ok(redirect_flash("/admins", "success", "created")),
        Err(AdminAuthError::UserAlreadyExists(_)) => {
            Ok(redirect_flash("/admins", "error", "duplicate"))
        }
        Err(AdminAuthError::WeakPassword(_)) => {
            Ok(redirect_flash("/admins", "error", "weak_password"))
        }
        Err(AdminAuthError::InvalidEmail(_)) => Ok(redirect_flash("/admins", "error", "invalid")),
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}

/// Delete an admin user. Nobody deletes themselves.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn delete(
    RequireSuperAdmin(admin): RequireSuperAdmin,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<CsrfForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    let id = AdminUserId::new(id);
    if id == admin.id {
        return Ok(redirect_flash("/admins", "error", "invalid"));
    }

    match AdminUserRepository::new(state.store()).delete(&id).await {
        Ok(()) => {
            tracing::info!(deleted = %id, "Admin user deleted");
            Ok(redirect_flash("/admins", "success", "deleted"))
        }
        Err(RepositoryError::NotFound) => Ok(redirect_flash("/admins", "error", "not_found")),
        Err(RepositoryError::Conflict(_)) => {
            Ok(redirect_flash("/admins", "error", "last_super_admin"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Own account page.
async fn account(
    RequireAdminAuth(admin): RequireAdminAuth,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>, AppError> {
    let template = AccountTemplate {
        page: PageContext::new(&admin, &session, "/account", &flash).await?,
        email: admin.email.to_string(),
        min_password_length: MIN_PASSWORD_LENGTH,
    };
    Ok(render(&template))
}

/// Change the logged-in admin's password.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn change_password(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<PasswordForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    if form.new_password != form.confirm_password {
        return Ok(redirect_flash("/account", "error", "invalid"));
    }

    match AdminAuthService::new(state.store())
        .change_password(&admin.id, &form.current_password, &form.new_password)
        .await
    {
        Ok(()) => Ok(redirect_flash("/account", "success", "password")),
        Err(AdminAuthError::InvalidCredentials) => {
            Ok(redirect_flash("/account", "error", "credentials"))
        }
        Err(AdminAuthError::WeakPassword(_)) => {
            Ok(redirect_flash("/account", "error", "weak_password"))
        }
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}

//! Authentication route handlers for admin.
//!
//! Username and password login; the session holds a [`CurrentAdmin`].

use askama::Template;
use axum::{
    Form, Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::{FlashQuery, error_message, redirect_flash, render};
use crate::error::{AppError, set_sentry_user};
use crate::filters;
use crate::middleware::{OptionalAdminAuth, clear_current_admin, csrf, set_current_admin};
use crate::models::CurrentAdmin;
use crate::services::{AdminAuthError, AdminAuthService};
use crate::state::AppState;

/// Login page template.
#[derive(Template)]
#[template(path = "auth/login.html")]
struct LoginPageTemplate {
    csrf_token: String,
    error_message: Option<String>,
    username: String,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
    #[serde(default)]
    csrf_token: String,
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    #[serde(flatten)]
    flash: FlashQuery,
    #[serde(default)]
    username: String,
}

/// Build the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login_page).post(login))
        .route("/auth/logout", post(logout))
}

/// Render the login page.
///
/// GET /auth/login
async fn login_page(
    OptionalAdminAuth(admin): OptionalAdminAuth,
    session: Session,
    Query(query): Query<LoginQuery>,
) -> Result<Response, AppError> {
    if admin.is_some() {
        return Ok(Redirect::to("/").into_response());
    }

    let template = LoginPageTemplate {
        csrf_token: csrf::token(&session).await?,
        error_message: query.flash.error.as_deref().map(error_message),
        username: query.username,
    };
    Ok(render(&template).into_response())
}

/// Check credentials and start the admin session.
///
/// POST /auth/login
#[instrument(skip(state, session, form), fields(username = %form.username))]
async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, AppError> {
    if !csrf::verify(&session, &form.csrf_token).await {
        return Ok(redirect_flash("/auth/login", "error", "csrf"));
    }

    let username = form.username.trim();
    match AdminAuthService::new(state.store())
        .authenticate(username, &form.password)
        .await
    {
        Ok(admin) => {
            let current = CurrentAdmin::from(&admin);
            set_current_admin(&session, &current).await?;
            set_sentry_user(current.id.as_str(), &current.username);
            Ok(Redirect::to("/"))
        }
        Err(AdminAuthError::InvalidCredentials | AdminAuthError::UserNotFound) => {
            let location = format!(
                "/auth/login?error=credentials&username={}",
                urlencoding::encode(username)
            );
            Ok(Redirect::to(&location))
        }
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}

/// Logout and clear session.
///
/// POST /auth/logout
async fn logout(session: Session) -> impl IntoResponse {
    if let Err(e) = clear_current_admin(&session).await {
        tracing::warn!(error = %e, "Failed to flush session on logout");
    }
    Redirect::to("/auth/login")
}

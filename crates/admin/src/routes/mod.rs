//! HTTP route handlers for admin.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health, /health/ready        - Liveness and readiness
//!
//! # Auth
//! GET  /auth/login                   - Login page
//! POST /auth/login                   - Username/password login
//! POST /auth/logout                  - Logout
//!
//! # Dashboard
//! GET  /                             - Counts, revenue, low stock, recent orders
//!
//! # Products
//! GET  /products                     - Product listing
//! GET  /products/new                 - New product form
//! POST /products                     - Create product
//! GET  /products/{id}/edit           - Edit form
//! POST /products/{id}                - Update product
//! POST /products/{id}/delete         - Delete product
//! POST /products/bulk                - Bulk delete/activate/deactivate
//! POST /api/products/reorder         - Drag-and-drop order (JSON)
//! POST /api/products/{id}/stock      - Stock +/- (JSON)
//!
//! # Orders (ventas)
//! GET  /orders                       - Filterable order list
//! GET  /orders/{id}                  - Detail, history, notifications
//! POST /orders/{id}/status           - Manual status change
//! POST /orders/{id}/notes            - Internal notes
//! POST /orders/bulk                  - Bulk status/archive/delete
//! POST /api/orders/{id}/reprocess-payment
//! POST /api/orders/reprocess-pending
//!
//! # Shipments (envios)
//! GET  /shipments                    - Pending shipments
//! GET  /shipments/archive            - Delivered and archived
//! POST /shipments/{id}/{preparing,ship,deliver,archive,unarchive}
//!
//! # Settings
//! GET  /settings, POST /settings     - Store configuration
//! GET  /notifications, POST /notifications
//! POST /api/notifications/test       - Test email/Telegram (JSON)
//!
//! # Backups
//! GET  /backups, POST /backups, POST /backups/restore, POST /backups/delete
//! GET  /backups/{name}/download
//!
//! # Admin users
//! GET  /admins, POST /admins, POST /admins/{id}/delete  (super admin)
//! GET  /account, POST /account/password                 (any admin)
//!
//! # Webhooks (no session)
//! POST /webhooks/mercadopago
//! ```

pub mod admin_users;
pub mod auth;
pub mod backups;
pub mod dashboard;
pub mod health;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod settings;
pub mod shipments;
pub mod webhooks;

use askama::Template;
use axum::{
    Router,
    response::{Html, Redirect},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::error::AppError;
use crate::middleware::csrf;
use crate::models::{AdminRole, CurrentAdmin};
use crate::state::AppState;

/// Build the full route tree.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(dashboard::router())
        .merge(products::router())
        .merge(orders::router())
        .merge(shipments::router())
        .merge(settings::router())
        .merge(notifications::router())
        .merge(backups::router())
        .merge(admin_users::router())
        .merge(webhooks::router())
}

/// Admin user view for templates.
#[derive(Debug, Clone)]
pub struct AdminUserView {
    pub name: String,
    pub username: String,
    pub role: String,
    pub is_super_admin: bool,
    pub can_write: bool,
}

impl From<&CurrentAdmin> for AdminUserView {
    fn from(admin: &CurrentAdmin) -> Self {
        Self {
            name: admin.name.clone(),
            username: admin.username.clone(),
            role: admin.role.to_string(),
            is_super_admin: admin.role == AdminRole::SuperAdmin,
            can_write: admin.role.can_write(),
        }
    }
}

/// What every page in the layout needs.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub admin_user: AdminUserView,
    pub current_path: &'static str,
    pub csrf_token: String,
    pub success_message: Option<String>,
    pub error_message: Option<String>,
}

impl PageContext {
    /// Build the layout context, creating the CSRF token if needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the session store fails.
    pub async fn new(
        admin: &CurrentAdmin,
        session: &Session,
        current_path: &'static str,
        flash: &FlashQuery,
    ) -> Result<Self, AppError> {
        Ok(Self {
            admin_user: AdminUserView::from(admin),
            current_path,
            csrf_token: csrf::token(session).await?,
            success_message: flash.success.as_deref().map(success_message),
            error_message: flash.error.as_deref().map(error_message),
        })
    }

    /// Highlight for a nav entry.
    #[must_use]
    pub fn nav_class(&self, prefix: &str) -> &'static str {
        let active = if prefix == "/" {
            self.current_path == "/"
        } else {
            self.current_path.starts_with(prefix)
        };
        if active { "nav-link active" } else { "nav-link" }
    }
}

/// `?success=` / `?error=` codes carried across a redirect.
#[derive(Debug, Default, Deserialize)]
pub struct FlashQuery {
    pub success: Option<String>,
    pub error: Option<String>,
}

fn success_message(code: &str) -> String {
    match code {
        "created" => "Creado correctamente.",
        "saved" => "Cambios guardados.",
        "deleted" => "Eliminado correctamente.",
        "status" => "Estado del pedido actualizado.",
        "bulk" => "Acción masiva aplicada.",
        "archived" => "Pedido archivado.",
        "unarchived" => "Pedido restaurado del archivo.",
        "backup" => "Backup creado.",
        "restored" => "Backup restaurado. Se guardó un backup previo por seguridad.",
        "password" => "Contraseña actualizada.",
        _ => "Listo.",
    }
    .to_owned()
}

fn error_message(code: &str) -> String {
    match code {
        "credentials" => "Usuario o contraseña incorrectos.",
        "csrf" => "La sesión expiró. Volvé a intentar.",
        "not_found" => "No se encontró el elemento.",
        "transition" => "Ese cambio de estado no está permitido.",
        "invalid" => "Revisá los datos del formulario.",
        "nothing_selected" => "No seleccionaste ningún elemento.",
        "partial" => "Algunos elementos no se pudieron actualizar.",
        "last_super_admin" => "No se puede eliminar al último super administrador.",
        "duplicate" => "Ya existe un usuario con ese nombre o email.",
        "weak_password" => "La contraseña debe tener al menos 10 caracteres.",
        "backup" => "No se pudo crear el backup.",
        "restore" => "El backup no es válido y no se restauró nada.",
        "readonly" => "Tu usuario es de solo lectura.",
        _ => "Ocurrió un error.",
    }
    .to_owned()
}

/// Reject a form post whose `csrf_token` does not match the session.
///
/// # Errors
///
/// Returns `AppError::Forbidden` on mismatch.
pub async fn check_csrf(session: &Session, supplied: &str) -> Result<(), AppError> {
    if csrf::verify(session, supplied).await {
        Ok(())
    } else {
        tracing::warn!("CSRF token mismatch on form post");
        Err(AppError::Forbidden("invalid CSRF token".to_owned()))
    }
}

/// Redirect after a POST with a flash code.
#[must_use]
pub fn redirect_flash(path: &str, kind: &str, code: &str) -> Redirect {
    let sep = if path.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{path}{sep}{kind}={code}"))
}

/// Render a template, logging failures.
pub fn render(template: &impl Template) -> Html<String> {
    Html(template.render().unwrap_or_else(|e| {
        tracing::error!("Template render error: {}", e);
        "Internal Server Error".to_string()
    }))
}

/// Split a comma-separated ID list from a bulk form.
#[must_use]
pub fn parse_ids<T: From<String>>(raw: &str) -> Vec<T> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| T::from(id.to_owned()))
        .collect()
}

/// Trimmed form text, `None` when blank.
#[must_use]
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// HTML checkbox: present means checked.
#[must_use]
pub fn checkbox(value: Option<&String>) -> bool {
    value.is_some_and(|v| v == "on" || v == "true" || v == "1")
}

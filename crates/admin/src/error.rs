//! Unified error handling for admin.
//!
//! [`AppError`] is for page handlers: a status code and a short plain-text
//! message. [`ApiError`] is for the `/api/` endpoints called from page
//! scripts: `{"success": false, "error": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use tienda_core::TransitionError;

use crate::db::RepositoryError;
use crate::mercadopago::MercadoPagoError;
use crate::services::{BackupError, NotificationError, ReconcileError};

/// Application-level error type for the admin panel.
#[derive(Debug, Error)]
pub enum AppError {
    /// JSON store operation failed.
    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),

    /// MercadoPago API operation failed.
    #[error("MercadoPago error: {0}")]
    MercadoPago(#[from] MercadoPagoError),

    /// Requested order status change is not allowed.
    #[error("{0}")]
    Transition(#[from] TransitionError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::OrderNotFound(id) => Self::NotFound(format!("order {id}")),
            ReconcileError::NoPayment(_) | ReconcileError::PaymentMismatch { .. } => {
                Self::BadRequest(err.to_string())
            }
            ReconcileError::Transition(e) => Self::Transition(e),
            ReconcileError::MercadoPago(e) => Self::MercadoPago(e),
            ReconcileError::Repository(e) => Self::Repository(e),
        }
    }
}

impl From<BackupError> for AppError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::InvalidName(_) | BackupError::Corrupt { .. } => {
                Self::BadRequest(err.to_string())
            }
            BackupError::NotFound(name) => Self::NotFound(name),
            BackupError::Repository(e) => Self::Repository(e),
            BackupError::Io { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session: {err}"))
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Repository(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MercadoPago(MercadoPagoError::NotFound(_)) | Self::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::MercadoPago(MercadoPagoError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MercadoPago(_) => StatusCode::BAD_GATEWAY,
            Self::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show to the client.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Repository(_) | Self::Internal(_) => "Error interno del servidor".to_owned(),
            Self::MercadoPago(MercadoPagoError::NotConfigured) => {
                "MercadoPago no está configurado".to_owned()
            }
            Self::MercadoPago(MercadoPagoError::NotFound(id)) => {
                format!("Pago {id} no encontrado en MercadoPago")
            }
            Self::MercadoPago(_) => "Error al consultar MercadoPago".to_owned(),
            Self::Transition(e) => e.to_string(),
            _ => self.to_string(),
        }
    }

    fn report(&self) {
        if self.status().is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Admin request error"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.report();
        (self.status(), self.public_message()).into_response()
    }
}

/// Error response for AJAX endpoints.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl<E> From<E> for ApiError
where
    AppError: From<E>,
{
    fn from(err: E) -> Self {
        let err = AppError::from(err);
        err.report();
        Self {
            status: err.status(),
            message: err.public_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::Repository(e) => Self::Repository(e),
            NotificationError::Email(_) | NotificationError::Telegram(_) => {
                Self::BadRequest(format!("Falló el envío: {err}"))
            }
            _ => Self::BadRequest(err.to_string()),
        }
    }
}

/// Set the Sentry user context from the logged-in admin.
pub fn set_sentry_user(admin_id: &str, username: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(admin_id.to_owned()),
            username: Some(username.to_owned()),
            ..Default::default()
        }));
    });
}

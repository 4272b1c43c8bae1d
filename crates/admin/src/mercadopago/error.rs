//! MercadoPago-related errors.

use thiserror::Error;

/// Errors that can occur when talking to MercadoPago.
#[derive(Debug, Error)]
pub enum MercadoPagoError {
    /// HTTP request failed before a response arrived.
    #[error("MercadoPago request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// MercadoPago answered with a non-success status.
    #[error("MercadoPago API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape.
    #[error("MercadoPago response error: {0}")]
    Response(String),

    /// Payment does not exist.
    #[error("payment not found: {0}")]
    NotFound(String),

    /// Webhook signature missing, malformed, stale or wrong.
    #[error("invalid MercadoPago signature: {0}")]
    InvalidSignature(String),

    /// No access token (or no webhook secret) configured.
    #[error("MercadoPago is not configured")]
    NotConfigured,
}

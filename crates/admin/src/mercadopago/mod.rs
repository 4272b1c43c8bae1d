//! MercadoPago integration for payment reconciliation.
//!
//! This module provides:
//! - [`MercadoPagoClient`] for reading payments
//! - Payment and webhook payload types
//! - Webhook signature verification
//!
//! Orders carry their own ID as the payment's `external_reference`, which is
//! how a payment is matched back to an order when the order has no stored
//! payment ID yet.

mod client;
mod error;
mod types;

pub use client::MercadoPagoClient;
pub use error::MercadoPagoError;
pub use types::{Payment, PaymentSearch, WebhookData, WebhookNotification};

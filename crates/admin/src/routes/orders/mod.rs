//! Orders (ventas) route handlers.
//!
//! Listing with filters, the order detail page with manual status
//! changes and notes, bulk actions, and the AJAX endpoints that re-sync
//! payments with MercadoPago.

mod bulk;
mod detail;
mod list;
mod payments;
pub mod types;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

pub use bulk::{BulkOrdersInput, bulk};
pub use detail::{NotesInput, OrderShowTemplate, StatusInput, show, update_notes, update_status};
pub use list::{OrdersIndexTemplate, index};
pub use payments::{reprocess_payment, reprocess_pending};
pub use types::{OrdersQuery, StatusOption};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(index))
        .route("/orders/bulk", post(bulk))
        .route("/orders/{id}", get(show))
        .route("/orders/{id}/status", post(update_status))
        .route("/orders/{id}/notes", post(update_notes))
        .route(
            "/api/orders/{id}/reprocess-payment",
            post(reprocess_payment),
        )
        .route("/api/orders/reprocess-pending", post(reprocess_pending))
}

//! AJAX endpoints that re-sync orders with MercadoPago.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::instrument;

use tienda_core::OrderId;

use crate::error::ApiError;
use crate::middleware::{CsrfHeader, RequireWriter};
use crate::services::{ReconcileOutcome, StockChange};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StockChangeView {
    pub product_id: String,
    pub name: String,
    pub before: i64,
    pub after: i64,
}

impl From<&StockChange> for StockChangeView {
    fn from(change: &StockChange) -> Self {
        Self {
            product_id: change.product_id.to_string(),
            name: change.name.clone(),
            before: change.before,
            after: change.after,
        }
    }
}

/// What one reprocess did, for the page script.
#[derive(Debug, Serialize)]
pub struct OutcomeView {
    pub order_id: String,
    pub payment_id: Option<String>,
    pub payment_status: Option<String>,
    pub previous_status: String,
    pub new_status: String,
    pub status_label: &'static str,
    pub changed: bool,
    pub stock: &'static str,
    pub stock_changes: Vec<StockChangeView>,
    pub notified: Option<&'static str>,
    /// Delivery problems for the notification, if any.
    pub notification_failures: Vec<String>,
}

impl From<&ReconcileOutcome> for OutcomeView {
    fn from(outcome: &ReconcileOutcome) -> Self {
        Self {
            order_id: outcome.order_id.to_string(),
            payment_id: outcome.payment_id.clone(),
            payment_status: outcome.payment_status.as_ref().map(|s| s.as_str().to_owned()),
            previous_status: outcome.previous_status.to_string(),
            new_status: outcome.new_status.to_string(),
            status_label: outcome.new_status.label(),
            changed: outcome.status_changed(),
            stock: outcome.stock.as_str(),
            stock_changes: outcome.stock_changes.iter().map(StockChangeView::from).collect(),
            notified: outcome.notified.map(|event| event.title()),
            notification_failures: outcome
                .dispatch
                .as_ref()
                .map(|report| report.failures.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReprocessResponse {
    pub success: bool,
    pub outcome: OutcomeView,
}

#[derive(Debug, Serialize)]
pub struct PendingError {
    pub order_id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ReprocessPendingResponse {
    pub success: bool,
    pub checked: usize,
    pub updated: usize,
    pub outcomes: Vec<OutcomeView>,
    pub errors: Vec<PendingError>,
}

/// Re-fetch one order's payment and apply it.
///
/// POST /api/orders/{id}/reprocess-payment
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn reprocess_payment(
    RequireWriter(admin): RequireWriter,
    _csrf: CsrfHeader,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReprocessResponse>, ApiError> {
    let id = OrderId::new(id);
    let outcome = state.reconciliation().reprocess(&id, &admin.username).await?;

    tracing::info!(
        order_id = %id,
        from = %outcome.previous_status,
        to = %outcome.new_status,
        "Payment reprocessed"
    );
    Ok(Json(ReprocessResponse {
        success: true,
        outcome: OutcomeView::from(&outcome),
    }))
}

/// Reprocess every pending or in-process MercadoPago order.
///
/// POST /api/orders/reprocess-pending
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn reprocess_pending(
    RequireWriter(admin): RequireWriter,
    _csrf: CsrfHeader,
    State(state): State<AppState>,
) -> Result<Json<ReprocessPendingResponse>, ApiError> {
    let report = state
        .reconciliation()
        .reprocess_pending(&admin.username)
        .await?;

    let outcomes: Vec<OutcomeView> = report.outcomes.iter().map(OutcomeView::from).collect();
    let updated = outcomes.iter().filter(|o| o.changed).count();
    tracing::info!(
        checked = outcomes.len() + report.errors.len(),
        updated,
        errors = report.errors.len(),
        "Pending payments reprocessed"
    );

    Ok(Json(ReprocessPendingResponse {
        success: true,
        checked: outcomes.len() + report.errors.len(),
        updated,
        outcomes,
        errors: report
            .errors
            .into_iter()
            .map(|(order_id, error)| PendingError {
                order_id: order_id.to_string(),
                error,
            })
            .collect(),
    }))
}

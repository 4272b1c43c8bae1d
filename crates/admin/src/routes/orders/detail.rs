//! Order detail page, manual status changes and internal notes.

use askama::Template;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{Html, Redirect},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use tienda_core::{NotificationEvent, OrderId, OrderStatus};

use super::types::StatusOption;
use crate::db::{OrderRepository, RepositoryError};
use crate::error::AppError;
use crate::filters;
use crate::middleware::{RequireAdminAuth, RequireWriter};
use crate::models::Order;
use crate::routes::{FlashQuery, PageContext, check_csrf, non_empty, redirect_flash, render};
use crate::services::{ReconcileError, ShipmentDetails};
use crate::state::AppState;

/// Order detail page template.
#[derive(Template)]
#[template(path = "orders/show.html")]
pub struct OrderShowTemplate {
    pub page: PageContext,
    pub order: Order,
    pub next_statuses: Vec<StatusOption>,
    /// Titles of the notifications already sent, in order.
    pub notifications: Vec<&'static str>,
    pub can_reprocess: bool,
}

/// Manual status change form.
#[derive(Debug, Deserialize)]
pub struct StatusInput {
    #[serde(default)]
    pub csrf_token: String,
    pub status: String,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesInput {
    #[serde(default)]
    pub csrf_token: String,
    #[serde(default)]
    pub notes: String,
}

/// Order detail page handler.
#[instrument(skip(admin, state, session, flash))]
pub async fn show(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>, AppError> {
    let id = OrderId::new(id);
    let order = OrderRepository::new(state.store())
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))?;

    let template = OrderShowTemplate {
        page: PageContext::new(&admin, &session, "/orders", &flash).await?,
        next_statuses: StatusOption::next_for(order.status),
        notifications: order
            .notifications_sent
            .iter()
            .map(|event| NotificationEvent::title(*event))
            .collect(),
        can_reprocess: state.mercadopago().is_some()
            && order.payment.method == tienda_core::PaymentMethod::Mercadopago,
        order,
    };
    Ok(render(&template))
}

/// Apply a manual status change.
///
/// POST /orders/{id}/status
#[instrument(skip(admin, state, session, input), fields(admin_id = %admin.id, target = %input.status))]
pub async fn update_status(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(input): Form<StatusInput>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &input.csrf_token).await?;
    let id = OrderId::new(id);
    let back = format!("/orders/{id}");

    let Ok(target) = input.status.parse::<OrderStatus>() else {
        return Ok(redirect_flash(&back, "error", "invalid"));
    };

    let shipment = (target == OrderStatus::Shipped).then(|| ShipmentDetails {
        carrier: non_empty(input.carrier.as_deref()),
        tracking_number: non_empty(input.tracking_number.as_deref()),
    });

    match state
        .reconciliation()
        .apply_manual_transition(&id, target, &admin.username, shipment)
        .await
    {
        Ok(outcome) => {
            tracing::info!(
                from = %outcome.previous_status,
                to = %outcome.new_status,
                stock = outcome.stock.as_str(),
                "Order status changed by admin"
            );
            Ok(redirect_flash(&back, "success", "status"))
        }
        Err(ReconcileError::Transition(e)) => {
            tracing::info!(error = %e, "Status change rejected");
            Ok(redirect_flash(&back, "error", "transition"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Save internal notes.
///
/// POST /orders/{id}/notes
#[instrument(skip(admin, state, session, input), fields(admin_id = %admin.id))]
pub async fn update_notes(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(input): Form<NotesInput>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &input.csrf_token).await?;
    let id = OrderId::new(id);

    match OrderRepository::new(state.store())
        .update_notes(&id, &input.notes)
        .await
    {
        Ok(()) => Ok(redirect_flash(&format!("/orders/{id}"), "success", "saved")),
        Err(RepositoryError::NotFound) => Err(AppError::NotFound(format!("order {id}"))),
        Err(e) => Err(e.into()),
    }
}

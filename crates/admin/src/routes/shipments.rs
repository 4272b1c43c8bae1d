//! Shipment (envios) route handlers.
//!
//! The pending board lists paid orders still moving towards the customer;
//! the archive lists delivered and archived ones. Status moves go through
//! the same workflow as the order detail page.

use askama::Template;
use axum::{
    Form, Router,
    extract::{Path, Query, State},
    response::{Html, Redirect},
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use tienda_core::{OrderId, OrderStatus};

use super::{FlashQuery, PageContext, check_csrf, non_empty, redirect_flash, render};
use crate::db::{OrderFilter, OrderRepository};
use crate::error::AppError;
use crate::filters;
use crate::middleware::{RequireAdminAuth, RequireWriter};
use crate::models::Order;
use crate::services::{ReconcileError, ShipmentDetails};
use crate::state::AppState;

/// Pending shipments page.
#[derive(Template)]
#[template(path = "shipments/index.html")]
pub struct ShipmentsTemplate {
    pub page: PageContext,
    pub to_prepare: Vec<Order>,
    pub preparing: Vec<Order>,
    pub in_transit: Vec<Order>,
}

/// Delivered/archived shipments page.
#[derive(Template)]
#[template(path = "shipments/archive.html")]
pub struct ShipmentsArchiveTemplate {
    pub page: PageContext,
    pub orders: Vec<Order>,
    pub search: String,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    #[serde(flatten)]
    pub flash: FlashQuery,
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct ShipmentForm {
    #[serde(default)]
    pub csrf_token: String,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shipments", get(index))
        .route("/shipments/archive", get(archive_index))
        .route("/shipments/{id}/preparing", post(mark_preparing))
        .route("/shipments/{id}/ship", post(ship))
        .route("/shipments/{id}/deliver", post(deliver))
        .route("/shipments/{id}/archive", post(archive))
        .route("/shipments/{id}/unarchive", post(unarchive))
}

/// Pending shipments, oldest first so nothing waits forever.
#[instrument(skip(admin, state, session, flash))]
async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>, AppError> {
    let mut orders = OrderRepository::new(state.store())
        .list(&OrderFilter {
            statuses: vec![
                OrderStatus::Approved,
                OrderStatus::Preparing,
                OrderStatus::Shipped,
            ],
            archived: Some(false),
            search: None,
        })
        .await?;
    orders.reverse();

    let (to_prepare, rest): (Vec<Order>, Vec<Order>) = orders
        .into_iter()
        .partition(|o| o.status == OrderStatus::Approved);
    let (preparing, in_transit) = rest
        .into_iter()
        .partition(|o| o.status == OrderStatus::Preparing);

    let template = ShipmentsTemplate {
        page: PageContext::new(&admin, &session, "/shipments", &flash).await?,
        to_prepare,
        preparing,
        in_transit,
    };
    Ok(render(&template))
}

/// Delivered or archived orders, newest first.
#[instrument(skip(admin, state, session, query))]
async fn archive_index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ArchiveQuery>,
) -> Result<Html<String>, AppError> {
    let search = Some(query.q.trim().to_owned()).filter(|q| !q.is_empty());
    let orders = OrderRepository::new(state.store())
        .list(&OrderFilter {
            statuses: Vec::new(),
            archived: None,
            search,
        })
        .await?
        .into_iter()
        .filter(|o| o.archived || o.status == OrderStatus::Delivered)
        .collect();

    let template = ShipmentsArchiveTemplate {
        page: PageContext::new(&admin, &session, "/shipments/archive", &query.flash).await?,
        orders,
        search: query.q,
    };
    Ok(render(&template))
}

async fn transition(
    state: &AppState,
    actor: &str,
    id: &OrderId,
    target: OrderStatus,
    shipment: Option<ShipmentDetails>,
) -> Result<Redirect, AppError> {
    match state
        .reconciliation()
        .apply_manual_transition(id, target, actor, shipment)
        .await
    {
        Ok(outcome) => {
            tracing::info!(
                order_id = %id,
                from = %outcome.previous_status,
                to = %outcome.new_status,
                "Shipment status changed"
            );
            Ok(redirect_flash("/shipments", "success", "status"))
        }
        Err(ReconcileError::Transition(e)) => {
            tracing::info!(order_id = %id, error = %e, "Shipment move rejected");
            Ok(redirect_flash("/shipments", "error", "transition"))
        }
        Err(ReconcileError::OrderNotFound(_)) => {
            Ok(redirect_flash("/shipments", "error", "not_found"))
        }
        Err(e) => Err(e.into()),
    }
}

#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn mark_preparing(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<ShipmentForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    transition(
        &state,
        &admin.username,
        &OrderId::new(id),
        OrderStatus::Preparing,
        None,
    )
    .await
}

/// Mark shipped with carrier and tracking number.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn ship(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<ShipmentForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    let details = ShipmentDetails {
        carrier: non_empty(form.carrier.as_deref()),
        tracking_number: non_empty(form.tracking_number.as_deref()),
    };
    transition(
        &state,
        &admin.username,
        &OrderId::new(id),
        OrderStatus::Shipped,
        Some(details),
    )
    .await
}

#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn deliver(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<ShipmentForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    transition(
        &state,
        &admin.username,
        &OrderId::new(id),
        OrderStatus::Delivered,
        None,
    )
    .await
}

async fn set_archived(
    state: &AppState,
    id: String,
    archived: bool,
) -> Result<Redirect, AppError> {
    let id = OrderId::new(id);
    let changed = OrderRepository::new(state.store())
        .set_archived_many(std::slice::from_ref(&id), archived)
        .await?;
    tracing::info!(order_id = %id, archived, changed, "Order archive flag set");

    Ok(if archived {
        redirect_flash("/shipments", "success", "archived")
    } else {
        redirect_flash("/shipments/archive", "success", "unarchived")
    })
}

#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn archive(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<ShipmentForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    set_archived(&state, id, true).await
}

#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn unarchive(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<ShipmentForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    set_archived(&state, id, false).await
}

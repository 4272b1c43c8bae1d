//! Order list handler.

use askama::Template;
use axum::{
    extract::{Query, State},
    response::Html,
};
use tower_sessions::Session;
use tracing::instrument;

use tienda_core::Price;

use super::types::{OrdersQuery, StatusOption};
use crate::db::OrderRepository;
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdminAuth;
use crate::models::Order;
use crate::routes::PageContext;
use crate::state::AppState;

/// Orders list page template.
#[derive(Template)]
#[template(path = "orders/index.html")]
pub struct OrdersIndexTemplate {
    pub page: PageContext,
    pub orders: Vec<Order>,
    pub statuses: Vec<StatusOption>,
    pub search: String,
    pub archived: String,
    pub total_amount: Price,
    /// Where bulk actions return to.
    pub return_to: String,
    pub mercadopago_configured: bool,
}

/// Order list page handler.
#[instrument(skip(admin, state, session, query))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<OrdersQuery>,
) -> Result<Html<String>, AppError> {
    let repo = OrderRepository::new(state.store());
    let orders = repo.list(&query.filter()).await?;
    let counts = repo.counts_by_status().await?;

    let template = OrdersIndexTemplate {
        page: PageContext::new(&admin, &session, "/orders", &query.flash).await?,
        total_amount: orders.iter().map(|o| o.total).sum(),
        statuses: StatusOption::all(query.status(), &counts),
        return_to: query.list_url(),
        orders,
        search: query.q,
        archived: query.archived,
        mercadopago_configured: state.mercadopago().is_some(),
    };
    Ok(crate::routes::render(&template))
}

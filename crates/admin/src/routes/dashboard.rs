//! Dashboard route handler.

use askama::Template;
use axum::{
    Router,
    extract::{Query, State},
    response::Html,
    routing::get,
};
use tower_sessions::Session;
use tracing::instrument;

use tienda_core::{OrderStatus, Price};

use super::{FlashQuery, PageContext, render};
use crate::db::{OrderFilter, OrderRepository, ProductRepository};
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdminAuth;
use crate::models::{Order, Product};
use crate::state::AppState;

const RECENT_ORDERS: usize = 8;

/// Dashboard metrics.
#[derive(Debug, Clone, Default)]
pub struct DashboardMetrics {
    pub orders: usize,
    pub awaiting_payment: usize,
    pub to_ship: usize,
    pub revenue: Price,
    pub products: usize,
}

/// Dashboard template.
#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub page: PageContext,
    pub metrics: DashboardMetrics,
    pub status_counts: Vec<(OrderStatus, usize)>,
    pub recent_orders: Vec<Order>,
    pub low_stock: Vec<Product>,
    pub low_stock_threshold: i64,
    pub mercadopago_configured: bool,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(dashboard))
}

/// Dashboard page handler.
#[instrument(skip(admin, state, session))]
async fn dashboard(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>, AppError> {
    let orders = OrderRepository::new(state.store());
    let all = orders.list(&OrderFilter::default()).await?;
    let products = ProductRepository::new(state.store());
    let threshold = state.config().low_stock_threshold;

    let metrics = compute_metrics(&all, products.list().await?.len());
    let status_counts = orders
        .counts_by_status()
        .await?
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect();

    let template = DashboardTemplate {
        page: PageContext::new(&admin, &session, "/", &flash).await?,
        metrics,
        status_counts,
        recent_orders: all.into_iter().take(RECENT_ORDERS).collect(),
        low_stock: products.low_stock(threshold).await?,
        low_stock_threshold: threshold,
        mercadopago_configured: state.mercadopago().is_some(),
    };
    Ok(render(&template))
}

/// Revenue counts paid orders that were not refunded; archived ones included.
fn compute_metrics(orders: &[Order], products: usize) -> DashboardMetrics {
    let revenue = orders
        .iter()
        .filter(|o| o.status.is_paid())
        .map(|o| o.total)
        .sum();
    DashboardMetrics {
        orders: orders.len(),
        awaiting_payment: orders
            .iter()
            .filter(|o| o.status.is_awaiting_payment())
            .count(),
        to_ship: orders
            .iter()
            .filter(|o| !o.archived && matches!(o.status, OrderStatus::Approved | OrderStatus::Preparing))
            .count(),
        revenue,
        products,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::order::fixtures;

    #[test]
    fn test_revenue_counts_only_paid_orders() {
        let mut paid = fixtures::order("ord_1", &[("prod_a", 2)]);
        paid.status = OrderStatus::Shipped;
        let mut refunded = fixtures::order("ord_2", &[("prod_a", 1)]);
        refunded.status = OrderStatus::Refunded;
        let pending = fixtures::order("ord_3", &[("prod_a", 1)]);
        let mut to_ship = fixtures::order("ord_4", &[("prod_b", 1)]);
        to_ship.status = OrderStatus::Approved;

        let metrics = compute_metrics(&[paid.clone(), refunded, pending, to_ship.clone()], 3);
        assert_eq!(metrics.orders, 4);
        assert_eq!(metrics.awaiting_payment, 1);
        assert_eq!(metrics.to_ship, 1);
        assert_eq!(metrics.revenue, paid.total.checked_add(to_ship.total).unwrap());
    }
}

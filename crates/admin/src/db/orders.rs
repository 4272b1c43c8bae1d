//! Order repository over `orders.json`.
//!
//! Status changes do not go through here; they need the product file as
//! well and live in [`crate::services::reconciliation`].

use chrono::Utc;

use tienda_core::{OrderId, OrderStatus};

use super::{RepositoryError, Store};
use crate::models::Order;

/// Filter for order listings.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Accept only these statuses. Empty accepts all.
    pub statuses: Vec<OrderStatus>,
    /// `Some(flag)` keeps only orders with that archived flag.
    pub archived: Option<bool>,
    /// Free text over ID, customer, email, phone and tracking number.
    pub search: Option<String>,
}

impl OrderFilter {
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&order.status))
            && self.archived.is_none_or(|archived| order.archived == archived)
            && self
                .search
                .as_deref()
                .is_none_or(|needle| order.matches_search(needle))
    }
}

/// Repository for order operations.
pub struct OrderRepository<'a> {
    store: &'a Store,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Orders matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if `orders.json` cannot be read.
    pub async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .store
            .orders()
            .load()
            .await?
            .into_iter()
            .filter(|order| filter.matches(order))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if `orders.json` cannot be read.
    pub async fn get(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let orders = self.store.orders().load().await?;
        Ok(orders.into_iter().find(|o| &o.id == id))
    }

    /// Replace the internal notes of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no order has this ID.
    pub async fn update_notes(&self, id: &OrderId, notes: &str) -> Result<(), RepositoryError> {
        let mut orders = self.store.orders().lock().await?;
        let order = orders
            .iter_mut()
            .find(|o| &o.id == id)
            .ok_or(RepositoryError::NotFound)?;
        order.notes = notes.trim().to_owned();
        order.updated_at = Utc::now();
        orders.commit().await
    }

    /// Archive or unarchive every listed order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the file cannot be read or written.
    pub async fn set_archived_many(
        &self,
        ids: &[OrderId],
        archived: bool,
    ) -> Result<usize, RepositoryError> {
        let mut orders = self.store.orders().lock().await?;
        let now = Utc::now();
        let mut changed = 0;
        for order in orders.iter_mut().filter(|o| ids.contains(&o.id)) {
            if order.archived != archived {
                order.archived = archived;
                order.updated_at = now;
                changed += 1;
            }
        }
        if changed > 0 {
            orders.commit().await?;
        }
        Ok(changed)
    }

    /// Delete every listed order. Unknown IDs are ignored.
    ///
    /// Stock is not touched; cancel an order first to give its units back.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the file cannot be read or written.
    pub async fn delete_many(&self, ids: &[OrderId]) -> Result<usize, RepositoryError> {
        let mut orders = self.store.orders().lock().await?;
        let before = orders.len();
        orders.retain(|o| !ids.contains(&o.id));
        let removed = before - orders.len();
        if removed > 0 {
            orders.commit().await?;
        }
        Ok(removed)
    }

    /// Number of orders per status, in workflow order. Archived orders count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if `orders.json` cannot be read.
    pub async fn counts_by_status(&self) -> Result<Vec<(OrderStatus, usize)>, RepositoryError> {
        let orders = self.store.orders().load().await?;
        Ok(OrderStatus::ALL
            .into_iter()
            .map(|status| {
                let count = orders.iter().filter(|o| o.status == status).count();
                (status, count)
            })
            .collect())
    }
}

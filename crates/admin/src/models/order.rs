//! Order records stored in `orders.json`.
//!
//! Orders are created by the storefront checkout; the admin reads them,
//! moves them through payment and fulfillment, and keeps an audit trail in
//! `history`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tienda_core::{
    NotificationEvent, OrderId, OrderSnapshot, OrderStatus, PaymentMethod, PaymentStatus, Price,
    ProductId, StockAction, TransitionPlan,
};

/// A customer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub shipping: Shipping,
    pub subtotal: Price,
    #[serde(default)]
    pub shipping_cost: Price,
    pub total: Price,
    #[serde(default)]
    pub payment: PaymentInfo,
    #[serde(default)]
    pub status: OrderStatus,
    /// Item quantities have been subtracted from product stock.
    #[serde(default)]
    pub stock_reduced: bool,
    /// Events already dispatched for this order.
    #[serde(default)]
    pub notifications_sent: Vec<NotificationEvent>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
    /// Hidden from the active shipments list.
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub notes: String,
}

/// Buyer contact details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Price,
    pub quantity: u32,
}

impl OrderItem {
    /// Unit price times quantity, `None` if the stored amounts overflow.
    #[must_use]
    pub fn line_total(&self) -> Option<Price> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// How the order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    #[default]
    Delivery,
    Pickup,
}

impl ShippingMethod {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Delivery => "Envío a domicilio",
            Self::Pickup => "Retiro en local",
        }
    }
}

/// Delivery address and tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Shipping {
    #[serde(default)]
    pub method: ShippingMethod,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Shipping {
    /// Single-line address for tables and messages.
    #[must_use]
    pub fn one_line(&self) -> String {
        [
            self.address.as_str(),
            self.city.as_str(),
            self.province.as_str(),
            self.postal_code.as_str(),
        ]
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Payment details, refreshed from MercadoPago on reprocessing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PaymentInfo {
    #[serde(default)]
    pub method: PaymentMethod,
    /// MercadoPago payment ID, once known.
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Last status reported by MercadoPago.
    #[serde(default)]
    pub status: Option<PaymentStatus>,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// One entry of the order audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
    /// Admin username, or `mercadopago` for payment updates.
    pub actor: String,
    #[serde(default)]
    pub note: Option<String>,
}

impl Order {
    /// The fields the workflow rules need.
    #[must_use]
    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            status: self.status,
            stock_reduced: self.stock_reduced,
            notifications_sent: self.notifications_sent.clone(),
        }
    }

    /// Apply a workflow plan: status, stock flag, history and sent events.
    ///
    /// Product stock itself is adjusted by the caller.
    pub fn apply(&mut self, plan: &TransitionPlan, actor: &str, note: Option<String>) {
        let now = Utc::now();

        if let Some(to) = plan.to {
            self.history.push(StatusChange {
                from: self.status,
                to,
                at: now,
                actor: actor.to_owned(),
                note,
            });
            self.status = to;
        }

        match plan.stock {
            StockAction::Reduce => self.stock_reduced = true,
            StockAction::Restore => self.stock_reduced = false,
            StockAction::None => {}
        }

        if let Some(event) = plan.notify
            && !self.notifications_sent.contains(&event)
        {
            self.notifications_sent.push(event);
        }

        if !plan.is_noop() {
            self.updated_at = now;
        }
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Case-insensitive match against ID, customer, email and tracking number.
    #[must_use]
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [
            Some(self.id.as_str()),
            Some(self.customer.name.as_str()),
            Some(self.customer.email.as_str()),
            Some(self.customer.phone.as_str()),
            self.shipping.tracking_number.as_deref(),
            self.payment.payment_id.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A pending MercadoPago order with two lines.
    pub fn order(id: &str, items: &[(&str, u32)]) -> Order {
        let now = Utc::now();
        let items: Vec<OrderItem> = items
            .iter()
            .map(|(product_id, quantity)| OrderItem {
                product_id: ProductId::new(*product_id),
                name: format!("Producto {product_id}"),
                unit_price: Price::from_cents(100_000),
                quantity: *quantity,
            })
            .collect();
        let subtotal: Price = items.iter().filter_map(OrderItem::line_total).sum();
        Order {
            id: OrderId::new(id),
            created_at: now,
            updated_at: now,
            customer: Customer {
                name: "Ana Gómez".to_owned(),
                email: "ana@example.com".to_owned(),
                phone: "+54 11 5555-0000".to_owned(),
            },
            items,
            shipping: Shipping {
                address: "Av. Corrientes 1234".to_owned(),
                city: "CABA".to_owned(),
                ..Shipping::default()
            },
            subtotal,
            shipping_cost: Price::ZERO,
            total: subtotal,
            payment: PaymentInfo::default(),
            status: OrderStatus::Pending,
            stock_reduced: false,
            notifications_sent: Vec::new(),
            history: Vec::new(),
            archived: false,
            notes: String::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tienda_core::plan_payment_update;

    #[test]
    fn test_apply_records_history_and_flags() {
        let mut order = fixtures::order("ord_1", &[("prod_a", 2)]);
        let plan = plan_payment_update(&order.snapshot(), &PaymentStatus::Approved).unwrap();
        order.apply(&plan, "mercadopago", None);

        assert_eq!(order.status, OrderStatus::Approved);
        assert!(order.stock_reduced);
        assert_eq!(
            order.notifications_sent,
            vec![NotificationEvent::PaymentApproved]
        );
        assert_eq!(order.history.len(), 1);
        assert_eq!(order.history[0].from, OrderStatus::Pending);
        assert_eq!(order.history[0].actor, "mercadopago");
    }

    #[test]
    fn test_noop_plan_leaves_history_empty() {
        let mut order = fixtures::order("ord_1", &[("prod_a", 1)]);
        let plan = plan_payment_update(&order.snapshot(), &PaymentStatus::Pending).unwrap();
        assert!(plan.is_noop());
        order.apply(&plan, "mercadopago", None);
        assert!(order.history.is_empty());
    }

    #[test]
    fn test_matches_search() {
        let mut order = fixtures::order("ord_abc", &[("prod_a", 1)]);
        order.shipping.tracking_number = Some("AR123456".to_owned());
        assert!(order.matches_search("GÓMEZ"));
        assert!(order.matches_search("ar1234"));
        assert!(order.matches_search("ord_ab"));
        assert!(order.matches_search("  "));
        assert!(!order.matches_search("pérez"));
    }

    #[test]
    fn test_deserializes_minimal_legacy_record() {
        let json = r#"{
            "id": "ord_legacy",
            "created_at": "2024-03-01T12:00:00Z",
            "updated_at": "2024-03-01T12:00:00Z",
            "customer": {"name": "Luis", "email": "luis@example.com"},
            "items": [{"product_id": "prod_1", "name": "Mate", "unit_price": 2500, "quantity": 2}],
            "subtotal": 5000,
            "total": 5000
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.item_count(), 2);
        assert_eq!(order.payment.method, PaymentMethod::Mercadopago);
        assert!(!order.stock_reduced);
    }

    #[test]
    fn test_line_total_overflow_is_none() {
        let item: OrderItem = serde_json::from_value(serde_json::json!({
            "product_id": "prod_1",
            "name": "Mate",
            "unit_price": "70000000000000000000000000000",
            "quantity": 2,
        }))
        .unwrap();
        assert_eq!(item.line_total(), None);

        let item = OrderItem { quantity: 1, ..item };
        assert!(item.line_total().is_some());
    }
}

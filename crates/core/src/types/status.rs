//! Status enums for orders, payments, notifications and admins.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Local order status.
///
/// The first six values mirror MercadoPago payment states; `preparing`,
/// `shipped` and `delivered` are fulfillment stages the admin moves an
/// order through after it is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    InProcess,
    Approved,
    Preparing,
    Shipped,
    Delivered,
    Rejected,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Every status, in the order shown in filters.
    pub const ALL: [Self; 9] = [
        Self::Pending,
        Self::InProcess,
        Self::Approved,
        Self::Preparing,
        Self::Shipped,
        Self::Delivered,
        Self::Rejected,
        Self::Cancelled,
        Self::Refunded,
    ];

    /// Stable identifier used in JSON, URLs and form values.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProcess => "in_process",
            Self::Approved => "approved",
            Self::Preparing => "preparing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    /// Label shown in the admin UI.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pendiente de pago",
            Self::InProcess => "Pago en proceso",
            Self::Approved => "Pagado",
            Self::Preparing => "En preparación",
            Self::Shipped => "Enviado",
            Self::Delivered => "Entregado",
            Self::Rejected => "Pago rechazado",
            Self::Cancelled => "Cancelado",
            Self::Refunded => "Reembolsado",
        }
    }

    /// Money has been received for this order.
    #[must_use]
    pub const fn is_paid(self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Preparing | Self::Shipped | Self::Delivered
        )
    }

    /// The order is past payment and moving through fulfillment.
    #[must_use]
    pub const fn is_fulfillment_stage(self) -> bool {
        matches!(self, Self::Preparing | Self::Shipped | Self::Delivered)
    }

    /// Awaiting a payment outcome.
    #[must_use]
    pub const fn is_awaiting_payment(self) -> bool {
        matches!(self, Self::Pending | Self::InProcess)
    }

    /// No further admin transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }

    /// Stock for this order's items should be released.
    #[must_use]
    pub const fn releases_stock(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::Refunded)
    }

    /// Whether an admin may move an order from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending | Self::InProcess => matches!(
                next,
                Self::Pending | Self::InProcess | Self::Approved | Self::Rejected | Self::Cancelled
            ) && !matches!(
                (self, next),
                (Self::Pending, Self::Pending) | (Self::InProcess, Self::InProcess)
            ),
            Self::Approved => matches!(
                next,
                Self::Preparing | Self::Shipped | Self::Cancelled | Self::Refunded
            ),
            Self::Preparing => matches!(next, Self::Shipped | Self::Cancelled | Self::Refunded),
            Self::Shipped => matches!(next, Self::Delivered | Self::Refunded),
            Self::Delivered => matches!(next, Self::Refunded),
            Self::Rejected => matches!(next, Self::Pending | Self::Cancelled),
            Self::Cancelled | Self::Refunded => false,
        }
    }

    /// Statuses an admin may move this order to, for building UI menus.
    #[must_use]
    pub fn next_statuses(self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|next| self.can_transition_to(*next))
            .collect()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

/// Payment status as reported by MercadoPago.
///
/// Only six statuses drive the order workflow. Anything else the API sends
/// (for example `charged_back` or `in_mediation`) is kept verbatim in
/// [`PaymentStatus::Unknown`] so it can be shown but never acted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Approved,
    Pending,
    InProcess,
    Rejected,
    Cancelled,
    Refunded,
    Unknown(String),
}

impl PaymentStatus {
    /// The raw MercadoPago status string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::InProcess => "in_process",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Unknown(raw) => raw,
        }
    }

    /// Parse a MercadoPago status string. Never fails.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" => Self::Approved,
            "pending" => Self::Pending,
            "in_process" => Self::InProcess,
            "rejected" => Self::Rejected,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            _ => Self::Unknown(raw.to_owned()),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PaymentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PaymentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// How the customer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Mercadopago,
    Transfer,
    Cash,
}

impl PaymentMethod {
    /// Label shown in the admin UI.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mercadopago => "MercadoPago",
            Self::Transfer => "Transferencia",
            Self::Cash => "Efectivo",
        }
    }
}

/// Customer- or admin-facing notification triggered by a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    PaymentApproved,
    PaymentPending,
    PaymentRejected,
    OrderCancelled,
    PaymentRefunded,
    OrderPreparing,
    OrderShipped,
    OrderDelivered,
}

impl NotificationEvent {
    /// Every event, in settings-page order.
    pub const ALL: [Self; 8] = [
        Self::PaymentApproved,
        Self::PaymentPending,
        Self::PaymentRejected,
        Self::OrderCancelled,
        Self::PaymentRefunded,
        Self::OrderPreparing,
        Self::OrderShipped,
        Self::OrderDelivered,
    ];

    /// Stable identifier used in JSON and form field names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PaymentApproved => "payment_approved",
            Self::PaymentPending => "payment_pending",
            Self::PaymentRejected => "payment_rejected",
            Self::OrderCancelled => "order_cancelled",
            Self::PaymentRefunded => "payment_refunded",
            Self::OrderPreparing => "order_preparing",
            Self::OrderShipped => "order_shipped",
            Self::OrderDelivered => "order_delivered",
        }
    }

    /// Subject line / headline for the event.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::PaymentApproved => "Pago aprobado",
            Self::PaymentPending => "Pago pendiente",
            Self::PaymentRejected => "Pago rechazado",
            Self::OrderCancelled => "Pedido cancelado",
            Self::PaymentRefunded => "Pago reembolsado",
            Self::OrderPreparing => "Pedido en preparación",
            Self::OrderShipped => "Pedido enviado",
            Self::OrderDelivered => "Pedido entregado",
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| format!("invalid notification event: {s}"))
    }
}

/// Admin role with different permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    /// Full access including admin user management and backups restore.
    SuperAdmin,
    /// Full access to store management.
    #[default]
    Admin,
    /// Read-only access.
    Viewer,
}

impl AdminRole {
    /// Whether this role may change store data.
    #[must_use]
    pub const fn can_write(self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin)
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SuperAdmin => write!(f, "super_admin"),
            Self::Admin => write!(f, "admin"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

impl FromStr for AdminRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "viewer" => Ok(Self::Viewer),
            _ => Err(format!("invalid admin role: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_round_trips_through_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("pagado".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_order_status_serde_matches_as_str() {
        let json = serde_json::to_string(&OrderStatus::InProcess).expect("serialize");
        assert_eq!(json, "\"in_process\"");
    }

    #[test]
    fn test_terminal_statuses_have_no_exits() {
        assert!(OrderStatus::Cancelled.next_statuses().is_empty());
        assert!(OrderStatus::Refunded.next_statuses().is_empty());
    }

    #[test]
    fn test_fulfillment_moves_forward_only() {
        assert!(OrderStatus::Approved.can_transition_to(OrderStatus::Preparing));
        assert!(OrderStatus::Preparing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Preparing));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
    }

    #[test]
    fn test_awaiting_payment_can_swap_between_pending_states() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::InProcess));
        assert!(OrderStatus::InProcess.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Pending));
    }

    #[test]
    fn test_payment_status_parse() {
        assert_eq!(PaymentStatus::parse("approved"), PaymentStatus::Approved);
        assert_eq!(PaymentStatus::parse(" IN_PROCESS "), PaymentStatus::InProcess);
        assert_eq!(
            PaymentStatus::parse("charged_back"),
            PaymentStatus::Unknown("charged_back".to_owned())
        );
    }

    #[test]
    fn test_payment_status_serde() {
        let status: PaymentStatus = serde_json::from_str("\"in_mediation\"").expect("parse");
        assert_eq!(status, PaymentStatus::Unknown("in_mediation".to_owned()));
        assert_eq!(
            serde_json::to_string(&status).expect("serialize"),
            "\"in_mediation\""
        );
    }

    #[test]
    fn test_notification_event_from_str() {
        for event in NotificationEvent::ALL {
            assert_eq!(event.as_str().parse::<NotificationEvent>(), Ok(event));
        }
    }

    #[test]
    fn test_admin_role_permissions() {
        assert!(AdminRole::SuperAdmin.can_write());
        assert!(AdminRole::Admin.can_write());
        assert!(!AdminRole::Viewer.can_write());
        assert_eq!("viewer".parse::<AdminRole>(), Ok(AdminRole::Viewer));
    }
}

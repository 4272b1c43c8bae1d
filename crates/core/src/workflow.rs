//! Order status transitions.
//!
//! Both MercadoPago payment updates and admin actions on the orders and
//! shipments pages go through this module. It only decides; callers apply
//! the resulting [`TransitionPlan`] to the stored order and product stock
//! and dispatch the notification.
//!
//! Rules:
//! - Stock for an order is reduced once, when the order first reaches a
//!   paid state, and restored only if it was reduced.
//! - Each [`NotificationEvent`] fires at most once per order.
//! - A payment update never moves a paid order back to an unpaid state.

use thiserror::Error;

use crate::types::{NotificationEvent, OrderStatus, PaymentStatus};

/// The parts of an order the workflow rules look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub status: OrderStatus,
    pub stock_reduced: bool,
    pub notifications_sent: Vec<NotificationEvent>,
}

/// What to do with product stock for the order's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StockAction {
    #[default]
    None,
    /// Subtract item quantities from product stock.
    Reduce,
    /// Add item quantities back to product stock.
    Restore,
}

impl StockAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Reduce => "reduce",
            Self::Restore => "restore",
        }
    }
}

/// Outcome of evaluating a status change against an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Status before the change.
    pub from: OrderStatus,
    /// New status, or `None` to keep the current one.
    pub to: Option<OrderStatus>,
    pub stock: StockAction,
    /// Notification to dispatch, already filtered against events sent.
    pub notify: Option<NotificationEvent>,
}

impl TransitionPlan {
    fn keep(snapshot: &OrderSnapshot) -> Self {
        Self {
            from: snapshot.status,
            to: None,
            stock: StockAction::None,
            notify: None,
        }
    }

    /// Nothing about the order changes.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.to.is_none() && matches!(self.stock, StockAction::None) && self.notify.is_none()
    }

    /// Status the order ends up in.
    #[must_use]
    pub fn resulting_status(&self) -> OrderStatus {
        self.to.unwrap_or(self.from)
    }
}

/// Errors from evaluating a transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The admin asked for a move the workflow does not allow.
    #[error("cannot change order from {from} to {to}")]
    NotAllowed { from: OrderStatus, to: OrderStatus },

    /// MercadoPago reported a status outside the six known ones.
    #[error("unknown payment status: {0}")]
    UnknownPaymentStatus(String),
}

/// Local status a MercadoPago payment status maps to.
#[must_use]
pub const fn target_for_payment(status: &PaymentStatus) -> Option<OrderStatus> {
    match status {
        PaymentStatus::Approved => Some(OrderStatus::Approved),
        PaymentStatus::Pending => Some(OrderStatus::Pending),
        PaymentStatus::InProcess => Some(OrderStatus::InProcess),
        PaymentStatus::Rejected => Some(OrderStatus::Rejected),
        PaymentStatus::Cancelled => Some(OrderStatus::Cancelled),
        PaymentStatus::Refunded => Some(OrderStatus::Refunded),
        PaymentStatus::Unknown(_) => None,
    }
}

/// Stock adjustment needed when an order moves to `target`.
#[must_use]
pub const fn stock_action(target: OrderStatus, stock_reduced: bool) -> StockAction {
    if target.is_paid() && !stock_reduced {
        StockAction::Reduce
    } else if target.releases_stock() && stock_reduced {
        StockAction::Restore
    } else {
        StockAction::None
    }
}

/// Notification associated with entering `target`.
#[must_use]
pub const fn event_for(target: OrderStatus) -> Option<NotificationEvent> {
    match target {
        OrderStatus::Approved => Some(NotificationEvent::PaymentApproved),
        OrderStatus::Pending | OrderStatus::InProcess => Some(NotificationEvent::PaymentPending),
        OrderStatus::Rejected => Some(NotificationEvent::PaymentRejected),
        OrderStatus::Cancelled => Some(NotificationEvent::OrderCancelled),
        OrderStatus::Refunded => Some(NotificationEvent::PaymentRefunded),
        OrderStatus::Preparing => Some(NotificationEvent::OrderPreparing),
        OrderStatus::Shipped => Some(NotificationEvent::OrderShipped),
        OrderStatus::Delivered => Some(NotificationEvent::OrderDelivered),
    }
}

fn plan_move(snapshot: &OrderSnapshot, target: OrderStatus) -> TransitionPlan {
    let notify =
        event_for(target).filter(|event| !snapshot.notifications_sent.contains(event));
    TransitionPlan {
        from: snapshot.status,
        to: Some(target),
        stock: stock_action(target, snapshot.stock_reduced),
        notify,
    }
}

/// Decide how an order reacts to a MercadoPago payment status.
///
/// # Errors
///
/// Returns [`TransitionError::UnknownPaymentStatus`] for statuses outside
/// the six known ones; the order must not be touched in that case.
pub fn plan_payment_update(
    snapshot: &OrderSnapshot,
    payment: &PaymentStatus,
) -> Result<TransitionPlan, TransitionError> {
    let target = target_for_payment(payment)
        .ok_or_else(|| TransitionError::UnknownPaymentStatus(payment.as_str().to_owned()))?;
    let current = snapshot.status;

    if current == target {
        let mut plan = TransitionPlan::keep(snapshot);
        if current.is_paid() {
            plan.stock = stock_action(current, snapshot.stock_reduced);
        }
        return Ok(plan);
    }

    if current.is_terminal() {
        // A refund can still arrive for an order cancelled locally.
        if current == OrderStatus::Cancelled && target == OrderStatus::Refunded {
            return Ok(plan_move(snapshot, target));
        }
        return Ok(TransitionPlan::keep(snapshot));
    }

    if current.is_paid() && (target.is_paid() || target.is_awaiting_payment()) {
        let mut plan = TransitionPlan::keep(snapshot);
        if target.is_paid() {
            plan.stock = stock_action(current, snapshot.stock_reduced);
        }
        return Ok(plan);
    }

    Ok(plan_move(snapshot, target))
}

/// Like [`plan_payment_update`], for a payment that is not the one the
/// order was paid with.
///
/// A paid order only follows another attempt when it reports `approved`
/// or `refunded`; a late rejection of an earlier attempt is kept out.
///
/// # Errors
///
/// Returns [`TransitionError::UnknownPaymentStatus`] for unknown statuses.
pub fn plan_other_attempt(
    snapshot: &OrderSnapshot,
    payment: &PaymentStatus,
) -> Result<TransitionPlan, TransitionError> {
    if snapshot.status.is_paid()
        && !matches!(payment, PaymentStatus::Approved | PaymentStatus::Refunded)
    {
        target_for_payment(payment)
            .ok_or_else(|| TransitionError::UnknownPaymentStatus(payment.as_str().to_owned()))?;
        return Ok(TransitionPlan::keep(snapshot));
    }
    plan_payment_update(snapshot, payment)
}

/// Decide how an order reacts to an admin moving it to `target`.
///
/// # Errors
///
/// Returns [`TransitionError::NotAllowed`] if `target` is not reachable
/// from the current status.
pub fn plan_manual_transition(
    snapshot: &OrderSnapshot,
    target: OrderStatus,
) -> Result<TransitionPlan, TransitionError> {
    if !snapshot.status.can_transition_to(target) {
        return Err(TransitionError::NotAllowed {
            from: snapshot.status,
            to: target,
        });
    }
    Ok(plan_move(snapshot, target))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order(status: OrderStatus, stock_reduced: bool) -> OrderSnapshot {
        OrderSnapshot {
            status,
            stock_reduced,
            notifications_sent: Vec::new(),
        }
    }

    #[test]
    fn test_approved_payment_reduces_stock_and_notifies() {
        let plan = plan_payment_update(&order(OrderStatus::Pending, false), &PaymentStatus::Approved)
            .unwrap();
        assert_eq!(plan.to, Some(OrderStatus::Approved));
        assert_eq!(plan.stock, StockAction::Reduce);
        assert_eq!(plan.notify, Some(NotificationEvent::PaymentApproved));
    }

    #[test]
    fn test_same_status_is_noop() {
        let plan =
            plan_payment_update(&order(OrderStatus::Approved, true), &PaymentStatus::Approved)
                .unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn test_same_paid_status_repairs_missing_stock_reduction() {
        let plan =
            plan_payment_update(&order(OrderStatus::Approved, false), &PaymentStatus::Approved)
                .unwrap();
        assert_eq!(plan.to, None);
        assert_eq!(plan.stock, StockAction::Reduce);
        assert_eq!(plan.notify, None);
    }

    #[test]
    fn test_pending_then_in_process_notifies_once() {
        let mut snapshot = order(OrderStatus::Pending, false);
        snapshot.notifications_sent.push(NotificationEvent::PaymentPending);
        let plan = plan_payment_update(&snapshot, &PaymentStatus::InProcess).unwrap();
        assert_eq!(plan.to, Some(OrderStatus::InProcess));
        assert_eq!(plan.stock, StockAction::None);
        assert_eq!(plan.notify, None);
    }

    #[test]
    fn test_rejection_restores_only_reduced_stock() {
        let plan = plan_payment_update(&order(OrderStatus::Pending, false), &PaymentStatus::Rejected)
            .unwrap();
        assert_eq!(plan.stock, StockAction::None);
        assert_eq!(plan.notify, Some(NotificationEvent::PaymentRejected));

        let plan = plan_payment_update(&order(OrderStatus::Approved, true), &PaymentStatus::Refunded)
            .unwrap();
        assert_eq!(plan.to, Some(OrderStatus::Refunded));
        assert_eq!(plan.stock, StockAction::Restore);
    }

    #[test]
    fn test_paid_order_is_never_downgraded() {
        for current in [
            OrderStatus::Approved,
            OrderStatus::Preparing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            for payment in [
                PaymentStatus::Approved,
                PaymentStatus::Pending,
                PaymentStatus::InProcess,
            ] {
                let plan = plan_payment_update(&order(current, true), &payment).unwrap();
                assert!(plan.is_noop(), "{current} + {payment} should be a no-op");
            }
        }
    }

    #[test]
    fn test_shipped_order_marked_paid_manually_still_reduces_stock() {
        let plan =
            plan_payment_update(&order(OrderStatus::Shipped, false), &PaymentStatus::Approved)
                .unwrap();
        assert_eq!(plan.to, None);
        assert_eq!(plan.stock, StockAction::Reduce);
        assert_eq!(plan.notify, None);
    }

    #[test]
    fn test_refund_of_shipped_order() {
        let plan =
            plan_payment_update(&order(OrderStatus::Shipped, true), &PaymentStatus::Refunded)
                .unwrap();
        assert_eq!(plan.to, Some(OrderStatus::Refunded));
        assert_eq!(plan.stock, StockAction::Restore);
        assert_eq!(plan.notify, Some(NotificationEvent::PaymentRefunded));
    }

    #[test]
    fn test_terminal_orders_ignore_payments_except_refund_after_cancel() {
        let plan =
            plan_payment_update(&order(OrderStatus::Refunded, false), &PaymentStatus::Approved)
                .unwrap();
        assert!(plan.is_noop());

        let plan =
            plan_payment_update(&order(OrderStatus::Cancelled, false), &PaymentStatus::Refunded)
                .unwrap();
        assert_eq!(plan.to, Some(OrderStatus::Refunded));
        assert_eq!(plan.stock, StockAction::None);
    }

    #[test]
    fn test_rejected_order_can_still_be_approved() {
        let plan =
            plan_payment_update(&order(OrderStatus::Rejected, false), &PaymentStatus::Approved)
                .unwrap();
        assert_eq!(plan.to, Some(OrderStatus::Approved));
        assert_eq!(plan.stock, StockAction::Reduce);
    }

    #[test]
    fn test_unknown_payment_status_is_error() {
        let err = plan_payment_update(
            &order(OrderStatus::Pending, false),
            &PaymentStatus::parse("charged_back"),
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::UnknownPaymentStatus("charged_back".to_owned())
        );
    }

    #[test]
    fn test_manual_transition_rules() {
        let plan =
            plan_manual_transition(&order(OrderStatus::Approved, true), OrderStatus::Shipped)
                .unwrap();
        assert_eq!(plan.stock, StockAction::None);
        assert_eq!(plan.notify, Some(NotificationEvent::OrderShipped));

        let err = plan_manual_transition(&order(OrderStatus::Delivered, true), OrderStatus::Pending)
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotAllowed { .. }));
    }

    #[test]
    fn test_manual_approval_of_transfer_order_reduces_stock() {
        let plan =
            plan_manual_transition(&order(OrderStatus::Pending, false), OrderStatus::Approved)
                .unwrap();
        assert_eq!(plan.stock, StockAction::Reduce);
    }

    #[test]
    fn test_manual_cancel_restores_stock() {
        let mut snapshot = order(OrderStatus::Preparing, true);
        snapshot.notifications_sent.push(NotificationEvent::OrderCancelled);
        let plan = plan_manual_transition(&snapshot, OrderStatus::Cancelled).unwrap();
        assert_eq!(plan.stock, StockAction::Restore);
        assert_eq!(plan.notify, None);
    }

    #[test]
    fn test_other_attempt_cannot_unpay_an_order() {
        for status in [
            PaymentStatus::Rejected,
            PaymentStatus::Cancelled,
            PaymentStatus::Pending,
            PaymentStatus::InProcess,
        ] {
            let plan = plan_other_attempt(&order(OrderStatus::Approved, true), &status).unwrap();
            assert!(plan.is_noop(), "{status:?}");
            assert_eq!(plan.stock, StockAction::None);
        }

        let plan =
            plan_other_attempt(&order(OrderStatus::Shipped, true), &PaymentStatus::Refunded)
                .unwrap();
        assert_eq!(plan.to, Some(OrderStatus::Refunded));
        assert_eq!(plan.stock, StockAction::Restore);

        // An unpaid order follows any attempt.
        let plan =
            plan_other_attempt(&order(OrderStatus::Pending, false), &PaymentStatus::Rejected)
                .unwrap();
        assert_eq!(plan.to, Some(OrderStatus::Rejected));

        assert!(matches!(
            plan_other_attempt(
                &order(OrderStatus::Approved, true),
                &PaymentStatus::Unknown("charged_back".to_owned())
            ),
            Err(TransitionError::UnknownPaymentStatus(_))
        ));
    }
}

//! Order status changes: MercadoPago reconciliation and admin transitions.
//!
//! Every status change goes through the same pipeline:
//!
//! 1. Lock `orders.json` and find the order. Payments are fetched from
//!    MercadoPago before this step, never while holding the lock.
//! 2. Ask [`tienda_core::workflow`] for a [`TransitionPlan`].
//! 3. Adjust product stock under the `products.json` lock and commit it.
//! 4. Apply the plan to the order (status, history, sent events) and commit.
//! 5. Dispatch the plan's notification, after the order is on disk.
//!
//! Products are committed before orders: a crash in between leaves stock
//! adjusted with `stock_reduced` unset, which a later reprocess repairs by
//! reducing again rather than losing the reduction. Oversells are allowed
//! and logged.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use tienda_core::{
    NotificationEvent, OrderId, OrderStatus, PaymentMethod, PaymentStatus, ProductId, StockAction,
    TransitionError, TransitionPlan, plan_manual_transition, plan_other_attempt,
    plan_payment_update,
};

use super::notifications::{DispatchReport, NotificationService};
use crate::db::{OrderFilter, OrderRepository, RepositoryError, Store};
use crate::mercadopago::{MercadoPagoClient, MercadoPagoError, Payment};
use crate::models::{Order, OrderItem, Product};

/// Actor recorded in order history for payment updates.
pub const MERCADOPAGO_ACTOR: &str = "mercadopago";

/// Errors from reconciling or transitioning an order.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// MercadoPago has no payment for this order.
    #[error("no MercadoPago payment found for order {0}")]
    NoPayment(OrderId),

    /// The payment belongs to another order.
    #[error("payment {payment_id} belongs to order {reference}, not {order_id}")]
    PaymentMismatch {
        order_id: OrderId,
        payment_id: String,
        reference: String,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    MercadoPago(#[from] MercadoPagoError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// One product's stock movement caused by an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub product_id: ProductId,
    pub name: String,
    pub before: i64,
    pub after: i64,
}

/// Result of reprocessing or transitioning one order.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub order_id: OrderId,
    pub payment_id: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    pub stock: StockAction,
    pub stock_changes: Vec<StockChange>,
    /// Event dispatched after the write, if any.
    pub notified: Option<NotificationEvent>,
    pub dispatch: Option<DispatchReport>,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.new_status
    }
}

/// Result of reprocessing every pending MercadoPago order.
#[derive(Debug, Default)]
pub struct PendingReport {
    pub outcomes: Vec<ReconcileOutcome>,
    pub errors: Vec<(OrderId, String)>,
}

/// Carrier and tracking number entered when shipping.
#[derive(Debug, Clone, Default)]
pub struct ShipmentDetails {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

/// Applies payment updates and admin transitions to orders.
pub struct ReconciliationService<'a> {
    store: &'a Store,
    mercadopago: Option<&'a MercadoPagoClient>,
    notifications: &'a NotificationService,
}

impl<'a> ReconciliationService<'a> {
    #[must_use]
    pub const fn new(
        store: &'a Store,
        mercadopago: Option<&'a MercadoPagoClient>,
        notifications: &'a NotificationService,
    ) -> Self {
        Self {
            store,
            mercadopago,
            notifications,
        }
    }

    fn client(&self) -> Result<&'a MercadoPagoClient, ReconcileError> {
        self.mercadopago
            .ok_or(ReconcileError::MercadoPago(MercadoPagoError::NotConfigured))
    }

    /// Re-fetch an order's payment from MercadoPago and sync the order.
    ///
    /// Uses the stored payment ID when there is one, else the latest
    /// payment whose external reference is the order ID.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::OrderNotFound`, `ReconcileError::NoPayment`,
    /// `TransitionError::UnknownPaymentStatus` (order untouched), or the
    /// MercadoPago/storage error.
    #[instrument(skip(self))]
    pub async fn reprocess(
        &self,
        order_id: &OrderId,
        actor: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile(order_id, actor, None).await
    }

    /// Handle a `payment` webhook: fetch the payment and sync its order.
    ///
    /// Returns `Ok(None)` when the payment carries no order reference.
    ///
    /// # Errors
    ///
    /// Same as [`ReconciliationService::reprocess`].
    #[instrument(skip(self))]
    pub async fn handle_webhook(
        &self,
        payment_id: &str,
    ) -> Result<Option<ReconcileOutcome>, ReconcileError> {
        let payment = self.client()?.get_payment(payment_id).await?;
        let Some(reference) = payment
            .external_reference
            .clone()
            .filter(|r| !r.trim().is_empty())
        else {
            info!(payment_id, "Webhook payment has no external reference, ignoring");
            return Ok(None);
        };

        let order_id = OrderId::new(reference);
        self.reconcile(&order_id, MERCADOPAGO_ACTOR, Some(payment))
            .await
            .map(Some)
    }

    /// Reprocess every active MercadoPago order still awaiting payment.
    ///
    /// Orders are handled one at a time; a failure is recorded and the
    /// loop continues.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Repository` if the order list cannot be read.
    #[instrument(skip(self))]
    pub async fn reprocess_pending(&self, actor: &str) -> Result<PendingReport, ReconcileError> {
        self.client()?;
        let pending = OrderRepository::new(self.store)
            .list(&OrderFilter {
                statuses: vec![OrderStatus::Pending, OrderStatus::InProcess],
                archived: Some(false),
                search: None,
            })
            .await?;

        let mut report = PendingReport::default();
        for order in pending
            .into_iter()
            .filter(|o| o.payment.method == PaymentMethod::Mercadopago)
        {
            match self.reprocess(&order.id, actor).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "Reprocess failed");
                    report.errors.push((order.id, e.to_string()));
                }
            }
        }

        info!(
            processed = report.outcomes.len(),
            failed = report.errors.len(),
            "Pending orders reprocessed"
        );
        Ok(report)
    }

    /// Move an order to `target` on an admin's request.
    ///
    /// Shipping records the carrier, tracking number and `shipped_at`;
    /// delivering records `delivered_at`.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::NotAllowed` for moves outside the workflow,
    /// `ReconcileError::OrderNotFound`, or the storage error.
    #[instrument(skip(self, shipment))]
    pub async fn apply_manual_transition(
        &self,
        order_id: &OrderId,
        target: OrderStatus,
        actor: &str,
        shipment: Option<ShipmentDetails>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut orders = self.store.orders().lock().await?;
        let index = find_order(&orders, order_id)?;
        let plan = plan_manual_transition(&orders[index].snapshot(), target)?;

        let now = Utc::now();
        let order = &mut orders[index];
        match target {
            OrderStatus::Shipped => {
                if let Some(details) = shipment {
                    order.shipping.carrier = clean(details.carrier).or(order.shipping.carrier.take());
                    order.shipping.tracking_number =
                        clean(details.tracking_number).or(order.shipping.tracking_number.take());
                }
                order.shipping.shipped_at = Some(now);
            }
            OrderStatus::Delivered => order.shipping.delivered_at = Some(now),
            _ => {}
        }

        let (order, stock_changes) = self.execute(orders, index, &plan, actor, None).await?;
        Ok(self
            .finish(order, &plan, stock_changes, None, None)
            .await)
    }

    async fn reconcile(
        &self,
        order_id: &OrderId,
        actor: &str,
        known_payment: Option<Payment>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let client = self.client()?;
        let payment = match known_payment {
            Some(payment) => payment,
            None => self.fetch_payment(client, order_id).await?,
        };

        if let Some(reference) = payment
            .external_reference
            .as_deref()
            .filter(|r| *r != order_id.as_str())
        {
            return Err(ReconcileError::PaymentMismatch {
                order_id: order_id.clone(),
                payment_id: payment.id.to_string(),
                reference: reference.to_owned(),
            });
        }

        let mut orders = self.store.orders().lock().await?;
        let index = find_order(&orders, order_id)?;
        let snapshot = orders[index].snapshot();
        let plan = if is_current_attempt(&orders[index], &payment) {
            plan_payment_update(&snapshot, &payment.status)?
        } else {
            plan_other_attempt(&snapshot, &payment.status)?
        };
        record_payment(&mut orders[index], &payment);

        let note = Some(format!(
            "Pago {} {}",
            payment.id,
            payment
                .status_detail
                .as_deref()
                .unwrap_or_else(|| payment.status.as_str())
        ));
        let (order, stock_changes) = self.execute(orders, index, &plan, actor, note).await?;

        Ok(self
            .finish(
                order,
                &plan,
                stock_changes,
                Some(payment.id.to_string()),
                Some(payment.status),
            )
            .await)
    }

    /// The order's stored payment, else its latest one in MercadoPago.
    async fn fetch_payment(
        &self,
        client: &MercadoPagoClient,
        order_id: &OrderId,
    ) -> Result<Payment, ReconcileError> {
        let order = OrderRepository::new(self.store)
            .get(order_id)
            .await?
            .ok_or_else(|| ReconcileError::OrderNotFound(order_id.clone()))?;

        match order.payment.payment_id {
            Some(payment_id) => Ok(client.get_payment(&payment_id).await?),
            None => client
                .latest_payment_for_order(order_id.as_str())
                .await?
                .ok_or_else(|| ReconcileError::NoPayment(order_id.clone())),
        }
    }

    /// Steps 3 and 4: stock, then the order. Consumes the orders lock.
    async fn execute(
        &self,
        mut orders: crate::db::JsonGuard<'_, Vec<Order>>,
        index: usize,
        plan: &TransitionPlan,
        actor: &str,
        note: Option<String>,
    ) -> Result<(Order, Vec<StockChange>), ReconcileError> {
        let mut stock_changes = Vec::new();
        if plan.stock != StockAction::None {
            let mut products = self.store.products().lock().await?;
            stock_changes = adjust_stock(&mut products, &orders[index].items, plan.stock);
            products.commit().await?;
        }

        let order = &mut orders[index];
        order.apply(plan, actor, note);
        let order = order.clone();
        orders.commit().await?;

        info!(
            order_id = %order.id,
            from = %plan.from,
            to = %order.status,
            stock = plan.stock.as_str(),
            "Order updated"
        );
        Ok((order, stock_changes))
    }

    /// Step 5 and the outcome.
    async fn finish(
        &self,
        order: Order,
        plan: &TransitionPlan,
        stock_changes: Vec<StockChange>,
        payment_id: Option<String>,
        payment_status: Option<PaymentStatus>,
    ) -> ReconcileOutcome {
        let dispatch = match plan.notify {
            Some(event) => Some(self.notifications.dispatch(self.store, &order, event).await),
            None => None,
        };

        ReconcileOutcome {
            order_id: order.id,
            payment_id,
            payment_status,
            previous_status: plan.from,
            new_status: order.status,
            stock: plan.stock,
            stock_changes,
            notified: plan.notify,
            dispatch,
        }
    }
}

fn find_order(orders: &[Order], order_id: &OrderId) -> Result<usize, ReconcileError> {
    orders
        .iter()
        .position(|o| &o.id == order_id)
        .ok_or_else(|| ReconcileError::OrderNotFound(order_id.clone()))
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Whether `payment` is the attempt the order's status is based on.
///
/// Unpaid orders follow every attempt. A paid order is based on its stored
/// payment; with none stored it was approved by hand.
fn is_current_attempt(order: &Order, payment: &Payment) -> bool {
    !order.status.is_paid()
        || order.payment.payment_id.as_deref() == Some(payment.id.to_string().as_str())
}

/// Copy payment details onto the order.
///
/// A paid order keeps its approved payment's details when a different,
/// unapproved attempt shows up; only the check time moves.
fn record_payment(order: &mut Order, payment: &Payment) {
    let replaces = is_current_attempt(order, payment)
        || matches!(payment.status, PaymentStatus::Approved | PaymentStatus::Refunded);

    if replaces {
        order.payment.payment_id = Some(payment.id.to_string());
        order.payment.status = Some(payment.status.clone());
        order.payment.status_detail.clone_from(&payment.status_detail);
    }
    order.payment.last_checked_at = Some(Utc::now());
}

/// Subtract or return item quantities. Unknown products are skipped.
fn adjust_stock(
    products: &mut [Product],
    items: &[OrderItem],
    action: StockAction,
) -> Vec<StockChange> {
    let sign: i64 = match action {
        StockAction::Reduce => -1,
        StockAction::Restore => 1,
        StockAction::None => return Vec::new(),
    };

    let now = Utc::now();
    let mut changes = Vec::new();
    for item in items {
        let Some(product) = products.iter_mut().find(|p| p.id == item.product_id) else {
            warn!(product_id = %item.product_id, "Order item references a missing product");
            continue;
        };
        let before = product.stock;
        product.stock = before.saturating_add(sign * i64::from(item.quantity));
        product.updated_at = now;
        if product.stock < 0 {
            warn!(product_id = %product.id, stock = product.stock, "Product oversold");
        }
        changes.push(StockChange {
            product_id: product.id.clone(),
            name: product.name.clone(),
            before,
            after: product.stock,
        });
    }
    changes
}

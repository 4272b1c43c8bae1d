//! MercadoPago payment reprocessing commands.
//!
//! Requires `MERCADOPAGO_ACCESS_TOKEN`. Notifications are sent exactly as
//! when the panel reprocesses a payment, if SMTP or Telegram is configured.

use tracing::{info, warn};

use tienda_admin::services::ReconcileOutcome;
use tienda_admin::state::AppState;
use tienda_core::OrderId;

use super::CommandError;

/// Actor recorded in the order history for CLI changes.
const CLI_ACTOR: &str = "cli";

fn log_outcome(outcome: &ReconcileOutcome) {
    if outcome.status_changed() {
        info!(
            "{}: {} -> {} (payment {})",
            outcome.order_id,
            outcome.previous_status,
            outcome.new_status,
            outcome.payment_id.as_deref().unwrap_or("-")
        );
    } else {
        info!("{}: unchanged ({})", outcome.order_id, outcome.new_status);
    }
    for change in &outcome.stock_changes {
        info!(
            "  stock {} ({}): {} -> {}",
            change.product_id, change.name, change.before, change.after
        );
    }
    if let Some(event) = outcome.notified {
        info!("  notified: {}", event.title());
    }
}

/// Re-fetch one order's payment and sync the order.
///
/// # Errors
///
/// Returns `CommandError::Reconcile` if the order or its payment cannot be
/// found, MercadoPago is not configured, or the update fails.
pub async fn reprocess(state: &AppState, order_id: &str) -> Result<(), CommandError> {
    let outcome = state
        .reconciliation()
        .reprocess(&OrderId::new(order_id.trim()), CLI_ACTOR)
        .await?;
    log_outcome(&outcome);
    Ok(())
}

/// Re-fetch every pending MercadoPago order.
///
/// # Errors
///
/// Returns `CommandError::Reconcile` if MercadoPago is not configured or
/// the order list cannot be read. Per-order failures are logged.
pub async fn reprocess_pending(state: &AppState) -> Result<(), CommandError> {
    let report = state.reconciliation().reprocess_pending(CLI_ACTOR).await?;

    for outcome in &report.outcomes {
        log_outcome(outcome);
    }
    for (order_id, error) in &report.errors {
        warn!("{}: {}", order_id, error);
    }

    let updated = report.outcomes.iter().filter(|o| o.status_changed()).count();
    info!(
        "Checked {} pending orders, {} updated, {} failed",
        report.outcomes.len() + report.errors.len(),
        updated,
        report.errors.len()
    );
    Ok(())
}

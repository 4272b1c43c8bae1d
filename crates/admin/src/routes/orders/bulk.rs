//! Bulk action handlers for orders.

use axum::{
    Form,
    extract::State,
    response::Redirect,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use tienda_core::{OrderId, OrderStatus};

use crate::db::OrderRepository;
use crate::error::AppError;
use crate::middleware::RequireWriter;
use crate::routes::{check_csrf, parse_ids, redirect_flash};
use crate::state::AppState;

/// Input for bulk order actions.
#[derive(Debug, Deserialize)]
pub struct BulkOrdersInput {
    #[serde(default)]
    pub csrf_token: String,
    /// Comma-separated list of order IDs.
    #[serde(default)]
    pub order_ids: String,
    /// `status`, `archive`, `unarchive` or `delete`.
    pub action: String,
    /// Target for `status`.
    #[serde(default)]
    pub status: String,
    /// List URL to go back to, filters included.
    #[serde(default)]
    pub return_to: String,
}

/// Apply one action to every selected order.
///
/// Status changes run one order at a time through the same workflow as
/// the detail page; orders that may not make the move are skipped.
#[instrument(skip(admin, state, session, input), fields(admin_id = %admin.id, action = %input.action))]
pub async fn bulk(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Form(input): Form<BulkOrdersInput>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &input.csrf_token).await?;
    let back = safe_return(&input.return_to);

    let ids: Vec<OrderId> = parse_ids(&input.order_ids);
    if ids.is_empty() {
        return Ok(redirect_flash(back, "error", "nothing_selected"));
    }

    let repo = OrderRepository::new(state.store());
    match input.action.as_str() {
        "archive" => {
            let changed = repo.set_archived_many(&ids, true).await?;
            tracing::info!(changed, "Bulk archive completed");
        }
        "unarchive" => {
            let changed = repo.set_archived_many(&ids, false).await?;
            tracing::info!(changed, "Bulk unarchive completed");
        }
        "delete" => {
            let removed = repo.delete_many(&ids).await?;
            tracing::info!(removed, "Bulk delete completed");
        }
        "status" => {
            let Ok(target) = input.status.parse::<OrderStatus>() else {
                return Ok(redirect_flash(back, "error", "invalid"));
            };
            let service = state.reconciliation();
            let mut error_messages = Vec::new();
            for id in &ids {
                if let Err(e) = service
                    .apply_manual_transition(id, target, &admin.username, None)
                    .await
                {
                    error_messages.push(format!("{id}: {e}"));
                }
            }

            if !error_messages.is_empty() {
                tracing::warn!(
                    success = ids.len() - error_messages.len(),
                    errors = ?error_messages,
                    "Bulk status change completed with errors"
                );
                return Ok(redirect_flash(back, "error", "partial"));
            }
            tracing::info!(count = ids.len(), to = %target, "Bulk status change completed");
        }
        other => return Err(AppError::BadRequest(format!("unknown action {other}"))),
    }

    Ok(redirect_flash(back, "success", "bulk"))
}

/// Only local order-list URLs are followed.
fn safe_return(return_to: &str) -> &str {
    if return_to == "/orders" || return_to.starts_with("/orders?") {
        return_to
    } else {
        "/orders"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_return_rejects_foreign_urls() {
        assert_eq!(safe_return("/orders?status=approved"), "/orders?status=approved");
        assert_eq!(safe_return("https://evil.example/orders"), "/orders");
        assert_eq!(safe_return("//evil.example"), "/orders");
        assert_eq!(safe_return("/ordersx"), "/orders");
        assert_eq!(safe_return(""), "/orders");
    }
}

//! MercadoPago webhook endpoint.
//!
//! MercadoPago calls `POST /webhooks/mercadopago?data.id=..&type=payment`
//! with a JSON body carrying the same data. The notification is only a
//! hint: the payment is always re-fetched from the API before any order
//! changes.
//!
//! Responses follow what MercadoPago retries: 2xx for anything we have
//! handled or chosen to ignore, 401 for a bad signature, 5xx when the
//! payment could not be fetched or stored so the call is retried later.

use std::collections::HashMap;

use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::instrument;

use tienda_core::TransitionError;

use crate::error::AppError;
use crate::mercadopago::{MercadoPagoError, WebhookNotification};
use crate::services::ReconcileError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/mercadopago", post(mercadopago))
}

/// Payment ID from the query string, falling back to the JSON body.
///
/// Legacy IPN calls use `topic=payment&id=..` instead of `type`/`data.id`.
fn payment_id(query: &HashMap<String, String>, body: &[u8]) -> Option<String> {
    let kind = query.get("type").or_else(|| query.get("topic"));
    if let Some(kind) = kind {
        if kind != "payment" {
            return None;
        }
        if let Some(id) = query
            .get("data.id")
            .or_else(|| query.get("id"))
            .filter(|id| !id.trim().is_empty())
        {
            return Some(id.trim().to_owned());
        }
    }

    serde_json::from_slice::<WebhookNotification>(body)
        .ok()
        .and_then(|notification| notification.payment_id().map(str::to_owned))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Receive a MercadoPago notification.
#[instrument(skip(state, headers, body))]
async fn mercadopago(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(payment_id) = payment_id(&query, &body) else {
        tracing::debug!(?query, "Ignoring non-payment MercadoPago notification");
        return StatusCode::OK.into_response();
    };

    let Some(client) = state.mercadopago() else {
        tracing::warn!(payment_id, "Webhook received but MercadoPago is not configured");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    if client.has_webhook_secret() {
        if let Err(e) = client.verify_webhook_signature(
            header(&headers, "x-signature"),
            header(&headers, "x-request-id"),
            &payment_id,
        ) {
            tracing::warn!(payment_id, error = %e, "Rejected MercadoPago webhook");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    } else {
        tracing::warn!("MERCADOPAGO_WEBHOOK_SECRET not set; accepting unsigned webhook");
    }

    match state.reconciliation().handle_webhook(&payment_id).await {
        Ok(Some(outcome)) => {
            tracing::info!(
                payment_id,
                order_id = %outcome.order_id,
                from = %outcome.previous_status,
                to = %outcome.new_status,
                "Webhook reconciled order"
            );
            StatusCode::OK.into_response()
        }
        Ok(None) => StatusCode::OK.into_response(),
        Err(ReconcileError::OrderNotFound(order_id)) => {
            tracing::warn!(payment_id, %order_id, "Webhook for unknown order");
            StatusCode::OK.into_response()
        }
        Err(
            e @ (ReconcileError::PaymentMismatch { .. }
            | ReconcileError::Transition(TransitionError::UnknownPaymentStatus(_))),
        ) => {
            tracing::warn!(payment_id, error = %e, "Webhook payment left unapplied");
            StatusCode::OK.into_response()
        }
        Err(ReconcileError::MercadoPago(MercadoPagoError::NotFound(_))) => {
            tracing::warn!(payment_id, "Webhook payment not found in MercadoPago");
            StatusCode::OK.into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_payment_id_from_query() {
        let q = query(&[("type", "payment"), ("data.id", "123456")]);
        assert_eq!(payment_id(&q, b""), Some("123456".to_owned()));
    }

    #[test]
    fn test_payment_id_from_legacy_ipn() {
        let q = query(&[("topic", "payment"), ("id", "987")]);
        assert_eq!(payment_id(&q, b""), Some("987".to_owned()));
    }

    #[test]
    fn test_payment_id_from_body() {
        let body = br#"{"type":"payment","action":"payment.updated","data":{"id":"555"}}"#;
        assert_eq!(payment_id(&HashMap::new(), body), Some("555".to_owned()));
    }

    #[test]
    fn test_non_payment_topics_are_ignored() {
        let q = query(&[("topic", "merchant_order"), ("id", "1")]);
        assert_eq!(payment_id(&q, b""), None);
        assert_eq!(payment_id(&HashMap::new(), b"not json"), None);
    }
}

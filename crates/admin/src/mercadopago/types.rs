//! MercadoPago payment payloads.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::Deserialize;

use tienda_core::PaymentStatus;

/// A payment as returned by `GET /v1/payments/{id}`.
///
/// Only the fields reconciliation reads are mapped.
#[derive(Debug, Clone, Deserialize)]
pub struct Payment {
    pub id: u64,
    pub status: PaymentStatus,
    #[serde(default)]
    pub status_detail: Option<String>,
    /// The local order ID set at checkout.
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub transaction_amount: Option<Decimal>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub date_created: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub date_last_updated: Option<DateTime<FixedOffset>>,
}

impl Payment {
    /// Most recent timestamp on the payment, for picking the latest attempt.
    #[must_use]
    pub fn last_activity(&self) -> Option<DateTime<FixedOffset>> {
        self.date_last_updated.or(self.date_created)
    }
}

/// Body of `GET /v1/payments/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSearch {
    #[serde(default)]
    pub results: Vec<Payment>,
}

/// Error body MercadoPago sends with 4xx/5xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Webhook notification body (`type=payment`).
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookNotification {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<WebhookData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    /// Payment ID. MercadoPago sends it as a string, older payloads as a number.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

impl WebhookNotification {
    /// Payment ID when this notification is about a payment.
    #[must_use]
    pub fn payment_id(&self) -> Option<&str> {
        let is_payment = self.kind.as_deref() == Some("payment")
            || self
                .action
                .as_deref()
                .is_some_and(|action| action.starts_with("payment."));
        if !is_payment {
            return None;
        }
        self.data.as_ref().map(|data| data.id.as_str())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

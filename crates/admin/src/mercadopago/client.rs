//! MercadoPago REST client.
//!
//! Read-only access to payments plus webhook signature verification:
//! <https://www.mercadopago.com.ar/developers/en/docs/your-integrations/notifications/webhooks>

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use super::error::MercadoPagoError;
use super::types::{ApiErrorBody, Payment, PaymentSearch};
use crate::config::MercadoPagoConfig;

/// Maximum age of a webhook signature timestamp.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// MercadoPago API client.
#[derive(Clone)]
pub struct MercadoPagoClient {
    client: Client,
    access_token: SecretString,
    webhook_secret: Option<SecretString>,
    api_base: String,
}

impl std::fmt::Debug for MercadoPagoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercadoPagoClient")
            .field("access_token", &"[REDACTED]")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl MercadoPagoClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &MercadoPagoConfig) -> Result<Self, MercadoPagoError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            webhook_secret: config.webhook_secret.clone(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        })
    }

    /// Whether incoming webhooks can be verified.
    #[must_use]
    pub const fn has_webhook_secret(&self) -> bool {
        self.webhook_secret.is_some()
    }

    /// Fetch one payment.
    ///
    /// # Errors
    ///
    /// Returns `MercadoPagoError::NotFound` for an unknown ID, or the
    /// request/API error.
    #[instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: &str) -> Result<Payment, MercadoPagoError> {
        if payment_id.is_empty() || !payment_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MercadoPagoError::NotFound(payment_id.to_owned()));
        }

        let response = self
            .client
            .get(format!("{}/v1/payments/{payment_id}", self.api_base))
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(MercadoPagoError::NotFound(payment_id.to_owned()));
        }

        let payment: Payment = Self::parse(response).await?;
        debug!(status = %payment.status, "Fetched MercadoPago payment");
        Ok(payment)
    }

    /// Payments whose `external_reference` is `reference`, newest first.
    ///
    /// # Errors
    ///
    /// Returns the request/API error.
    #[instrument(skip(self))]
    pub async fn search_payments(
        &self,
        reference: &str,
    ) -> Result<Vec<Payment>, MercadoPagoError> {
        let response = self
            .client
            .get(format!("{}/v1/payments/search", self.api_base))
            .bearer_auth(self.access_token.expose_secret())
            .query(&[
                ("external_reference", reference),
                ("sort", "date_created"),
                ("criteria", "desc"),
            ])
            .send()
            .await?;

        let search: PaymentSearch = Self::parse(response).await?;
        debug!(count = search.results.len(), "Searched MercadoPago payments");
        Ok(search.results)
    }

    /// The most recently updated payment for an order, if any.
    ///
    /// # Errors
    ///
    /// Returns the request/API error.
    pub async fn latest_payment_for_order(
        &self,
        order_id: &str,
    ) -> Result<Option<Payment>, MercadoPagoError> {
        let payments = self.search_payments(order_id).await?;
        Ok(pick_latest(payments, order_id))
    }

    /// Verify a webhook's `x-signature` header.
    ///
    /// The header looks like `ts=1704908010,v1=618c85...`. The signed
    /// manifest is `id:{data_id};request-id:{x-request-id};ts:{ts};` and the
    /// signature is HMAC-SHA256 with the webhook secret, hex encoded.
    ///
    /// # Errors
    ///
    /// Returns `MercadoPagoError::NotConfigured` without a webhook secret,
    /// `MercadoPagoError::InvalidSignature` otherwise.
    #[instrument(skip(self, x_signature))]
    pub fn verify_webhook_signature(
        &self,
        x_signature: &str,
        x_request_id: &str,
        data_id: &str,
    ) -> Result<(), MercadoPagoError> {
        let secret = self
            .webhook_secret
            .as_ref()
            .ok_or(MercadoPagoError::NotConfigured)?;
        verify_signature(
            secret.expose_secret(),
            x_signature,
            x_request_id,
            data_id,
            chrono::Utc::now().timestamp(),
        )
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, MercadoPagoError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|err| err.message.or(err.error))
                .unwrap_or(body);
            warn!(status = status.as_u16(), %message, "MercadoPago API error");
            return Err(MercadoPagoError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| MercadoPagoError::Response(e.to_string()))
    }
}

/// Latest payment carrying `order_id` as external reference.
fn pick_latest(payments: Vec<Payment>, order_id: &str) -> Option<Payment> {
    payments
        .into_iter()
        .filter(|p| p.external_reference.as_deref() == Some(order_id))
        .max_by_key(Payment::last_activity)
}

/// Signature check with an explicit clock, shared by the client and tests.
fn verify_signature(
    secret: &str,
    x_signature: &str,
    x_request_id: &str,
    data_id: &str,
    now: i64,
) -> Result<(), MercadoPagoError> {
    let mut ts = None;
    let mut v1 = None;
    for part in x_signature.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim()),
            Some(("v1", value)) => v1 = Some(value.trim()),
            _ => {}
        }
    }
    let ts = ts.ok_or_else(|| MercadoPagoError::InvalidSignature("missing ts".to_owned()))?;
    let v1 = v1.ok_or_else(|| MercadoPagoError::InvalidSignature("missing v1".to_owned()))?;

    let mut ts_secs: i64 = ts
        .parse()
        .map_err(|_| MercadoPagoError::InvalidSignature("invalid timestamp".to_owned()))?;
    // Some integrations send milliseconds.
    if ts_secs > 100_000_000_000 {
        ts_secs /= 1000;
    }
    if (now - ts_secs).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(MercadoPagoError::InvalidSignature(
            "timestamp outside tolerance".to_owned(),
        ));
    }

    // MercadoPago signs alphanumeric IDs in lowercase.
    let manifest = format!(
        "id:{};request-id:{x_request_id};ts:{ts};",
        data_id.to_lowercase()
    );

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| MercadoPagoError::InvalidSignature(e.to_string()))?;
    mac.update(manifest.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if !constant_time_compare(&expected, &v1.to_ascii_lowercase()) {
        return Err(MercadoPagoError::InvalidSignature(
            "signature mismatch".to_owned(),
        ));
    }

    debug!("MercadoPago signature verified");
    Ok(())
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "mp-webhook-secret";
    const NOW: i64 = 1_704_908_010;

    fn sign(data_id: &str, request_id: &str, ts: &str) -> String {
        let manifest = format!("id:{data_id};request-id:{request_id};ts:{ts};");
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(manifest.as_bytes());
        format!("ts={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature() {
        let header = sign("123456", "req-1", &NOW.to_string());
        assert!(verify_signature(SECRET, &header, "req-1", "123456", NOW + 10).is_ok());
    }

    #[test]
    fn test_millisecond_timestamp_is_accepted() {
        let ts = (NOW * 1000).to_string();
        let header = sign("123456", "req-1", &ts);
        assert!(verify_signature(SECRET, &header, "req-1", "123456", NOW).is_ok());
    }

    #[test]
    fn test_tampered_fields_are_rejected() {
        let header = sign("123456", "req-1", &NOW.to_string());
        assert!(matches!(
            verify_signature(SECRET, &header, "req-1", "999999", NOW),
            Err(MercadoPagoError::InvalidSignature(_))
        ));
        assert!(matches!(
            verify_signature(SECRET, &header, "req-2", "123456", NOW),
            Err(MercadoPagoError::InvalidSignature(_))
        ));
        assert!(matches!(
            verify_signature("other-secret", &header, "req-1", "123456", NOW),
            Err(MercadoPagoError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_stale_or_malformed_header_is_rejected() {
        let header = sign("1", "req", &NOW.to_string());
        assert!(verify_signature(SECRET, &header, "req", "1", NOW + 301).is_err());
        assert!(verify_signature(SECRET, "v1=abc", "req", "1", NOW).is_err());
        assert!(verify_signature(SECRET, "ts=abc,v1=abc", "req", "1", NOW).is_err());
        assert!(verify_signature(SECRET, "", "req", "1", NOW).is_err());
    }

    #[test]
    fn test_pick_latest_ignores_other_references() {
        let payments: Vec<Payment> = serde_json::from_str(
            r#"[
                {"id": 1, "status": "rejected", "external_reference": "ord_1",
                 "date_created": "2024-05-01T10:00:00Z"},
                {"id": 2, "status": "approved", "external_reference": "ord_1",
                 "date_created": "2024-05-01T11:00:00Z"},
                {"id": 3, "status": "approved", "external_reference": "ord_10",
                 "date_created": "2024-05-02T11:00:00Z"}
            ]"#,
        )
        .unwrap();
        assert_eq!(pick_latest(payments, "ord_1").map(|p| p.id), Some(2));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}

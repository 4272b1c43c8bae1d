//! Integration tests for MercadoPago webhooks and payment reprocessing,
//! run against an in-process fake of the payments API.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use serde_json::{Value, json};

use tienda_core::{AdminRole, OrderStatus, PaymentStatus};
use tienda_integration_tests::{FakeMercadoPago, TestContext, order, product, sign_webhook};

const SECRET: &str = "whsec-test-secret";

async fn store_with_mercadopago(fake: &FakeMercadoPago, secret: Option<&str>) -> TestContext {
    let mercadopago = fake.config(secret);
    let ctx = TestContext::with_config(|config| config.mercadopago = Some(mercadopago)).await;
    ctx.seed_products(vec![product("p1", "Remera", "500", 5)]).await;
    ctx.seed_orders(vec![
        order("ORD-1", "pending", &[("p1", 2, "500")]),
        order("ORD-2", "in_process", &[("p1", 1, "500")]),
    ])
    .await;
    ctx
}

async fn send_webhook(ctx: &TestContext, payment_id: &str, signature: &str) -> reqwest::Response {
    ctx.client
        .post(ctx.url(&format!(
            "/webhooks/mercadopago?type=payment&data.id={payment_id}"
        )))
        .header("x-signature", signature)
        .header("x-request-id", "req-123")
        .json(&json!({
            "type": "payment",
            "action": "payment.updated",
            "data": { "id": payment_id },
        }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_signed_webhook_approves_order() {
    let fake = FakeMercadoPago::start().await;
    fake.add_payment(1001, "ORD-1", "approved");
    let ctx = store_with_mercadopago(&fake, Some(SECRET)).await;

    let signature = sign_webhook(SECRET, "req-123", "1001");
    let resp = send_webhook(&ctx, "1001", &signature).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let approved = ctx.order("ORD-1").await;
    assert_eq!(approved.status, OrderStatus::Approved);
    assert!(approved.stock_reduced);
    assert_eq!(approved.payment.payment_id.as_deref(), Some("1001"));
    assert_eq!(approved.payment.status, Some(PaymentStatus::Approved));
    assert_eq!(approved.history.last().unwrap().actor, "mercadopago");
    assert_eq!(ctx.products().await[0].stock, 3);

    // A repeated notification changes nothing.
    let resp = send_webhook(&ctx, "1001", &signature).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(ctx.products().await[0].stock, 3);
    assert_eq!(ctx.order("ORD-1").await.history.len(), 1);
}

#[tokio::test]
async fn test_late_rejection_of_earlier_attempt_keeps_order_paid() {
    let fake = FakeMercadoPago::start().await;
    fake.add_payment(1000, "ORD-1", "rejected");
    fake.add_payment(1001, "ORD-1", "approved");
    let ctx = store_with_mercadopago(&fake, None).await;

    let resp = send_webhook(&ctx, "1001", "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(ctx.products().await[0].stock, 3);

    // The first attempt's rejection arrives after the approval.
    let resp = send_webhook(&ctx, "1000", "").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let paid = ctx.order("ORD-1").await;
    assert_eq!(paid.status, OrderStatus::Approved);
    assert!(paid.stock_reduced);
    assert_eq!(paid.payment.payment_id.as_deref(), Some("1001"));
    assert_eq!(paid.payment.status, Some(PaymentStatus::Approved));
    assert_eq!(paid.history.len(), 1);
    assert_eq!(ctx.products().await[0].stock, 3);
}

#[tokio::test]
async fn test_webhook_with_bad_signature_is_rejected() {
    let fake = FakeMercadoPago::start().await;
    fake.add_payment(1001, "ORD-1", "approved");
    let ctx = store_with_mercadopago(&fake, Some(SECRET)).await;

    let forged = sign_webhook("another-secret", "req-123", "1001");
    let resp = send_webhook(&ctx, "1001", &forged).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = send_webhook(&ctx, "1001", "").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(ctx.order("ORD-1").await.status, OrderStatus::Pending);
    assert_eq!(ctx.products().await[0].stock, 5);
}

#[tokio::test]
async fn test_webhook_for_unknown_order_or_payment_is_acknowledged() {
    let fake = FakeMercadoPago::start().await;
    fake.add_payment(2002, "ORD-999", "approved");
    let ctx = store_with_mercadopago(&fake, None).await;

    let resp = send_webhook(&ctx, "2002", "").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send_webhook(&ctx, "3003", "").await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Non-payment topics are ignored.
    let resp = ctx
        .client
        .post(ctx.url("/webhooks/mercadopago?topic=merchant_order&id=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_without_mercadopago_configured() {
    let ctx = TestContext::new().await;
    let resp = send_webhook(&ctx, "1001", "").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_reprocess_single_order() {
    let fake = FakeMercadoPago::start().await;
    fake.add_payment(1001, "ORD-1", "rejected");
    let ctx = store_with_mercadopago(&fake, None).await;
    ctx.login_as("duenio", AdminRole::Admin).await;

    let resp = ctx
        .post_json("/api/orders/ORD-1/reprocess-payment", &json!({}))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["outcome"]["previous_status"], "pending");
    assert_eq!(body["outcome"]["new_status"], "rejected");
    assert_eq!(body["outcome"]["changed"], true);

    let rejected = ctx.order("ORD-1").await;
    assert_eq!(rejected.status, OrderStatus::Rejected);
    assert!(!rejected.stock_reduced);
    assert_eq!(ctx.products().await[0].stock, 5);

    let resp = ctx
        .post_json("/api/orders/ORD-404/reprocess-payment", &json!({}))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reprocess_pending_orders() {
    let fake = FakeMercadoPago::start().await;
    fake.add_payment(1001, "ORD-1", "approved");
    let ctx = store_with_mercadopago(&fake, None).await;
    ctx.login_as("duenio", AdminRole::Admin).await;

    let resp = ctx
        .post_json("/api/orders/reprocess-pending", &json!({}))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["checked"], 2);
    assert_eq!(body["updated"], 1);
    // ORD-2 has no payment at MercadoPago yet.
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
    assert_eq!(body["errors"][0]["order_id"], "ORD-2");

    assert_eq!(ctx.order("ORD-1").await.status, OrderStatus::Approved);
    assert_eq!(ctx.order("ORD-2").await.status, OrderStatus::InProcess);
}

#[tokio::test]
async fn test_viewer_cannot_reprocess() {
    let fake = FakeMercadoPago::start().await;
    let ctx = store_with_mercadopago(&fake, None).await;
    ctx.login_as("mirada", AdminRole::Viewer).await;

    let resp = ctx
        .post_json("/api/orders/ORD-1/reprocess-payment", &json!({}))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

//! Integration tests for order status changes and shipments.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;

use tienda_core::{AdminRole, OrderStatus};
use tienda_integration_tests::{TestContext, location, order, product};

async fn store_with_orders() -> TestContext {
    let ctx = TestContext::new().await;
    ctx.login_as("duenio", AdminRole::Admin).await;
    ctx.seed_products(vec![
        product("p1", "Remera", "500", 5),
        product("p2", "Gorra", "250", 1),
    ])
    .await;
    ctx.seed_orders(vec![
        order("ORD-1", "pending", &[("p1", 2, "500")]),
        order("ORD-2", "approved", &[("p2", 1, "250")]),
        order("ORD-3", "delivered", &[("p1", 1, "500")]),
    ])
    .await;
    ctx
}

async fn stock(ctx: &TestContext, id: &str) -> i64 {
    ctx.products()
        .await
        .into_iter()
        .find(|p| p.id.as_str() == id)
        .unwrap()
        .stock
}

#[tokio::test]
async fn test_orders_list_and_detail() {
    let ctx = store_with_orders().await;

    let page = ctx.get("/orders").await.text().await.unwrap();
    assert!(page.contains("ORD-1"));
    assert!(page.contains("ORD-2"));

    let page = ctx.get("/orders?status=approved").await.text().await.unwrap();
    assert!(page.contains("ORD-2"));
    assert!(!page.contains(r#"href="/orders/ORD-1""#));

    let resp = ctx.get("/orders/ORD-1").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = resp.text().await.unwrap();
    assert!(page.contains("Ana Pérez"));
    assert!(page.contains("Av. Siempreviva 742"));

    let resp = ctx.get("/orders/NOPE").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_detail_renders_when_line_total_overflows() {
    let ctx = TestContext::new().await;
    ctx.login_as("duenio", AdminRole::Admin).await;
    ctx.seed_orders(vec![order(
        "ORD-9",
        "pending",
        &[("p1", 2, "70000000000000000000000000000")],
    )])
    .await;

    let resp = ctx.get("/orders/ORD-9").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("ORD-9"));
}

#[tokio::test]
async fn test_manual_approval_reduces_stock_and_cancel_restores_it() {
    let ctx = store_with_orders().await;

    let resp = ctx
        .post_form("/orders/ORD-1/status", &[("status", "approved")])
        .await;
    assert_eq!(location(&resp), "/orders/ORD-1?success=status");

    let approved = ctx.order("ORD-1").await;
    assert_eq!(approved.status, OrderStatus::Approved);
    assert!(approved.stock_reduced);
    assert_eq!(stock(&ctx, "p1").await, 3);
    let change = approved.history.last().unwrap();
    assert_eq!(change.from, OrderStatus::Pending);
    assert_eq!(change.to, OrderStatus::Approved);
    assert_eq!(change.actor, "duenio");

    let resp = ctx
        .post_form("/orders/ORD-1/status", &[("status", "cancelled")])
        .await;
    assert_eq!(location(&resp), "/orders/ORD-1?success=status");

    let cancelled = ctx.order("ORD-1").await;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(!cancelled.stock_reduced);
    assert_eq!(stock(&ctx, "p1").await, 5);
}

#[tokio::test]
async fn test_disallowed_transition_leaves_order_untouched() {
    let ctx = store_with_orders().await;

    let resp = ctx
        .post_form("/orders/ORD-1/status", &[("status", "delivered")])
        .await;
    assert_eq!(location(&resp), "/orders/ORD-1?error=transition");

    let resp = ctx
        .post_form("/orders/ORD-1/status", &[("status", "teleported")])
        .await;
    assert_eq!(location(&resp), "/orders/ORD-1?error=invalid");

    let untouched = ctx.order("ORD-1").await;
    assert_eq!(untouched.status, OrderStatus::Pending);
    assert!(untouched.history.is_empty());
    assert_eq!(stock(&ctx, "p1").await, 5);
}

#[tokio::test]
async fn test_notes_are_saved() {
    let ctx = store_with_orders().await;

    let resp = ctx
        .post_form("/orders/ORD-2/notes", &[("notes", "Entregar después de las 18")])
        .await;
    assert_eq!(location(&resp), "/orders/ORD-2?success=saved");
    assert_eq!(ctx.order("ORD-2").await.notes, "Entregar después de las 18");
}

#[tokio::test]
async fn test_shipment_flow() {
    let ctx = store_with_orders().await;

    let page = ctx.get("/shipments").await.text().await.unwrap();
    assert!(page.contains("ORD-2"));
    assert!(!page.contains(r#"href="/orders/ORD-1""#));

    let resp = ctx.post_form("/shipments/ORD-2/preparing", &[]).await;
    assert_eq!(location(&resp), "/shipments?success=status");
    assert_eq!(ctx.order("ORD-2").await.status, OrderStatus::Preparing);

    let resp = ctx
        .post_form(
            "/shipments/ORD-2/ship",
            &[("carrier", "Correo Argentino"), ("tracking_number", "CA123456789AR")],
        )
        .await;
    assert_eq!(location(&resp), "/shipments?success=status");
    let shipped = ctx.order("ORD-2").await;
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert_eq!(shipped.shipping.carrier.as_deref(), Some("Correo Argentino"));
    assert_eq!(shipped.shipping.tracking_number.as_deref(), Some("CA123456789AR"));
    assert!(shipped.shipping.shipped_at.is_some());

    let resp = ctx.post_form("/shipments/ORD-2/deliver", &[]).await;
    assert_eq!(location(&resp), "/shipments?success=status");
    let delivered = ctx.order("ORD-2").await;
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.shipping.delivered_at.is_some());

    // Delivering twice is not a valid move.
    let resp = ctx.post_form("/shipments/ORD-2/deliver", &[]).await;
    assert_eq!(location(&resp), "/shipments?error=transition");

    let page = ctx.get("/shipments/archive").await.text().await.unwrap();
    assert!(page.contains("ORD-2"));
    assert!(page.contains("CA123456789AR"));
}

#[tokio::test]
async fn test_bulk_archive_and_status() {
    let ctx = store_with_orders().await;

    let resp = ctx
        .post_form(
            "/orders/bulk",
            &[("order_ids", "ORD-3"), ("action", "archive"), ("return_to", "/orders")],
        )
        .await;
    assert_eq!(location(&resp), "/orders?success=bulk");
    assert!(ctx.order("ORD-3").await.archived);

    let page = ctx.get("/orders").await.text().await.unwrap();
    assert!(!page.contains(r#"href="/orders/ORD-3""#));
    let page = ctx.get("/orders?archived=1").await.text().await.unwrap();
    assert!(page.contains(r#"href="/orders/ORD-3""#));

    // ORD-1 cannot go to preparing from pending; ORD-2 can.
    let resp = ctx
        .post_form(
            "/orders/bulk",
            &[
                ("order_ids", "ORD-1,ORD-2"),
                ("action", "status"),
                ("status", "preparing"),
                ("return_to", "https://evil.example.com/"),
            ],
        )
        .await;
    assert_eq!(location(&resp), "/orders?error=partial");
    assert_eq!(ctx.order("ORD-1").await.status, OrderStatus::Pending);
    assert_eq!(ctx.order("ORD-2").await.status, OrderStatus::Preparing);

    let resp = ctx
        .post_form("/orders/bulk", &[("order_ids", ""), ("action", "archive")])
        .await;
    assert_eq!(location(&resp), "/orders?error=nothing_selected");
}

//! Integration tests for backups and site settings.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use serde_json::Value;

use tienda_core::AdminRole;
use tienda_integration_tests::{TestContext, location, product};

#[tokio::test]
async fn test_backup_and_restore() {
    let ctx = TestContext::new().await;
    ctx.login_as("duenio", AdminRole::SuperAdmin).await;
    ctx.seed_products(vec![product("p1", "Remera", "500", 5)]).await;

    let resp = ctx
        .post_form("/backups", &[("label", "antes del cambio")])
        .await;
    assert_eq!(location(&resp), "/backups?success=backup");

    let backups = ctx.state.backups().list().await.unwrap();
    assert_eq!(backups.len(), 1);
    let name = backups[0].name.clone();
    assert_eq!(backups[0].label.as_deref(), Some("antes del cambio"));

    let page = ctx.get("/backups").await.text().await.unwrap();
    assert!(page.contains(&name));
    assert!(page.contains("antes del cambio"));

    let resp = ctx.get(&format!("/backups/{name}/download")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .contains(&name)
    );
    let bundle: Value = resp.json().await.unwrap();
    assert!(bundle["files"].is_object());

    ctx.seed_products(Vec::new()).await;
    assert!(ctx.products().await.is_empty());

    let resp = ctx
        .post_form("/backups/restore", &[("name", name.as_str())])
        .await;
    assert_eq!(location(&resp), "/backups?success=restored");

    let restored = ctx.products().await;
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].name, "Remera");

    // The restore kept a safety copy of the emptied catalog.
    assert_eq!(ctx.state.backups().list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_restore_rejects_unknown_and_traversal_names() {
    let ctx = TestContext::new().await;
    ctx.login_as("duenio", AdminRole::SuperAdmin).await;

    let resp = ctx
        .post_form("/backups/restore", &[("name", "no-existe.json")])
        .await;
    assert_eq!(location(&resp), "/backups?error=not_found");

    let resp = ctx
        .post_form("/backups/restore", &[("name", "../admins.json")])
        .await;
    assert_eq!(location(&resp), "/backups?error=not_found");

    let resp = ctx.get("/backups/..%2Fadmins.json/download").await;
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_only_super_admins_restore_or_delete() {
    let ctx = TestContext::new().await;
    ctx.login_as("vendedora", AdminRole::Admin).await;

    let resp = ctx.post_form("/backups", &[]).await;
    assert_eq!(location(&resp), "/backups?success=backup");
    let name = ctx.state.backups().list().await.unwrap()[0].name.clone();

    let resp = ctx
        .post_form("/backups/restore", &[("name", name.as_str())])
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = ctx
        .post_form("/backups/delete", &[("name", name.as_str())])
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(ctx.state.backups().list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_save_site_settings() {
    let ctx = TestContext::new().await;
    ctx.login_as("duenio", AdminRole::Admin).await;

    let resp = ctx
        .post_form(
            "/settings",
            &[
                ("store_name", "La Tiendita"),
                ("contact_email", "hola@latiendita.com"),
                ("shipping_flat_rate", "1500"),
                ("free_shipping_threshold", "30000"),
                ("mercadopago_enabled", "on"),
                ("transfer_cbu", "0000003100010000000001"),
            ],
        )
        .await;
    assert_eq!(location(&resp), "/settings?success=saved");

    let page = ctx.get("/settings").await.text().await.unwrap();
    assert!(page.contains(r#"value="La Tiendita""#));

    let resp = ctx
        .post_form(
            "/settings",
            &[("store_name", "La Tiendita"), ("transfer_cbu", "123")],
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = resp.text().await.unwrap();
    assert!(page.contains("flash-error"));
}

#[tokio::test]
async fn test_save_notification_settings() {
    let ctx = TestContext::new().await;
    ctx.login_as("duenio", AdminRole::Admin).await;

    let resp = ctx
        .post_form(
            "/notifications",
            &[
                ("email_enabled", "on"),
                ("admin_recipients", "ventas@example.com\nventas@example.com"),
                ("events", "payment_approved"),
                ("events", "order_shipped"),
            ],
        )
        .await;
    assert_eq!(location(&resp), "/notifications?success=saved");

    let page = ctx.get("/notifications").await.text().await.unwrap();
    assert!(page.contains("ventas@example.com"));

    let resp = ctx
        .post_form(
            "/notifications",
            &[("telegram_enabled", "on"), ("admin_recipients", "no es un email")],
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("no es un email"));
}

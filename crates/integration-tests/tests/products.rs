//! Integration tests for the product catalog.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use serde_json::{Value, json};

use tienda_core::{AdminRole, Price};
use tienda_integration_tests::{TestContext, location, product};

async fn logged_in() -> TestContext {
    let ctx = TestContext::new().await;
    ctx.login_as("duenio", AdminRole::Admin).await;
    ctx
}

#[tokio::test]
async fn test_create_edit_and_delete_product() {
    let ctx = logged_in().await;

    let resp = ctx
        .post_form(
            "/products",
            &[
                ("name", "Remera lisa"),
                ("description", "Algodón peinado"),
                ("price", "12.500,50"),
                ("stock", "8"),
                ("category", "Remeras"),
                ("active", "on"),
            ],
        )
        .await;
    assert_eq!(location(&resp), "/products?success=created");

    let products = ctx.products().await;
    assert_eq!(products.len(), 1);
    let created = &products[0];
    assert_eq!(created.name, "Remera lisa");
    assert_eq!(created.price, Price::parse("12500.50").unwrap());
    assert_eq!(created.stock, 8);
    assert!(created.active);

    let page = ctx.get("/products").await.text().await.unwrap();
    assert!(page.contains("Remera lisa"));

    let edit_path = format!("/products/{}/edit", created.id);
    let resp = ctx.get(&edit_path).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("Algodón peinado"));

    let resp = ctx
        .post_form(
            &format!("/products/{}", created.id),
            &[
                ("name", "Remera lisa negra"),
                ("price", "13000"),
                ("stock", "8"),
                ("category", "Remeras"),
            ],
        )
        .await;
    assert_eq!(location(&resp), "/products?success=saved");

    let products = ctx.products().await;
    let updated = &products[0];
    assert_eq!(updated.name, "Remera lisa negra");
    assert_eq!(updated.price, Price::parse("13000").unwrap());
    assert!(!updated.active);

    let resp = ctx
        .post_form(&format!("/products/{}/delete", created.id), &[])
        .await;
    assert_eq!(location(&resp), "/products?success=deleted");
    assert!(ctx.products().await.is_empty());
}

#[tokio::test]
async fn test_invalid_product_form_is_rendered_with_error() {
    let ctx = logged_in().await;

    let resp = ctx
        .post_form(
            "/products",
            &[("name", "Taza"), ("price", "gratis"), ("stock", "3")],
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains(r#"value="Taza""#));
    assert!(body.contains(r#"value="gratis""#));
    assert!(ctx.products().await.is_empty());
}

#[tokio::test]
async fn test_adjust_stock() {
    let ctx = logged_in().await;
    ctx.seed_products(vec![product("p1", "Buzo", "20000", 6)]).await;

    let resp = ctx
        .post_json("/api/products/p1/stock", &json!({ "delta": -2 }))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["stock"], 4);
    assert_eq!(body["low"], true);

    let resp = ctx
        .post_json("/api/products/p1/stock", &json!({ "delta": 0 }))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = ctx
        .post_json("/api/products/nope/stock", &json!({ "delta": 1 }))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    assert_eq!(ctx.products().await[0].stock, 4);
}

#[tokio::test]
async fn test_reorder_products() {
    let ctx = logged_in().await;
    ctx.seed_products(vec![
        product("p1", "Uno", "100", 10),
        product("p2", "Dos", "100", 10),
        product("p3", "Tres", "100", 10),
    ])
    .await;

    let resp = ctx
        .post_json("/api/products/reorder", &json!({ "ids": ["p3", "p1", "p2"] }))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let position = |products: &[tienda_admin::models::Product], id: &str| {
        products
            .iter()
            .find(|p| p.id.as_str() == id)
            .map(|p| p.position)
            .unwrap()
    };
    let products = ctx.products().await;
    assert!(position(&products, "p3") < position(&products, "p1"));
    assert!(position(&products, "p1") < position(&products, "p2"));

    let resp = ctx
        .post_json("/api/products/reorder", &json!({ "ids": ["p1", "p1"] }))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_bulk_deactivate_and_search() {
    let ctx = logged_in().await;
    ctx.seed_products(vec![
        product("p1", "Gorra roja", "100", 10),
        product("p2", "Gorra azul", "100", 10),
        product("p3", "Medias", "100", 10),
    ])
    .await;

    let resp = ctx
        .post_form("/products/bulk", &[("ids", "p1,p2"), ("action", "deactivate")])
        .await;
    assert_eq!(location(&resp), "/products?success=bulk");

    let products = ctx.products().await;
    let active: Vec<&str> = products
        .iter()
        .filter(|p| p.active)
        .map(|p| p.id.as_str())
        .collect();
    assert_eq!(active, vec!["p3"]);

    let resp = ctx
        .post_form("/products/bulk", &[("ids", ""), ("action", "delete")])
        .await;
    assert_eq!(location(&resp), "/products?error=nothing_selected");

    let page = ctx.get("/products?q=gorra").await.text().await.unwrap();
    assert!(page.contains("Gorra roja"));
    assert!(!page.contains("Medias"));
}

//! Integration tests for Tienda Admin.
//!
//! Each test starts the full admin router on an ephemeral port over a
//! fresh temporary data directory and talks to it with a cookie-keeping
//! `reqwest` client, the same way a browser would.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tienda-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `auth` - Login, logout, CSRF and role checks
//! - `products` - Catalog CRUD, stock and ordering
//! - `orders` - Status changes, shipments and bulk actions
//! - `payments` - MercadoPago webhook and reprocessing against a fake API
//! - `backups` - Backup, restore and admin-only access

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response, redirect::Policy};
use secrecy::SecretString;
use serde_json::{Value, json};
use sha2::Sha256;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use tienda_admin::build_router;
use tienda_admin::config::{AdminConfig, MercadoPagoConfig};
use tienda_admin::models::{Order, Product};
use tienda_admin::services::{AdminAuthService, CreateAdmin};
use tienda_admin::state::AppState;
use tienda_core::AdminRole;

/// Password given to every seeded admin.
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// A running admin server over a temporary data directory.
pub struct TestContext {
    pub client: Client,
    pub base_url: String,
    pub state: AppState,
    csrf_token: Mutex<Option<String>>,
    server: JoinHandle<()>,
    _data_dir: TempDir,
}

impl TestContext {
    /// Server with no external services configured.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Server with a configuration tweaked by `configure`.
    pub async fn with_config(configure: impl FnOnce(&mut AdminConfig)) -> Self {
        let data_dir = tempfile::tempdir().unwrap();
        let mut config = AdminConfig::for_data_dir(data_dir.path());
        configure(&mut config);

        let state = AppState::new(config).await.unwrap();
        let app = build_router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = Client::builder()
            .cookie_store(true)
            .redirect(Policy::none())
            .build()
            .unwrap();

        Self {
            client,
            base_url: format!("http://{addr}"),
            state,
            csrf_token: Mutex::new(None),
            server,
            _data_dir: data_dir,
        }
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Create an admin directly in the store.
    pub async fn create_admin(&self, username: &str, role: AdminRole) {
        AdminAuthService::new(self.state.store())
            .create_admin(CreateAdmin {
                username,
                email: &format!("{username}@example.com"),
                name: username,
                role,
                password: TEST_PASSWORD,
            })
            .await
            .unwrap();
    }

    /// Submit the login form. Returns the raw response.
    pub async fn login(&self, username: &str, password: &str) -> Response {
        let page = self.get("/auth/login").await.text().await.unwrap();
        let token = hidden_csrf_token(&page).unwrap();

        self.client
            .post(self.url("/auth/login"))
            .form(&[
                ("csrf_token", token.as_str()),
                ("username", username),
                ("password", password),
            ])
            .send()
            .await
            .unwrap()
    }

    /// Create an admin with `role`, log in, and remember the CSRF token.
    pub async fn login_as(&self, username: &str, role: AdminRole) {
        self.create_admin(username, role).await;
        let response = self.login(username, TEST_PASSWORD).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let account = self.get("/account").await.text().await.unwrap();
        let token = meta_csrf_token(&account).unwrap();
        *self.csrf_token.lock().unwrap() = Some(token);
    }

    /// The session's CSRF token, as captured by [`TestContext::login_as`].
    #[must_use]
    pub fn csrf(&self) -> String {
        self.csrf_token.lock().unwrap().clone().unwrap_or_default()
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    /// Post a form with the session's CSRF token added.
    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> Response {
        let token = self.csrf();
        let mut body: Vec<(&str, &str)> = vec![("csrf_token", token.as_str())];
        body.extend_from_slice(fields);
        self.client
            .post(self.url(path))
            .form(&body)
            .send()
            .await
            .unwrap()
    }

    /// Post JSON with the session's CSRF token in the header.
    pub async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .header("x-csrf-token", self.csrf())
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn seed_products(&self, products: Vec<Product>) {
        self.state.store().products().replace(products).await.unwrap();
    }

    pub async fn seed_orders(&self, orders: Vec<Order>) {
        self.state.store().orders().replace(orders).await.unwrap();
    }

    pub async fn products(&self) -> Vec<Product> {
        self.state.store().products().load().await.unwrap()
    }

    pub async fn order(&self, id: &str) -> Order {
        self.state
            .store()
            .orders()
            .load()
            .await
            .unwrap()
            .into_iter()
            .find(|o| o.id.as_str() == id)
            .unwrap()
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// `Location` header of a redirect.
#[must_use]
pub fn location(response: &Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

fn attribute_after(html: &str, marker: &str) -> Option<String> {
    let start = html.find(marker)? + marker.len();
    let rest = html.get(start..)?;
    let end = rest.find('"')?;
    rest.get(..end).map(str::to_owned)
}

/// Token from the `<meta name="csrf-token">` tag of a panel page.
#[must_use]
pub fn meta_csrf_token(html: &str) -> Option<String> {
    attribute_after(html, r#"<meta name="csrf-token" content=""#)
}

/// Token from a form's hidden `csrf_token` field.
#[must_use]
pub fn hidden_csrf_token(html: &str) -> Option<String> {
    attribute_after(html, r#"name="csrf_token" value=""#)
}

// =============================================================================
// Fixtures
// =============================================================================

#[must_use]
pub fn product(id: &str, name: &str, price: &str, stock: i64) -> Product {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "price": price,
        "stock": stock,
        "category": "Remeras",
        "created_at": "2024-05-01T10:00:00Z",
        "updated_at": "2024-05-01T10:00:00Z",
    }))
    .unwrap()
}

/// An order for `items` (`product_id`, quantity, unit price) in `status`.
#[must_use]
pub fn order(id: &str, status: &str, items: &[(&str, u32, &str)]) -> Order {
    let items: Vec<Value> = items
        .iter()
        .map(|(product_id, quantity, price)| {
            json!({
                "product_id": product_id,
                "name": format!("Producto {product_id}"),
                "unit_price": price,
                "quantity": quantity,
            })
        })
        .collect();

    let paid = matches!(status, "approved" | "preparing" | "shipped" | "delivered");
    serde_json::from_value(json!({
        "id": id,
        "created_at": "2024-05-02T12:00:00Z",
        "updated_at": "2024-05-02T12:00:00Z",
        "customer": {
            "name": "Ana Pérez",
            "email": "ana@example.com",
            "phone": "1155550000",
        },
        "items": items,
        "shipping": {
            "method": "delivery",
            "address": "Av. Siempreviva 742",
            "city": "Rosario",
        },
        "subtotal": "1000",
        "total": "1000",
        "payment": { "method": "mercadopago" },
        "status": status,
        "stock_reduced": paid,
    }))
    .unwrap()
}

// =============================================================================
// Fake MercadoPago
// =============================================================================

type Payments = Arc<Mutex<Vec<Value>>>;

/// In-process stand-in for the MercadoPago payments API.
pub struct FakeMercadoPago {
    pub base_url: String,
    payments: Payments,
    server: JoinHandle<()>,
}

impl FakeMercadoPago {
    pub async fn start() -> Self {
        let payments: Payments = Arc::default();
        let app = Router::new()
            .route("/v1/payments/search", get(search_payments))
            .route("/v1/payments/{id}", get(get_payment))
            .with_state(payments.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            payments,
            server,
        }
    }

    /// Register a payment for `order_id` with `status`.
    pub fn add_payment(&self, id: u64, order_id: &str, status: &str) {
        self.payments.lock().unwrap().push(json!({
            "id": id,
            "status": status,
            "status_detail": "accredited",
            "external_reference": order_id,
            "transaction_amount": 1000,
            "date_created": "2024-05-02T12:05:00.000-03:00",
            "date_last_updated": "2024-05-02T12:06:00.000-03:00",
        }));
    }

    /// Admin configuration pointing at this server.
    #[must_use]
    pub fn config(&self, webhook_secret: Option<&str>) -> MercadoPagoConfig {
        MercadoPagoConfig {
            access_token: SecretString::from("TEST-access-token"),
            webhook_secret: webhook_secret.map(SecretString::from),
            api_base: self.base_url.clone(),
        }
    }
}

impl Drop for FakeMercadoPago {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn get_payment(
    State(payments): State<Payments>,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    payments
        .lock()
        .unwrap()
        .iter()
        .find(|p| p["id"].to_string() == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn search_payments(
    State(payments): State<Payments>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let reference = query.get("external_reference").cloned().unwrap_or_default();
    let results: Vec<Value> = payments
        .lock()
        .unwrap()
        .iter()
        .filter(|p| p["external_reference"] == reference.as_str())
        .cloned()
        .collect();
    Json(json!({ "results": results }))
}

/// `x-signature` header value for a webhook about `data_id`.
#[must_use]
pub fn sign_webhook(secret: &str, request_id: &str, data_id: &str) -> String {
    let ts = chrono::Utc::now().timestamp();
    let manifest = format!("id:{data_id};request-id:{request_id};ts:{ts};");
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(manifest.as_bytes());
    format!("ts={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
}

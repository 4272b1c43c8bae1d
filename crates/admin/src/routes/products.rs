//! Product management route handlers.
//!
//! Products live in `products.json`. The listing supports search, bulk
//! actions, drag-and-drop ordering and quick stock adjustments; the last
//! two are JSON endpoints called from `admin.js`.

use askama::Template;
use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use tienda_core::{Price, ProductId};

use super::{FlashQuery, PageContext, check_csrf, checkbox, parse_ids, redirect_flash, render};
use crate::db::{ProductRepository, RepositoryError};
use crate::error::{ApiError, AppError};
use crate::filters;
use crate::middleware::{CsrfHeader, RequireAdminAuth, RequireWriter};
use crate::models::{Product, ProductInput};
use crate::state::AppState;

/// Longest accepted product name.
const MAX_NAME_LEN: usize = 200;

// =============================================================================
// Templates
// =============================================================================

/// Product list page template.
#[derive(Template)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub page: PageContext,
    pub products: Vec<Product>,
    pub categories: Vec<String>,
    pub search: String,
    pub category: String,
    pub low_stock_threshold: i64,
    /// Drag-and-drop only makes sense on the unfiltered list.
    pub reorder_enabled: bool,
}

/// New/edit product form template.
#[derive(Template)]
#[template(path = "products/form.html")]
pub struct ProductFormTemplate {
    pub page: PageContext,
    /// `None` for a new product.
    pub product_id: Option<String>,
    pub form: ProductFormView,
    pub form_error: Option<String>,
}

/// Raw form values, echoed back when validation fails.
#[derive(Debug, Clone, Default)]
pub struct ProductFormView {
    pub name: String,
    pub description: String,
    pub price: String,
    pub compare_at_price: String,
    pub stock: String,
    pub category: String,
    pub image_url: String,
    pub active: bool,
    pub featured: bool,
}

impl From<&Product> for ProductFormView {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price.to_input_value(),
            compare_at_price: product
                .compare_at_price
                .map(|p| p.to_input_value())
                .unwrap_or_default(),
            stock: product.stock.to_string(),
            category: product.category.clone(),
            image_url: product.image_url.clone().unwrap_or_default(),
            active: product.active,
            featured: product.featured,
        }
    }
}

// =============================================================================
// Forms and payloads
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ProductsQuery {
    #[serde(flatten)]
    pub flash: FlashQuery,
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductForm {
    #[serde(default)]
    pub csrf_token: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub compare_at_price: String,
    #[serde(default)]
    pub stock: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image_url: String,
    pub active: Option<String>,
    pub featured: Option<String>,
}

impl ProductForm {
    fn view(&self) -> ProductFormView {
        ProductFormView {
            name: self.name.clone(),
            description: self.description.clone(),
            price: self.price.clone(),
            compare_at_price: self.compare_at_price.clone(),
            stock: self.stock.clone(),
            category: self.category.clone(),
            image_url: self.image_url.clone(),
            active: checkbox(self.active.as_ref()),
            featured: checkbox(self.featured.as_ref()),
        }
    }

    /// Validate into a [`ProductInput`], or a message for the form.
    fn validate(&self) -> Result<ProductInput, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("El nombre es obligatorio.".to_owned());
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(format!("El nombre no puede superar {MAX_NAME_LEN} caracteres."));
        }

        let price = Price::parse(&self.price)
            .map_err(|_| "El precio debe ser un número mayor o igual a cero.".to_owned())?;

        let compare_at_price = match self.compare_at_price.trim() {
            "" => None,
            raw => Some(
                Price::parse(raw).map_err(|_| "El precio anterior no es válido.".to_owned())?,
            ),
        };

        let stock = match self.stock.trim() {
            "" => 0,
            raw => raw
                .parse::<i64>()
                .ok()
                .filter(|stock| *stock >= 0)
                .ok_or_else(|| "El stock debe ser un número entero no negativo.".to_owned())?,
        };

        let image_url = match self.image_url.trim() {
            "" => None,
            url if url.starts_with("https://") || url.starts_with("http://") || url.starts_with('/') => {
                Some(url.to_owned())
            }
            _ => return Err("La imagen debe ser una URL http(s) o una ruta local.".to_owned()),
        };

        Ok(ProductInput {
            name: name.to_owned(),
            description: self.description.trim().to_owned(),
            price,
            compare_at_price,
            stock,
            category: self.category.trim().to_owned(),
            image_url,
            active: checkbox(self.active.as_ref()),
            featured: checkbox(self.featured.as_ref()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CsrfForm {
    #[serde(default)]
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkProductForm {
    #[serde(default)]
    pub csrf_token: String,
    /// Comma-separated product IDs.
    #[serde(default)]
    pub ids: String,
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct ReorderInput {
    pub ids: Vec<ProductId>,
}

#[derive(Debug, Deserialize)]
pub struct StockInput {
    pub delta: i64,
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub success: bool,
    pub stock: i64,
    pub low: bool,
}

// =============================================================================
// Router
// =============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(index).post(create))
        .route("/products/new", get(new_product))
        .route("/products/bulk", post(bulk))
        .route("/products/{id}", post(update))
        .route("/products/{id}/edit", get(edit))
        .route("/products/{id}/delete", post(delete))
        .route("/api/products/reorder", post(reorder))
        .route("/api/products/{id}/stock", post(adjust_stock))
}

// =============================================================================
// Handlers
// =============================================================================

/// Product listing with search and category filter.
#[instrument(skip(admin, state, session, query))]
async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ProductsQuery>,
) -> Result<Html<String>, AppError> {
    let all = ProductRepository::new(state.store()).list().await?;
    let categories = categories(&all);

    let search = query.q.trim().to_lowercase();
    let category = query.category.trim().to_owned();
    let products: Vec<Product> = all
        .into_iter()
        .filter(|p| category.is_empty() || p.category == category)
        .filter(|p| {
            search.is_empty()
                || p.name.to_lowercase().contains(&search)
                || p.category.to_lowercase().contains(&search)
        })
        .collect();

    let template = ProductsIndexTemplate {
        page: PageContext::new(&admin, &session, "/products", &query.flash).await?,
        reorder_enabled: search.is_empty() && category.is_empty(),
        products,
        categories,
        search: query.q,
        category,
        low_stock_threshold: state.config().low_stock_threshold,
    };
    Ok(render(&template))
}

/// New product form.
async fn new_product(
    RequireWriter(admin): RequireWriter,
    session: Session,
) -> Result<Html<String>, AppError> {
    let template = ProductFormTemplate {
        page: PageContext::new(&admin, &session, "/products", &FlashQuery::default()).await?,
        product_id: None,
        form: ProductFormView {
            active: true,
            stock: "0".to_owned(),
            ..ProductFormView::default()
        },
        form_error: None,
    };
    Ok(render(&template))
}

/// Create a product.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn create(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ProductForm>,
) -> Result<Response, AppError> {
    check_csrf(&session, &form.csrf_token).await?;

    let input = match form.validate() {
        Ok(input) => input,
        Err(message) => {
            let template = ProductFormTemplate {
                page: PageContext::new(&admin, &session, "/products", &FlashQuery::default())
                    .await?,
                product_id: None,
                form: form.view(),
                form_error: Some(message),
            };
            return Ok(render(&template).into_response());
        }
    };

    let product = ProductRepository::new(state.store()).create(input).await?;
    tracing::info!(product_id = %product.id, "Product created");
    Ok(redirect_flash("/products", "success", "created").into_response())
}

/// Edit product form.
async fn edit(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>, AppError> {
    let id = ProductId::new(id);
    let product = ProductRepository::new(state.store())
        .get(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;

    let template = ProductFormTemplate {
        page: PageContext::new(&admin, &session, "/products", &flash).await?,
        product_id: Some(product.id.to_string()),
        form: ProductFormView::from(&product),
        form_error: None,
    };
    Ok(render(&template))
}

/// Update a product.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn update(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<ProductForm>,
) -> Result<Response, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    let id = ProductId::new(id);

    let input = match form.validate() {
        Ok(input) => input,
        Err(message) => {
            let template = ProductFormTemplate {
                page: PageContext::new(&admin, &session, "/products", &FlashQuery::default())
                    .await?,
                product_id: Some(id.to_string()),
                form: form.view(),
                form_error: Some(message),
            };
            return Ok(render(&template).into_response());
        }
    };

    match ProductRepository::new(state.store()).update(&id, input).await {
        Ok(_) => Ok(redirect_flash("/products", "success", "saved").into_response()),
        Err(RepositoryError::NotFound) => Err(AppError::NotFound(format!("product {id}"))),
        Err(e) => Err(e.into()),
    }
}

/// Delete one product.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn delete(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<CsrfForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;
    let id = ProductId::new(id);

    match ProductRepository::new(state.store()).delete(&id).await {
        Ok(()) => {
            tracing::info!(product_id = %id, "Product deleted");
            Ok(redirect_flash("/products", "success", "deleted"))
        }
        Err(RepositoryError::NotFound) => Ok(redirect_flash("/products", "error", "not_found")),
        Err(e) => Err(e.into()),
    }
}

/// Bulk delete, activate or deactivate.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id, action = %form.action))]
async fn bulk(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<BulkProductForm>,
) -> Result<Redirect, AppError> {
    check_csrf(&session, &form.csrf_token).await?;

    let ids: Vec<ProductId> = parse_ids(&form.ids);
    if ids.is_empty() {
        return Ok(redirect_flash("/products", "error", "nothing_selected"));
    }

    let repo = ProductRepository::new(state.store());
    let changed = match form.action.as_str() {
        "delete" => repo.delete_many(&ids).await?,
        "activate" => repo.set_active_many(&ids, true).await?,
        "deactivate" => repo.set_active_many(&ids, false).await?,
        _ => return Err(AppError::BadRequest(format!("unknown action {}", form.action))),
    };

    tracing::info!(selected = ids.len(), changed, "Bulk product action applied");
    Ok(redirect_flash("/products", "success", "bulk"))
}

/// Save a drag-and-drop order.
///
/// POST /api/products/reorder  `{"ids": ["prod_..", ...]}`
#[instrument(skip(state, input), fields(admin_id = %admin.id, count = input.ids.len()))]
async fn reorder(
    RequireWriter(admin): RequireWriter,
    _csrf: CsrfHeader,
    State(state): State<AppState>,
    Json(input): Json<ReorderInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if input.ids.is_empty() {
        return Err(ApiError::bad_request("La lista de productos está vacía"));
    }

    match ProductRepository::new(state.store()).reorder(&input.ids).await {
        Ok(()) => Ok(Json(serde_json::json!({ "success": true }))),
        Err(RepositoryError::Conflict(message)) => Err(ApiError::bad_request(message)),
        Err(e) => Err(e.into()),
    }
}

/// Add or remove units of stock.
///
/// POST /api/products/{id}/stock  `{"delta": -1}`
#[instrument(skip(state), fields(admin_id = %admin.id))]
async fn adjust_stock(
    RequireWriter(admin): RequireWriter,
    _csrf: CsrfHeader,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<StockInput>,
) -> Result<Json<StockResponse>, ApiError> {
    if input.delta == 0 {
        return Err(ApiError::bad_request("El ajuste no puede ser cero"));
    }
    let id = ProductId::new(id);

    let product = match ProductRepository::new(state.store())
        .adjust_stock(&id, input.delta)
        .await
    {
        Ok(product) => product,
        Err(RepositoryError::NotFound) => {
            return Err(AppError::NotFound(format!("product {id}")).into());
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(product_id = %id, delta = input.delta, stock = product.stock, "Stock adjusted");
    Ok(Json(StockResponse {
        success: true,
        stock: product.stock,
        low: product.stock <= state.config().low_stock_threshold,
    }))
}

/// Distinct non-empty categories, sorted.
fn categories(products: &[Product]) -> Vec<String> {
    let mut categories: Vec<String> = products
        .iter()
        .map(|p| p.category.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_owned)
        .collect();
    categories.sort_by_key(|c| c.to_lowercase());
    categories.dedup();
    categories
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, price: &str, stock: &str) -> ProductForm {
        ProductForm {
            csrf_token: String::new(),
            name: name.to_owned(),
            description: " Yerba mate ".to_owned(),
            price: price.to_owned(),
            compare_at_price: String::new(),
            stock: stock.to_owned(),
            category: "Almacén".to_owned(),
            image_url: String::new(),
            active: Some("on".to_owned()),
            featured: None,
        }
    }

    #[test]
    fn test_validate_accepts_local_price_format() {
        let input = form("Yerba 1kg", "4.500,50", "12").validate();
        let Ok(input) = input else {
            panic!("expected valid form, got {input:?}");
        };
        assert_eq!(input.price, Price::from_cents(450_050));
        assert_eq!(input.stock, 12);
        assert_eq!(input.description, "Yerba mate");
        assert!(input.active);
        assert!(!input.featured);
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        assert!(form("  ", "100", "1").validate().is_err());
        assert!(form("Mate", "gratis", "1").validate().is_err());
        assert!(form("Mate", "100", "-3").validate().is_err());
        assert!(form("Mate", "100", "dos").validate().is_err());

        let mut bad_image = form("Mate", "100", "1");
        bad_image.image_url = "javascript:alert(1)".to_owned();
        assert!(bad_image.validate().is_err());
    }

    #[test]
    fn test_blank_stock_defaults_to_zero() {
        assert_eq!(form("Mate", "100", "").validate().map(|i| i.stock), Ok(0));
    }

    #[test]
    fn test_categories_are_distinct() {
        let mut a = Product::new(form("A", "1", "1").validate().unwrap_or_else(|e| panic!("{e}")), 0);
        a.category = "Mates".to_owned();
        let mut b = a.clone();
        b.category = "Bombillas".to_owned();
        let c = a.clone();
        assert_eq!(categories(&[a, b, c]), vec!["Bombillas", "Mates"]);
    }
}

//! Store settings route handlers.

use askama::Template;
use axum::{
    Form, Router,
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use tienda_core::{Email, Price};

use super::{FlashQuery, PageContext, check_csrf, checkbox, redirect_flash, render};
use crate::db::SettingsRepository;
use crate::error::AppError;
use crate::filters;
use crate::middleware::{RequireAdminAuth, RequireWriter};
use crate::models::SiteConfig;
use crate::state::AppState;

/// Settings page template.
#[derive(Template)]
#[template(path = "settings/index.html")]
pub struct SettingsTemplate {
    pub page: PageContext,
    pub form: SettingsFormView,
    pub form_error: Option<String>,
    pub mercadopago_configured: bool,
    pub data_dir: String,
}

/// Values shown in the form.
#[derive(Debug, Clone, Default)]
pub struct SettingsFormView {
    pub store_name: String,
    pub contact_email: String,
    pub whatsapp: String,
    pub shipping_flat_rate: String,
    pub free_shipping_threshold: String,
    pub maintenance_mode: bool,
    pub mercadopago_enabled: bool,
    pub transfer_alias: String,
    pub transfer_cbu: String,
    pub transfer_holder: String,
}

impl From<&SiteConfig> for SettingsFormView {
    fn from(config: &SiteConfig) -> Self {
        Self {
            store_name: config.store_name.clone(),
            contact_email: config.contact_email.clone(),
            whatsapp: config.whatsapp.clone(),
            shipping_flat_rate: config.shipping_flat_rate.to_input_value(),
            free_shipping_threshold: config
                .free_shipping_threshold
                .map(|p| p.to_input_value())
                .unwrap_or_default(),
            maintenance_mode: config.maintenance_mode,
            mercadopago_enabled: config.mercadopago_enabled,
            transfer_alias: config.transfer_alias.clone(),
            transfer_cbu: config.transfer_cbu.clone(),
            transfer_holder: config.transfer_holder.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub csrf_token: String,
    #[serde(default)]
    pub store_name: String,
    #[serde(default)]
    pub contact_email: String,
    #[serde(default)]
    pub whatsapp: String,
    #[serde(default)]
    pub shipping_flat_rate: String,
    #[serde(default)]
    pub free_shipping_threshold: String,
    pub maintenance_mode: Option<String>,
    pub mercadopago_enabled: Option<String>,
    #[serde(default)]
    pub transfer_alias: String,
    #[serde(default)]
    pub transfer_cbu: String,
    #[serde(default)]
    pub transfer_holder: String,
}

impl SettingsForm {
    fn view(&self) -> SettingsFormView {
        SettingsFormView {
            store_name: self.store_name.clone(),
            contact_email: self.contact_email.clone(),
            whatsapp: self.whatsapp.clone(),
            shipping_flat_rate: self.shipping_flat_rate.clone(),
            free_shipping_threshold: self.free_shipping_threshold.clone(),
            maintenance_mode: checkbox(self.maintenance_mode.as_ref()),
            mercadopago_enabled: checkbox(self.mercadopago_enabled.as_ref()),
            transfer_alias: self.transfer_alias.clone(),
            transfer_cbu: self.transfer_cbu.clone(),
            transfer_holder: self.transfer_holder.clone(),
        }
    }

    fn validate(&self) -> Result<SiteConfig, String> {
        let store_name = self.store_name.trim();
        if store_name.is_empty() {
            return Err("El nombre de la tienda es obligatorio.".to_owned());
        }

        let contact_email = match self.contact_email.trim() {
            "" => String::new(),
            raw => Email::parse(raw)
                .map_err(|_| "El email de contacto no es válido.".to_owned())?
                .to_string(),
        };

        let shipping_flat_rate = match self.shipping_flat_rate.trim() {
            "" => Price::ZERO,
            raw => Price::parse(raw).map_err(|_| "El costo de envío no es válido.".to_owned())?,
        };
        let free_shipping_threshold = match self.free_shipping_threshold.trim() {
            "" => None,
            raw => Some(
                Price::parse(raw)
                    .map_err(|_| "El mínimo para envío gratis no es válido.".to_owned())?,
            ),
        };

        let transfer_cbu = self.transfer_cbu.trim();
        if !transfer_cbu.is_empty()
            && (transfer_cbu.len() != 22 || !transfer_cbu.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err("El CBU/CVU debe tener 22 dígitos.".to_owned());
        }

        Ok(SiteConfig {
            store_name: store_name.to_owned(),
            contact_email,
            whatsapp: self.whatsapp.trim().to_owned(),
            shipping_flat_rate,
            free_shipping_threshold,
            maintenance_mode: checkbox(self.maintenance_mode.as_ref()),
            mercadopago_enabled: checkbox(self.mercadopago_enabled.as_ref()),
            transfer_alias: self.transfer_alias.trim().to_owned(),
            transfer_cbu: transfer_cbu.to_owned(),
            transfer_holder: self.transfer_holder.trim().to_owned(),
        })
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/settings", get(index).post(save))
}

/// Settings page.
#[instrument(skip(admin, state, session, flash))]
async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>, AppError> {
    let config = SettingsRepository::new(state.store()).site().await?;
    let template = SettingsTemplate {
        page: PageContext::new(&admin, &session, "/settings", &flash).await?,
        form: SettingsFormView::from(&config),
        form_error: None,
        mercadopago_configured: state.mercadopago().is_some(),
        data_dir: state.config().data_dir.display().to_string(),
    };
    Ok(render(&template))
}

/// Save the store settings.
#[instrument(skip(admin, state, session, form), fields(admin_id = %admin.id))]
async fn save(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<SettingsForm>,
) -> Result<Response, AppError> {
    check_csrf(&session, &form.csrf_token).await?;

    match form.validate() {
        Ok(config) => {
            SettingsRepository::new(state.store())
                .save_site(config)
                .await?;
            tracing::info!("Store settings saved");
            Ok(redirect_flash("/settings", "success", "saved").into_response())
        }
        Err(message) => {
            let template = SettingsTemplate {
                page: PageContext::new(&admin, &session, "/settings", &FlashQuery::default())
                    .await?,
                form: form.view(),
                form_error: Some(message),
                mercadopago_configured: state.mercadopago().is_some(),
                data_dir: state.config().data_dir.display().to_string(),
            };
            Ok(render(&template).into_response())
        }
    }
}

//! Notification settings and test sends.

use askama::Template;
use axum::{
    Form, Json, Router,
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use tienda_core::{Email, NotificationEvent};

use super::{FlashQuery, PageContext, check_csrf, redirect_flash, render};
use crate::db::SettingsRepository;
use crate::error::{ApiError, AppError};
use crate::filters;
use crate::middleware::{CsrfHeader, RequireAdminAuth, RequireWriter};
use crate::models::NotificationSettings;
use crate::services::Channel;
use crate::state::AppState;

/// One event toggle on the page.
#[derive(Debug, Clone)]
pub struct EventToggle {
    pub value: &'static str,
    pub title: &'static str,
    pub enabled: bool,
}

/// Notification settings page.
#[derive(Template)]
#[template(path = "notifications/index.html")]
pub struct NotificationsTemplate {
    pub page: PageContext,
    pub settings: NotificationSettings,
    /// One address per line.
    pub recipients: String,
    pub events: Vec<EventToggle>,
    pub smtp_configured: bool,
    pub telegram_configured: bool,
    pub form_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestInput {
    pub channel: Channel,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(index).post(save))
        .route("/api/notifications/test", post(send_test))
}

fn toggles(settings: &NotificationSettings) -> Vec<EventToggle> {
    NotificationEvent::ALL
        .into_iter()
        .map(|event| EventToggle {
            value: event.as_str(),
            title: event.title(),
            enabled: settings.is_enabled(event),
        })
        .collect()
}

fn page(
    state: &AppState,
    page: PageContext,
    settings: NotificationSettings,
    form_error: Option<String>,
) -> NotificationsTemplate {
    NotificationsTemplate {
        page,
        recipients: settings.admin_recipients.join("\n"),
        events: toggles(&settings),
        settings,
        smtp_configured: state.notifications().has_email(),
        telegram_configured: state.notifications().has_telegram(),
        form_error,
    }
}

/// Notification settings page.
#[instrument(skip(admin, state, session, flash))]
async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Query(flash): Query<FlashQuery>,
) -> Result<Html<String>, AppError> {
    let settings = SettingsRepository::new(state.store()).notifications().await?;
    let context = PageContext::new(&admin, &session, "/notifications", &flash).await?;
    Ok(render(&page(&state, context, settings, None)))
}

/// Save notification settings.
///
/// The form is read as raw pairs because each enabled event arrives as a
/// repeated `events` field.
#[instrument(skip(admin, state, session, pairs), fields(admin_id = %admin.id))]
async fn save(
    RequireWriter(admin): RequireWriter,
    State(state): State<AppState>,
    session: Session,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let csrf_token = field(&pairs, "csrf_token").unwrap_or_default();
    check_csrf(&session, csrf_token).await?;

    match parse_settings(&pairs) {
        Ok(settings) => {
            SettingsRepository::new(state.store())
                .save_notifications(settings)
                .await?;
            tracing::info!("Notification settings saved");
            Ok(redirect_flash("/notifications", "success", "saved").into_response())
        }
        Err((settings, message)) => {
            let context =
                PageContext::new(&admin, &session, "/notifications", &FlashQuery::default())
                    .await?;
            Ok(render(&page(&state, context, settings, Some(message))).into_response())
        }
    }
}

/// Send a test message on one channel.
///
/// POST /api/notifications/test  `{"channel": "email" | "telegram"}`
#[instrument(skip(state), fields(admin_id = %admin.id))]
async fn send_test(
    RequireWriter(admin): RequireWriter,
    _csrf: CsrfHeader,
    State(state): State<AppState>,
    Json(input): Json<TestInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .notifications()
        .send_test(state.store(), input.channel)
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Mensaje de prueba enviado",
    })))
}

fn field<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn flag(pairs: &[(String, String)], name: &str) -> bool {
    field(pairs, name).is_some_and(|v| v == "on" || v == "true" || v == "1")
}

/// Build settings from the form, or return what was entered and why it failed.
fn parse_settings(
    pairs: &[(String, String)],
) -> Result<NotificationSettings, (NotificationSettings, String)> {
    let events: Vec<NotificationEvent> = NotificationEvent::ALL
        .into_iter()
        .filter(|event| {
            pairs
                .iter()
                .any(|(key, value)| key == "events" && value == event.as_str())
        })
        .collect();

    let raw_recipients: Vec<String> = field(pairs, "admin_recipients")
        .unwrap_or_default()
        .split([',', ';', '\n'])
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_owned)
        .collect();

    let mut settings = NotificationSettings {
        email_enabled: flag(pairs, "email_enabled"),
        notify_customer: flag(pairs, "notify_customer"),
        admin_recipients: raw_recipients.clone(),
        telegram_enabled: flag(pairs, "telegram_enabled"),
        telegram_chat_id: field(pairs, "telegram_chat_id")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_owned),
        events,
    };

    let mut recipients = Vec::with_capacity(raw_recipients.len());
    for raw in &raw_recipients {
        match Email::parse(raw) {
            Ok(email) => {
                let email = email.to_string();
                if !recipients.contains(&email) {
                    recipients.push(email);
                }
            }
            Err(_) => return Err((settings, format!("Email inválido: {raw}"))),
        }
    }

    if settings.telegram_enabled && settings.telegram_chat_id.is_none() {
        return Err((
            settings,
            "Para activar Telegram ingresá el chat ID.".to_owned(),
        ));
    }

    settings.admin_recipients = recipients;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_parse_settings_reads_repeated_events() {
        let form = pairs(&[
            ("email_enabled", "on"),
            ("admin_recipients", "ventas@example.com\n ventas@example.com, duenio@example.com"),
            ("events", "payment_approved"),
            ("events", "order_shipped"),
            ("events", "made_up"),
        ]);
        let Ok(settings) = parse_settings(&form) else {
            panic!("form should be valid");
        };
        assert!(settings.email_enabled);
        assert!(!settings.notify_customer);
        assert_eq!(settings.admin_recipients.len(), 2);
        assert_eq!(
            settings.events,
            vec![NotificationEvent::PaymentApproved, NotificationEvent::OrderShipped]
        );
    }

    #[test]
    fn test_parse_settings_rejects_bad_recipient() {
        let form = pairs(&[("admin_recipients", "ventas@example.com, nope")]);
        let Err((settings, message)) = parse_settings(&form) else {
            panic!("form should be rejected");
        };
        assert!(message.contains("nope"));
        assert_eq!(settings.admin_recipients.len(), 2);
    }

    #[test]
    fn test_telegram_requires_chat_id() {
        let form = pairs(&[("telegram_enabled", "on"), ("telegram_chat_id", "  ")]);
        assert!(parse_settings(&form).is_err());
    }
}

//! Order notification dispatch over email and Telegram.
//!
//! Dispatch happens after the order change is written. Channel failures
//! are logged and reported back, never returned as errors, and the order
//! is not touched: an event listed in `notifications_sent` counts as sent
//! whether or not a channel delivered it.

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use tienda_core::NotificationEvent;

use super::email::{EmailError, EmailService};
use crate::db::{RepositoryError, SettingsRepository, Store};
use crate::models::{NotificationSettings, Order};
use crate::telegram::{TelegramClient, TelegramError, escape_html};

/// Errors from the settings-page test sends.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("SMTP is not configured")]
    EmailNotConfigured,

    #[error("Telegram bot is not configured")]
    TelegramNotConfigured,

    /// No admin recipient or chat ID to send to.
    #[error("no recipient configured for {0}")]
    NoRecipient(&'static str),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    Telegram(#[from] TelegramError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Telegram,
}

/// What one dispatch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Addresses that accepted the email.
    pub emails_sent: Vec<String>,
    pub telegram_sent: bool,
    /// Why nothing was attempted, when the event is switched off.
    pub skipped: Option<String>,
    /// One entry per failed channel or recipient.
    pub failures: Vec<String>,
}

impl DispatchReport {
    /// At least one channel delivered.
    #[must_use]
    pub const fn delivered(&self) -> bool {
        !self.emails_sent.is_empty() || self.telegram_sent
    }
}

/// Sends order notifications on the configured channels.
#[derive(Debug, Clone, Default)]
pub struct NotificationService {
    email: Option<EmailService>,
    telegram: Option<TelegramClient>,
}

impl NotificationService {
    #[must_use]
    pub const fn new(email: Option<EmailService>, telegram: Option<TelegramClient>) -> Self {
        Self { email, telegram }
    }

    #[must_use]
    pub const fn has_email(&self) -> bool {
        self.email.is_some()
    }

    #[must_use]
    pub const fn has_telegram(&self) -> bool {
        self.telegram.is_some()
    }

    /// Send `event` for `order` on every enabled channel.
    #[instrument(skip(self, store, order), fields(order_id = %order.id, event = %event))]
    pub async fn dispatch(
        &self,
        store: &Store,
        order: &Order,
        event: NotificationEvent,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        let settings_repo = SettingsRepository::new(store);
        let settings = match settings_repo.notifications().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Could not read notification settings");
                report.failures.push(format!("settings: {e}"));
                return report;
            }
        };

        if !settings.is_enabled(event) {
            debug!("Event disabled in settings");
            report.skipped = Some(format!("{} desactivado", event.title()));
            return report;
        }

        if settings.email_enabled {
            match &self.email {
                Some(email) => {
                    let store_name = settings_repo
                        .site()
                        .await
                        .map(|site| site.store_name)
                        .unwrap_or_default();
                    for to in email_recipients(&settings, order) {
                        match email.send_order_update(&to, &store_name, order, event).await {
                            Ok(()) => report.emails_sent.push(to),
                            Err(e) => {
                                warn!(to = %to, error = %e, "Order email failed");
                                report.failures.push(format!("email {to}: {e}"));
                            }
                        }
                    }
                }
                None => report
                    .failures
                    .push("email: SMTP no configurado".to_owned()),
            }
        }

        if let Some(chat_id) = settings.telegram_target() {
            match &self.telegram {
                Some(telegram) => {
                    match telegram
                        .send_message(chat_id, &telegram_message(order, event))
                        .await
                    {
                        Ok(()) => report.telegram_sent = true,
                        Err(e) => {
                            warn!(error = %e, "Telegram notification failed");
                            report.failures.push(format!("telegram: {e}"));
                        }
                    }
                }
                None => report
                    .failures
                    .push("telegram: bot no configurado".to_owned()),
            }
        }

        info!(
            emails = report.emails_sent.len(),
            telegram = report.telegram_sent,
            failures = report.failures.len(),
            "Notification dispatched"
        );
        report
    }

    /// Send a test message on one channel.
    ///
    /// Email goes to the admin recipients, or the store contact address when
    /// there are none.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError` when the channel is not configured or
    /// the send fails.
    #[instrument(skip(self, store))]
    pub async fn send_test(&self, store: &Store, channel: Channel) -> Result<(), NotificationError> {
        let settings_repo = SettingsRepository::new(store);
        let settings = settings_repo.notifications().await?;
        let site = settings_repo.site().await?;

        match channel {
            Channel::Email => {
                let email = self
                    .email
                    .as_ref()
                    .ok_or(NotificationError::EmailNotConfigured)?;
                let recipients: Vec<&str> = if settings.admin_recipients.is_empty() {
                    Some(site.contact_email.trim())
                        .filter(|to| !to.is_empty())
                        .into_iter()
                        .collect()
                } else {
                    settings.admin_recipients.iter().map(String::as_str).collect()
                };
                if recipients.is_empty() {
                    return Err(NotificationError::NoRecipient("email"));
                }
                for to in recipients {
                    email.send_test(to, &site.store_name).await?;
                }
            }
            Channel::Telegram => {
                let telegram = self
                    .telegram
                    .as_ref()
                    .ok_or(NotificationError::TelegramNotConfigured)?;
                let chat_id = settings
                    .telegram_chat_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|chat| !chat.is_empty())
                    .ok_or(NotificationError::NoRecipient("telegram"))?;
                let text = format!(
                    "<b>Mensaje de prueba</b>\nLas notificaciones de {} funcionan.",
                    escape_html(&site.store_name)
                );
                telegram.send_message(chat_id, &text).await?;
            }
        }
        Ok(())
    }
}

/// Buyer (when enabled) plus admin recipients, without duplicates.
fn email_recipients(settings: &NotificationSettings, order: &Order) -> Vec<String> {
    let mut recipients: Vec<String> = Vec::new();
    let customer = settings
        .notify_customer
        .then(|| order.customer.email.as_str());
    let admins = settings.admin_recipients.iter().map(String::as_str);

    for address in customer.into_iter().chain(admins) {
        let address = address.trim().to_lowercase();
        if !address.is_empty() && !recipients.contains(&address) {
            recipients.push(address);
        }
    }
    recipients
}

/// Admin-facing Telegram summary of an order event.
fn telegram_message(order: &Order, event: NotificationEvent) -> String {
    let mut text = format!(
        "<b>{}</b>\nPedido <code>{}</code>\nCliente: {} ({})\nTotal: {}\nEstado: {}",
        escape_html(event.title()),
        escape_html(order.id.as_str()),
        escape_html(&order.customer.name),
        escape_html(&order.customer.email),
        order.total,
        order.status.label(),
    );
    for item in &order.items {
        text.push_str(&format!("\n• {} × {}", escape_html(&item.name), item.quantity));
    }
    if let Some(tracking) = &order.shipping.tracking_number {
        let carrier = order.shipping.carrier.as_deref().unwrap_or("Seguimiento");
        text.push_str(&format!(
            "\n{}: <code>{}</code>",
            escape_html(carrier),
            escape_html(tracking)
        ));
    }
    text
}

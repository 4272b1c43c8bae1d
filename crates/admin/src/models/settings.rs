//! Runtime-editable settings stored in `config.json` and `notifications.json`.

use serde::{Deserialize, Serialize};

use tienda_core::{NotificationEvent, Price};

/// Store-wide configuration edited from the settings page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub store_name: String,
    pub contact_email: String,
    pub whatsapp: String,
    pub shipping_flat_rate: Price,
    /// Orders at or above this subtotal ship free.
    pub free_shipping_threshold: Option<Price>,
    pub maintenance_mode: bool,
    pub mercadopago_enabled: bool,
    pub transfer_alias: String,
    pub transfer_cbu: String,
    pub transfer_holder: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            store_name: "Tienda".to_owned(),
            contact_email: String::new(),
            whatsapp: String::new(),
            shipping_flat_rate: Price::ZERO,
            free_shipping_threshold: None,
            maintenance_mode: false,
            mercadopago_enabled: true,
            transfer_alias: String::new(),
            transfer_cbu: String::new(),
            transfer_holder: String::new(),
        }
    }
}

impl SiteConfig {
    /// Shipping cost for an order subtotal.
    #[must_use]
    pub fn shipping_for(&self, subtotal: Price) -> Price {
        match self.free_shipping_threshold {
            Some(threshold) if subtotal >= threshold => Price::ZERO,
            _ => self.shipping_flat_rate,
        }
    }
}

/// Which channels fire for which order events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub email_enabled: bool,
    /// Send order emails to the buyer, not only to admins.
    pub notify_customer: bool,
    /// Admin addresses that receive a copy of every enabled event.
    pub admin_recipients: Vec<String>,
    pub telegram_enabled: bool,
    pub telegram_chat_id: Option<String>,
    /// Enabled events. Events not listed are silenced on every channel.
    pub events: Vec<NotificationEvent>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_enabled: false,
            notify_customer: true,
            admin_recipients: Vec::new(),
            telegram_enabled: false,
            telegram_chat_id: None,
            events: NotificationEvent::ALL.to_vec(),
        }
    }
}

impl NotificationSettings {
    #[must_use]
    pub fn is_enabled(&self, event: NotificationEvent) -> bool {
        self.events.contains(&event)
    }

    /// Telegram chat to post to, when Telegram is switched on and configured.
    #[must_use]
    pub fn telegram_target(&self) -> Option<&str> {
        if !self.telegram_enabled {
            return None;
        }
        self.telegram_chat_id
            .as_deref()
            .map(str::trim)
            .filter(|chat| !chat.is_empty())
    }
}

//! Settings storage.
//!
//! Site configuration and notification settings are each a single JSON
//! document; saving replaces the whole document.

use super::{RepositoryError, Store};
use crate::models::{NotificationSettings, SiteConfig};

/// Repository for `config.json` and `notifications.json`.
pub struct SettingsRepository<'a> {
    store: &'a Store,
}

impl<'a> SettingsRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` if `config.json` cannot be read.
    pub async fn site(&self) -> Result<SiteConfig, RepositoryError> {
        self.store.site().load().await
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` if `config.json` cannot be written.
    pub async fn save_site(&self, config: SiteConfig) -> Result<(), RepositoryError> {
        self.store.site().replace(config).await
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` if `notifications.json` cannot be read.
    pub async fn notifications(&self) -> Result<NotificationSettings, RepositoryError> {
        self.store.notifications().load().await
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` if `notifications.json` cannot be written.
    pub async fn save_notifications(
        &self,
        settings: NotificationSettings,
    ) -> Result<(), RepositoryError> {
        self.store.notifications().replace(settings).await
    }
}

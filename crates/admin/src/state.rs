//! Application state shared across handlers.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AdminConfig;
use crate::db::{RepositoryError, Store};
use crate::mercadopago::{MercadoPagoClient, MercadoPagoError};
use crate::services::{
    BackupService, EmailService, NotificationService, ReconciliationService,
};
use crate::telegram::TelegramClient;

/// Errors building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to open data directory: {0}")]
    Store(#[from] RepositoryError),

    #[error("failed to build MercadoPago client: {0}")]
    MercadoPago(#[from] MercadoPagoError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AdminConfig,
    store: Store,
    mercadopago: Option<MercadoPagoClient>,
    notifications: NotificationService,
}

impl AppState {
    /// Open the data directory and build the API clients that are configured.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the data directory cannot be created or the
    /// MercadoPago client cannot be built.
    pub async fn new(config: AdminConfig) -> Result<Self, StateError> {
        let store = Store::open(&config.data_dir).await?;

        let mercadopago = config
            .mercadopago
            .as_ref()
            .map(MercadoPagoClient::new)
            .transpose()?;
        if mercadopago.is_none() {
            info!("MercadoPago not configured; payment reprocessing disabled");
        }

        let email = match &config.email {
            Some(email_config) => match EmailService::new(email_config) {
                Ok(service) => Some(service),
                Err(e) => {
                    warn!(error = %e, "SMTP transport could not be built; email disabled");
                    None
                }
            },
            None => None,
        };
        let telegram = config.telegram.as_ref().map(TelegramClient::new);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                mercadopago,
                notifications: NotificationService::new(email, telegram),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// MercadoPago client, if an access token is configured.
    #[must_use]
    pub fn mercadopago(&self) -> Option<&MercadoPagoClient> {
        self.inner.mercadopago.as_ref()
    }

    #[must_use]
    pub fn notifications(&self) -> &NotificationService {
        &self.inner.notifications
    }

    #[must_use]
    pub fn reconciliation(&self) -> ReconciliationService<'_> {
        ReconciliationService::new(self.store(), self.mercadopago(), self.notifications())
    }

    #[must_use]
    pub fn backups(&self) -> BackupService<'_> {
        BackupService::new(
            self.store(),
            &self.inner.config.backup_dir,
            self.inner.config.backup_retention,
        )
    }
}

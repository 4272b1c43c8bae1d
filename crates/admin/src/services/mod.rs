//! Business logic services for admin.
//!
//! # Services
//!
//! - `auth` - Username/password authentication with Argon2
//! - `backup` - Backup bundles of the data directory
//! - `email` - Email delivery via SMTP
//! - `notifications` - Order notifications over email and Telegram
//! - `reconciliation` - MercadoPago payment sync and admin status changes

pub mod auth;
pub mod backup;
pub mod email;
pub mod notifications;
pub mod reconciliation;

pub use auth::{AdminAuthError, AdminAuthService, CreateAdmin};
pub use backup::{BackupError, BackupInfo, BackupService};
pub use email::{EmailError, EmailService};
pub use notifications::{Channel, DispatchReport, NotificationError, NotificationService};
pub use reconciliation::{
    MERCADOPAGO_ACTOR, PendingReport, ReconcileError, ReconcileOutcome, ReconciliationService,
    ShipmentDetails, StockChange,
};

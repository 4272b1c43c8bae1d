//! Admin user records stored in `admins.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tienda_core::{AdminUserId, Email};

// Re-export AdminRole from core for convenience
pub use tienda_core::AdminRole;

/// An admin user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUser {
    /// Unique admin user ID.
    pub id: AdminUserId,
    /// Login name, unique, stored lowercase.
    pub username: String,
    /// Admin's email address.
    pub email: Email,
    /// Admin's display name.
    pub name: String,
    /// Admin's role/permission level.
    pub role: AdminRole,
    /// Argon2id PHC string.
    pub password_hash: String,
    /// When the admin was created.
    pub created_at: DateTime<Utc>,
    /// Last successful login.
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Fields needed to create an admin.
#[derive(Debug, Clone)]
pub struct NewAdminUser {
    pub username: String,
    pub email: Email,
    pub name: String,
    pub role: AdminRole,
    pub password_hash: String,
}

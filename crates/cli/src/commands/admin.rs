//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create a super admin (password from the environment)
//! TIENDA_ADMIN_PASSWORD=... tienda admin create -u duenio -e duenio@example.com -r super_admin
//!
//! # List admins
//! tienda admin list
//! ```

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use tienda_admin::db::AdminUserRepository;
use tienda_admin::services::{AdminAuthService, CreateAdmin};
use tienda_admin::state::AppState;
use tienda_core::AdminRole;

use super::CommandError;

/// Create a new admin user.
///
/// # Errors
///
/// Returns `CommandError::InvalidRole` for an unknown role, or the auth
/// error for a bad email, weak password or taken username.
pub async fn create_user(
    state: &AppState,
    username: &str,
    email: &str,
    name: &str,
    role: &str,
    password: SecretString,
) -> Result<(), CommandError> {
    let role: AdminRole = role
        .parse()
        .map_err(|_| CommandError::InvalidRole(role.to_owned()))?;

    info!("Creating admin user: {} ({})", username, role);

    let admin = AdminAuthService::new(state.store())
        .create_admin(CreateAdmin {
            username: username.trim(),
            email: email.trim(),
            name: name.trim(),
            role,
            password: password.expose_secret(),
        })
        .await?;

    info!(
        "Admin user created successfully! ID: {}, Username: {}, Role: {}",
        admin.id, admin.username, admin.role
    );
    Ok(())
}

/// List admin users.
///
/// # Errors
///
/// Returns `CommandError::Repository` if `admins.json` cannot be read.
pub async fn list_users(state: &AppState) -> Result<(), CommandError> {
    let users = AdminUserRepository::new(state.store()).list().await?;
    if users.is_empty() {
        info!("No admin users yet. Create one with `tienda admin create`.");
        return Ok(());
    }

    for user in users {
        let last_login = user
            .last_login_at
            .map_or_else(|| "never".to_owned(), |at| at.to_rfc3339());
        info!(
            "{:<20} {:<12} {:<32} last login: {}",
            user.username, user.role, user.email, last_login
        );
    }
    Ok(())
}

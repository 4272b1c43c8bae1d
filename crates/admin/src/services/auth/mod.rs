//! Admin authentication service.
//!
//! Username and password login with Argon2id hashes stored in `admins.json`.

mod error;

pub use error::AdminAuthError;

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::{info, instrument, warn};

use tienda_core::{AdminUserId, Email};

use crate::db::{AdminUserRepository, RepositoryError, Store};
use crate::models::admin_user::{AdminRole, AdminUser, NewAdminUser};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 10;

/// Hash verified for unknown usernames so both paths cost the same.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("tienda-timing-equalizer").ok());

/// Fields for creating an admin from the admins page or the CLI.
#[derive(Debug, Clone)]
pub struct CreateAdmin<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub name: &'a str,
    pub role: AdminRole,
    pub password: &'a str,
}

/// Admin authentication service.
pub struct AdminAuthService<'a> {
    users: AdminUserRepository<'a>,
}

impl<'a> AdminAuthService<'a> {
    /// Create a new admin authentication service.
    #[must_use]
    pub const fn new(store: &'a Store) -> Self {
        Self {
            users: AdminUserRepository::new(store),
        }
    }

    /// Check a username and password and stamp the login.
    ///
    /// # Errors
    ///
    /// Returns `AdminAuthError::InvalidCredentials` for an unknown user or a
    /// wrong password.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AdminUser, AdminAuthError> {
        let Some(admin) = self.users.get_by_username(username).await? else {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(password, dummy);
            }
            warn!("Login attempt for unknown admin");
            return Err(AdminAuthError::InvalidCredentials);
        };

        if let Err(e) = verify_password(password, &admin.password_hash) {
            warn!(admin_id = %admin.id, "Login attempt with wrong password");
            return Err(e);
        }

        self.users.record_login(&admin.id).await?;
        info!(admin_id = %admin.id, "Admin logged in");
        Ok(admin)
    }

    /// Create a new admin user.
    ///
    /// # Errors
    ///
    /// Returns `AdminAuthError::InvalidEmail`, `AdminAuthError::WeakPassword`
    /// or `AdminAuthError::UserAlreadyExists`.
    #[instrument(skip(self, input), fields(username = %input.username))]
    pub async fn create_admin(&self, input: CreateAdmin<'_>) -> Result<AdminUser, AdminAuthError> {
        let email = Email::parse(input.email)?;
        validate_password(input.password)?;
        let password_hash = hash_password(input.password)?;

        let name = if input.name.trim().is_empty() {
            input.username.trim()
        } else {
            input.name
        };

        let admin = self
            .users
            .create(NewAdminUser {
                username: input.username.to_owned(),
                email,
                name: name.to_owned(),
                role: input.role,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(msg) => AdminAuthError::UserAlreadyExists(msg),
                other => AdminAuthError::Repository(other),
            })?;

        info!(admin_id = %admin.id, role = %admin.role, "Admin user created");
        Ok(admin)
    }

    /// Change a password after checking the current one.
    ///
    /// # Errors
    ///
    /// Returns `AdminAuthError::InvalidCredentials` if `current` is wrong,
    /// `AdminAuthError::WeakPassword` if `new` is too short.
    #[instrument(skip(self, current, new))]
    pub async fn change_password(
        &self,
        id: &AdminUserId,
        current: &str,
        new: &str,
    ) -> Result<(), AdminAuthError> {
        let admin = self
            .users
            .get(id)
            .await?
            .ok_or(AdminAuthError::UserNotFound)?;
        verify_password(current, &admin.password_hash)?;
        validate_password(new)?;
        self.users.update_password(id, hash_password(new)?).await?;
        info!(admin_id = %id, "Admin password changed");
        Ok(())
    }
}

/// Validate password meets requirements.
///
/// # Errors
///
/// Returns `AdminAuthError::WeakPassword` if the password is too short.
pub fn validate_password(password: &str) -> Result<(), AdminAuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AdminAuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AdminAuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AdminAuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AdminAuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AdminAuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AdminAuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AdminAuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input<'a>(username: &'a str, password: &'a str) -> CreateAdmin<'a> {
        CreateAdmin {
            username,
            email: "duena@example.com",
            name: "",
            role: AdminRole::SuperAdmin,
            password,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash).is_ok());
        assert!(verify_password("wrong", &hash).is_err());
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_password_length_counts_chars() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("ñññññññññ").is_err());
        assert!(validate_password("ññññññññññ").is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_flow() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        let auth = AdminAuthService::new(&store);

        let admin = auth
            .create_admin(input("Duena", "una-clave-larga"))
            .await
            .unwrap();
        assert_eq!(admin.name, "Duena");

        let logged = auth.authenticate("duena", "una-clave-larga").await.unwrap();
        assert_eq!(logged.id, admin.id);

        assert!(matches!(
            auth.authenticate("duena", "otra-clave-larga").await,
            Err(AdminAuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate("nadie", "una-clave-larga").await,
            Err(AdminAuthError::InvalidCredentials)
        ));

        let stored = AdminUserRepository::new(&store)
            .get(&admin.id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_weak_password_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        let auth = AdminAuthService::new(&store);

        assert!(matches!(
            auth.create_admin(input("ana", "corta")).await,
            Err(AdminAuthError::WeakPassword(_))
        ));

        auth.create_admin(input("ana", "una-clave-larga")).await.unwrap();
        assert!(matches!(
            auth.create_admin(input("ana", "una-clave-larga")).await,
            Err(AdminAuthError::UserAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        let auth = AdminAuthService::new(&store);
        let admin = auth
            .create_admin(input("ana", "una-clave-larga"))
            .await
            .unwrap();

        assert!(
            auth.change_password(&admin.id, "incorrecta", "nueva-clave-larga")
                .await
                .is_err()
        );
        auth.change_password(&admin.id, "una-clave-larga", "nueva-clave-larga")
            .await
            .unwrap();
        assert!(auth.authenticate("ana", "nueva-clave-larga").await.is_ok());
    }
}

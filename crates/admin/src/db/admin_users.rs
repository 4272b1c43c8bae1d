//! Admin user repository over `admins.json`.

use chrono::Utc;

use tienda_core::AdminUserId;

use super::{RepositoryError, Store};
use crate::models::admin_user::{AdminRole, AdminUser, NewAdminUser};

/// Repository for admin user operations.
pub struct AdminUserRepository<'a> {
    store: &'a Store,
}

impl<'a> AdminUserRepository<'a> {
    /// Create a new admin user repository.
    #[must_use]
    pub const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// List all admin users, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if `admins.json` cannot be read.
    pub async fn list(&self) -> Result<Vec<AdminUser>, RepositoryError> {
        let mut admins = self.store.admins().load().await?;
        admins.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(admins)
    }

    /// Get an admin user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if `admins.json` cannot be read.
    pub async fn get(&self, id: &AdminUserId) -> Result<Option<AdminUser>, RepositoryError> {
        let admins = self.store.admins().load().await?;
        Ok(admins.into_iter().find(|a| &a.id == id))
    }

    /// Get an admin user by login name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if `admins.json` cannot be read.
    pub async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AdminUser>, RepositoryError> {
        let username = normalize_username(username);
        let admins = self.store.admins().load().await?;
        Ok(admins.into_iter().find(|a| a.username == username))
    }

    /// Create a new admin user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the username or email is taken
    /// or the username is empty.
    pub async fn create(&self, new: NewAdminUser) -> Result<AdminUser, RepositoryError> {
        let username = normalize_username(&new.username);
        if username.is_empty() {
            return Err(RepositoryError::Conflict("username is empty".to_owned()));
        }

        let mut admins = self.store.admins().lock().await?;
        if admins.iter().any(|a| a.username == username) {
            return Err(RepositoryError::Conflict(format!(
                "username {username} already exists"
            )));
        }
        if admins.iter().any(|a| a.email == new.email) {
            return Err(RepositoryError::Conflict(format!(
                "email {} already exists",
                new.email
            )));
        }

        let admin = AdminUser {
            id: AdminUserId::generate(),
            username,
            email: new.email,
            name: new.name.trim().to_owned(),
            role: new.role,
            password_hash: new.password_hash,
            created_at: Utc::now(),
            last_login_at: None,
        };
        admins.push(admin.clone());
        admins.commit().await?;
        Ok(admin)
    }

    /// Stamp a successful login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the admin no longer exists.
    pub async fn record_login(&self, id: &AdminUserId) -> Result<(), RepositoryError> {
        let mut admins = self.store.admins().lock().await?;
        let admin = admins
            .iter_mut()
            .find(|a| &a.id == id)
            .ok_or(RepositoryError::NotFound)?;
        admin.last_login_at = Some(Utc::now());
        admins.commit().await
    }

    /// Replace an admin's password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the admin does not exist.
    pub async fn update_password(
        &self,
        id: &AdminUserId,
        password_hash: String,
    ) -> Result<(), RepositoryError> {
        let mut admins = self.store.admins().lock().await?;
        let admin = admins
            .iter_mut()
            .find(|a| &a.id == id)
            .ok_or(RepositoryError::NotFound)?;
        admin.password_hash = password_hash;
        admins.commit().await
    }

    /// Delete an admin user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the admin does not exist, or
    /// `RepositoryError::Conflict` if it is the last super admin.
    pub async fn delete(&self, id: &AdminUserId) -> Result<(), RepositoryError> {
        let mut admins = self.store.admins().lock().await?;
        let target = admins
            .iter()
            .find(|a| &a.id == id)
            .ok_or(RepositoryError::NotFound)?;

        if target.role == AdminRole::SuperAdmin
            && admins
                .iter()
                .filter(|a| a.role == AdminRole::SuperAdmin)
                .count()
                == 1
        {
            return Err(RepositoryError::Conflict(
                "cannot delete the last super admin".to_owned(),
            ));
        }

        admins.retain(|a| &a.id != id);
        admins.commit().await
    }
}

fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

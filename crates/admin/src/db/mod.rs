//! JSON file storage for admin.
//!
//! # Data directory
//!
//! - `products.json` - Product catalog (`[Product]`)
//! - `orders.json` - Orders written by the storefront checkout (`[Order]`)
//! - `config.json` - Site configuration (`SiteConfig`)
//! - `notifications.json` - Notification channels and toggles
//! - `admins.json` - Admin users with Argon2 password hashes
//!
//! A missing file reads as the empty default. Writes go to a sibling
//! `.tmp` file which is then renamed over the target, so readers never see
//! a half-written file.
//!
//! # Locking
//!
//! Each file has an in-process mutex. A read-modify-write cycle holds it
//! from [`JsonFile::lock`] until [`JsonGuard::commit`] (or drop). When a
//! cycle needs both, lock `orders.json` before `products.json`.

pub mod admin_users;
pub mod orders;
pub mod products;
pub mod settings;

use std::fmt;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::models::{AdminUser, NotificationSettings, Order, Product, SiteConfig};

pub use admin_users::AdminUserRepository;
pub use orders::{OrderFilter, OrderRepository};
pub use products::ProductRepository;
pub use settings::SettingsRepository;

pub const PRODUCTS_FILE: &str = "products.json";
pub const ORDERS_FILE: &str = "orders.json";
pub const CONFIG_FILE: &str = "config.json";
pub const NOTIFICATIONS_FILE: &str = "notifications.json";
pub const ADMINS_FILE: &str = "admins.json";

/// Every data file, in backup order.
pub const DATA_FILES: [&str; 5] = [
    PRODUCTS_FILE,
    ORDERS_FILE,
    CONFIG_FILE,
    NOTIFICATIONS_FILE,
    ADMINS_FILE,
];

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Reading or writing a data file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A data file holds JSON that does not match the expected shape.
    #[error("invalid JSON in {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate username).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One JSON document on disk holding a `T`.
pub struct JsonFile<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for JsonFile<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFile")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current contents without taking the lock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Io` if the file exists but cannot be read,
    /// or `RepositoryError::Serialization` if it is not valid JSON for `T`.
    pub async fn load(&self) -> Result<T, RepositoryError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(T::default()),
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| RepositoryError::json(&self.path, e))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(RepositoryError::io(&self.path, e)),
        }
    }

    /// Take the file lock and load the contents for modification.
    ///
    /// # Errors
    ///
    /// Same as [`JsonFile::load`].
    pub async fn lock(&self) -> Result<JsonGuard<'_, T>, RepositoryError> {
        let permit = self.lock.lock().await;
        let value = self.load().await?;
        Ok(JsonGuard {
            file: self,
            _permit: permit,
            value,
        })
    }

    /// Replace the whole document.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the file cannot be written.
    pub async fn replace(&self, value: T) -> Result<(), RepositoryError> {
        let mut guard = self.lock().await?;
        *guard = value;
        guard.commit().await
    }

    async fn write(&self, value: &T) -> Result<(), RepositoryError> {
        let body =
            serde_json::to_vec_pretty(value).map_err(|e| RepositoryError::json(&self.path, e))?;

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        tokio::fs::write(&temp_path, body)
            .await
            .map_err(|e| RepositoryError::io(&temp_path, e))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| RepositoryError::io(&self.path, e))
    }
}

/// Locked, loaded contents of a [`JsonFile`].
///
/// Changes are discarded unless [`JsonGuard::commit`] is called.
pub struct JsonGuard<'a, T>
where
    T: Serialize + DeserializeOwned + Default,
{
    file: &'a JsonFile<T>,
    _permit: MutexGuard<'a, ()>,
    value: T,
}

impl<T> JsonGuard<'_, T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Write the contents back and release the lock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if serialization or the atomic write fails.
    pub async fn commit(self) -> Result<(), RepositoryError> {
        self.file.write(&self.value).await
    }
}

impl<T> Deref for JsonGuard<'_, T>
where
    T: Serialize + DeserializeOwned + Default,
{
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for JsonGuard<'_, T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// All data files of one data directory.
#[derive(Debug)]
pub struct Store {
    data_dir: PathBuf,
    products: JsonFile<Vec<Product>>,
    orders: JsonFile<Vec<Order>>,
    site: JsonFile<SiteConfig>,
    notifications: JsonFile<NotificationSettings>,
    admins: JsonFile<Vec<AdminUser>>,
}

impl Store {
    /// Open a data directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Io` if the directory cannot be created.
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| RepositoryError::io(&data_dir, e))?;

        Ok(Self {
            products: JsonFile::new(data_dir.join(PRODUCTS_FILE)),
            orders: JsonFile::new(data_dir.join(ORDERS_FILE)),
            site: JsonFile::new(data_dir.join(CONFIG_FILE)),
            notifications: JsonFile::new(data_dir.join(NOTIFICATIONS_FILE)),
            admins: JsonFile::new(data_dir.join(ADMINS_FILE)),
            data_dir,
        })
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub const fn products(&self) -> &JsonFile<Vec<Product>> {
        &self.products
    }

    #[must_use]
    pub const fn orders(&self) -> &JsonFile<Vec<Order>> {
        &self.orders
    }

    #[must_use]
    pub const fn site(&self) -> &JsonFile<SiteConfig> {
        &self.site
    }

    #[must_use]
    pub const fn notifications(&self) -> &JsonFile<NotificationSettings> {
        &self.notifications
    }

    #[must_use]
    pub const fn admins(&self) -> &JsonFile<Vec<AdminUser>> {
        &self.admins
    }

    /// Current contents of one data file as untyped JSON, for backups.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` for an unknown file name, or the
    /// underlying load error.
    pub async fn export(&self, file_name: &str) -> Result<serde_json::Value, RepositoryError> {
        let path = self.data_dir.join(file_name);
        let value = match file_name {
            PRODUCTS_FILE => serde_json::to_value(self.products.load().await?),
            ORDERS_FILE => serde_json::to_value(self.orders.load().await?),
            CONFIG_FILE => serde_json::to_value(self.site.load().await?),
            NOTIFICATIONS_FILE => serde_json::to_value(self.notifications.load().await?),
            ADMINS_FILE => serde_json::to_value(self.admins.load().await?),
            other => return Err(RepositoryError::Conflict(format!("unknown data file {other}"))),
        };
        value.map_err(|e| RepositoryError::json(&path, e))
    }

    /// Check that `value` has the shape of `file_name` without writing.
    ///
    /// # Errors
    ///
    /// Same as [`Store::import`].
    pub fn validate(&self, file_name: &str, value: &serde_json::Value) -> Result<(), RepositoryError> {
        fn check<T: DeserializeOwned>(value: &serde_json::Value) -> Result<(), serde_json::Error> {
            <T as serde::Deserialize>::deserialize(value).map(drop)
        }

        let result = match file_name {
            PRODUCTS_FILE => check::<Vec<Product>>(value),
            ORDERS_FILE => check::<Vec<Order>>(value),
            CONFIG_FILE => check::<SiteConfig>(value),
            NOTIFICATIONS_FILE => check::<NotificationSettings>(value),
            ADMINS_FILE => check::<Vec<AdminUser>>(value),
            other => return Err(RepositoryError::Conflict(format!("unknown data file {other}"))),
        };
        result.map_err(|e| RepositoryError::json(&self.data_dir.join(file_name), e))
    }

    /// Overwrite one data file from untyped JSON, validating its shape first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Serialization` if `value` does not match the
    /// file's record type, `RepositoryError::Conflict` for an unknown file.
    pub async fn import(
        &self,
        file_name: &str,
        value: serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let path = self.data_dir.join(file_name);
        let invalid = |e| RepositoryError::json(&path, e);
        match file_name {
            PRODUCTS_FILE => {
                self.products
                    .replace(serde_json::from_value(value).map_err(invalid)?)
                    .await
            }
            ORDERS_FILE => {
                self.orders
                    .replace(serde_json::from_value(value).map_err(invalid)?)
                    .await
            }
            CONFIG_FILE => {
                self.site
                    .replace(serde_json::from_value(value).map_err(invalid)?)
                    .await
            }
            NOTIFICATIONS_FILE => {
                self.notifications
                    .replace(serde_json::from_value(value).map_err(invalid)?)
                    .await
            }
            ADMINS_FILE => {
                self.admins
                    .replace(serde_json::from_value(value).map_err(invalid)?)
                    .await
            }
            other => Err(RepositoryError::Conflict(format!("unknown data file {other}"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        assert!(store.products().load().await.unwrap().is_empty());
        assert_eq!(store.site().load().await.unwrap(), SiteConfig::default());
    }

    #[tokio::test]
    async fn test_commit_writes_atomically_and_drop_discards() {
        let dir = tempfile::tempdir().unwrap();
        let file: JsonFile<Vec<String>> = JsonFile::new(dir.path().join("list.json"));

        let mut guard = file.lock().await.unwrap();
        guard.push("uno".to_owned());
        guard.commit().await.unwrap();

        {
            let mut guard = file.lock().await.unwrap();
            guard.push("dos".to_owned());
        }

        assert_eq!(file.load().await.unwrap(), vec!["uno".to_owned()]);
        assert!(!dir.path().join("list.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[{").unwrap();
        let file: JsonFile<Vec<String>> = JsonFile::new(&path);

        let err = file.load().await.unwrap_err();
        assert!(matches!(err, RepositoryError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let file = std::sync::Arc::new(JsonFile::<Vec<u32>>::new(dir.path().join("n.json")));

        let mut tasks = Vec::new();
        for n in 0..20 {
            let file = file.clone();
            tasks.push(tokio::spawn(async move {
                let mut guard = file.lock().await.unwrap();
                guard.push(n);
                guard.commit().await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(file.load().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_import_rejects_wrong_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();

        let err = store
            .import(PRODUCTS_FILE, serde_json::json!({"not": "a list"}))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Serialization { .. }));

        store
            .import(CONFIG_FILE, serde_json::json!({"store_name": "Mi Tienda"}))
            .await
            .unwrap();
        assert_eq!(store.site().load().await.unwrap().store_name, "Mi Tienda");
    }
}

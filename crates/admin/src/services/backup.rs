//! Backup bundles of the data directory.
//!
//! A backup is one JSON file named `backup-YYYYMMDD-HHMMSS.json` (with a
//! `-N` suffix when two land in the same second) holding every data file:
//!
//! ```json
//! { "created_at": "...", "label": "antes de migrar", "files": { "products.json": [...] } }
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::db::{DATA_FILES, RepositoryError, Store};

const PREFIX: &str = "backup-";
const SUFFIX: &str = ".json";
const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Errors from backup operations.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid backup name: {0}")]
    InvalidName(String),

    #[error("backup not found: {0}")]
    NotFound(String),

    /// The file is not a backup bundle.
    #[error("backup {name} is corrupt: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl BackupError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// On-disk backup format.
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupBundle {
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub files: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct BundleHeader {
    created_at: DateTime<Utc>,
    #[serde(default)]
    label: Option<String>,
}

/// A backup as listed on the backups page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub label: Option<String>,
}

/// Creates, lists and restores backups for one store.
pub struct BackupService<'a> {
    store: &'a Store,
    backup_dir: &'a Path,
    retention: usize,
}

impl<'a> BackupService<'a> {
    /// `retention` of 0 keeps every backup.
    #[must_use]
    pub const fn new(store: &'a Store, backup_dir: &'a Path, retention: usize) -> Self {
        Self {
            store,
            backup_dir,
            retention,
        }
    }

    /// Bundle every data file into a new backup and prune old ones.
    ///
    /// # Errors
    ///
    /// Returns `BackupError` if a data file cannot be read or the bundle
    /// cannot be written.
    #[instrument(skip(self))]
    pub async fn create(&self, label: Option<&str>) -> Result<BackupInfo, BackupError> {
        let mut files = BTreeMap::new();
        for file_name in DATA_FILES {
            files.insert(file_name.to_owned(), self.store.export(file_name).await?);
        }

        let created_at = Utc::now();
        let bundle = BackupBundle {
            created_at,
            label: label
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_owned),
            files,
        };
        let body = serde_json::to_vec_pretty(&bundle).map_err(|source| BackupError::Corrupt {
            name: "new backup".to_owned(),
            source,
        })?;

        tokio::fs::create_dir_all(self.backup_dir)
            .await
            .map_err(|e| BackupError::io(self.backup_dir, e))?;

        let name = self.reserve_name(created_at).await?;
        let path = self.backup_dir.join(&name);
        let temp_path = self.backup_dir.join(format!("{name}.tmp"));
        let written = match tokio::fs::write(&temp_path, &body).await {
            Ok(()) => tokio::fs::rename(&temp_path, &path)
                .await
                .map_err(|e| BackupError::io(&path, e)),
            Err(e) => Err(BackupError::io(&temp_path, e)),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }

        info!(name = %name, size = body.len(), "Backup created");
        self.prune().await;

        Ok(BackupInfo {
            name,
            size: body.len() as u64,
            created_at,
            label: bundle.label,
        })
    }

    /// Backups in the backup directory, newest first.
    ///
    /// Files that are not readable bundles are skipped.
    ///
    /// # Errors
    ///
    /// Returns `BackupError::Io` if the directory exists but cannot be read.
    pub async fn list(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let mut entries = match tokio::fs::read_dir(self.backup_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BackupError::io(self.backup_dir, e)),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| BackupError::io(self.backup_dir, e))?
        {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if validate_name(&name).is_err() {
                continue;
            }

            let path = entry.path();
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(name = %name, error = %e, "Skipping unreadable backup");
                    continue;
                }
            };
            match serde_json::from_slice::<BundleHeader>(&bytes) {
                Ok(header) => backups.push(BackupInfo {
                    name,
                    size: bytes.len() as u64,
                    created_at: header.created_at,
                    label: header.label,
                }),
                Err(e) => warn!(name = %name, error = %e, "Skipping corrupt backup"),
            }
        }

        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| sort_key(&b.name).cmp(&sort_key(&a.name)))
        });
        Ok(backups)
    }

    /// Raw bytes of one backup, for download.
    ///
    /// # Errors
    ///
    /// Returns `BackupError::InvalidName` or `BackupError::NotFound`.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, BackupError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BackupError::NotFound(name.to_owned())),
            Err(e) => Err(BackupError::io(&path, e)),
        }
    }

    /// Replace the data files with the contents of a backup.
    ///
    /// The bundle is validated in full first, then a safety backup of the
    /// current data is taken, then each file is rewritten under its lock.
    /// Files missing from the bundle are left alone.
    ///
    /// Returns the safety backup.
    ///
    /// # Errors
    ///
    /// Returns `BackupError::Corrupt` or `BackupError::Repository` if the
    /// bundle does not match the data file shapes; nothing is written then.
    #[instrument(skip(self))]
    pub async fn restore(&self, name: &str) -> Result<BackupInfo, BackupError> {
        let bytes = self.read(name).await?;
        let bundle: BackupBundle =
            serde_json::from_slice(&bytes).map_err(|source| BackupError::Corrupt {
                name: name.to_owned(),
                source,
            })?;

        for (file_name, value) in &bundle.files {
            if DATA_FILES.contains(&file_name.as_str()) {
                self.store.validate(file_name, value)?;
            } else {
                warn!(file = %file_name, "Ignoring unknown file in backup");
            }
        }

        let safety = self
            .create(Some(format!("antes de restaurar {name}").as_str()))
            .await?;

        for (file_name, value) in bundle.files {
            if DATA_FILES.contains(&file_name.as_str()) {
                self.store.import(&file_name, value).await?;
            }
        }

        info!(name, safety = %safety.name, "Backup restored");
        Ok(safety)
    }

    /// Delete one backup.
    ///
    /// # Errors
    ///
    /// Returns `BackupError::InvalidName` or `BackupError::NotFound`.
    pub async fn delete(&self, name: &str) -> Result<(), BackupError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(name, "Backup deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BackupError::NotFound(name.to_owned())),
            Err(e) => Err(BackupError::io(&path, e)),
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, BackupError> {
        validate_name(name)?;
        Ok(self.backup_dir.join(name))
    }

    /// Claim an unused name by creating its file; the bundle is renamed over it.
    async fn reserve_name(&self, created_at: DateTime<Utc>) -> Result<String, BackupError> {
        let stamp = created_at.format(STAMP_FORMAT);
        let mut name = format!("{PREFIX}{stamp}{SUFFIX}");
        let mut n = 2;
        loop {
            let path = self.backup_dir.join(&name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(name),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    name = format!("{PREFIX}{stamp}-{n}{SUFFIX}");
                    n += 1;
                }
                Err(e) => return Err(BackupError::io(&path, e)),
            }
        }
    }

    /// Delete backups beyond the retention count. Failures are logged.
    async fn prune(&self) {
        if self.retention == 0 {
            return;
        }
        let backups = match self.list().await {
            Ok(backups) => backups,
            Err(e) => {
                warn!(error = %e, "Could not list backups for pruning");
                return;
            }
        };
        for old in backups.iter().skip(self.retention) {
            if let Err(e) = self.delete(&old.name).await {
                warn!(name = %old.name, error = %e, "Could not prune backup");
            }
        }
    }
}

/// Accept only plain `backup-*.json` file names.
///
/// # Errors
///
/// Returns `BackupError::InvalidName` for anything else.
pub fn validate_name(name: &str) -> Result<(), BackupError> {
    let valid = name.len() > PREFIX.len() + SUFFIX.len()
        && name.starts_with(PREFIX)
        && name.ends_with(SUFFIX)
        && !name.contains("..")
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(BackupError::InvalidName(name.to_owned()))
    }
}

/// Timestamp and same-second sequence encoded in a backup name.
fn sort_key(name: &str) -> (Option<NaiveDateTime>, u32) {
    let Some(stem) = name
        .strip_prefix(PREFIX)
        .and_then(|n| n.strip_suffix(SUFFIX))
    else {
        return (None, 0);
    };
    let (stamp, seq) = match stem.split_at_checked(15) {
        Some((stamp, rest)) if !rest.is_empty() => {
            (stamp, rest.trim_start_matches('-').parse().unwrap_or(0))
        }
        _ => (stem, 1),
    };
    (NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok(), seq)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::db::SettingsRepository;
    use crate::models::SiteConfig;

    async fn setup() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("data")).await.unwrap();
        (dir, store)
    }

    async fn set_store_name(store: &Store, name: &str) {
        SettingsRepository::new(store)
            .save_site(SiteConfig {
                store_name: name.to_owned(),
                ..SiteConfig::default()
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("backup-20240501-101500.json").is_ok());
        assert!(validate_name("backup-20240501-101500-2.json").is_ok());
        assert!(validate_name("../backup-1.json").is_err());
        assert!(validate_name("backup-../../etc/passwd.json").is_err());
        assert!(validate_name("backup-a/b.json").is_err());
        assert!(validate_name("products.json").is_err());
        assert!(validate_name("backup-.json").is_err());
        assert!(validate_name("backup-1.json.tmp").is_err());
    }

    #[test]
    fn test_same_second_suffix_sorts_after_base() {
        assert!(
            sort_key("backup-20240501-101500-2.json") > sort_key("backup-20240501-101500.json")
        );
        assert!(sort_key("backup-20240501-101501.json") > sort_key("backup-20240501-101500-9.json"));
    }

    #[tokio::test]
    async fn test_same_second_creates_never_share_a_name() {
        let (dir, store) = setup().await;
        let backup_dir = dir.path().join("backups");
        tokio::fs::create_dir_all(&backup_dir).await.unwrap();
        let service = BackupService::new(&store, &backup_dir, 0);

        let at = Utc::now();
        let (first, second) = tokio::join!(service.reserve_name(at), service.reserve_name(at));
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first, second);

        let (a, b) = tokio::join!(service.create(Some("a")), service.create(Some("b")));
        assert_ne!(a.unwrap().name, b.unwrap().name);
        let labels: Vec<_> = service
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter_map(|info| info.label)
            .collect();
        assert_eq!(labels.len(), 2);
    }

    #[tokio::test]
    async fn test_create_list_and_read() {
        let (dir, store) = setup().await;
        set_store_name(&store, "Original").await;
        let backup_dir = dir.path().join("backups");
        let service = BackupService::new(&store, &backup_dir, 30);

        let first = service.create(Some(" semanal ")).await.unwrap();
        let second = service.create(None).await.unwrap();
        assert_ne!(first.name, second.name);

        let listed = service.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, second.name);
        assert_eq!(listed[1].label.as_deref(), Some("semanal"));

        let bundle: BackupBundle =
            serde_json::from_slice(&service.read(&first.name).await.unwrap()).unwrap();
        assert_eq!(bundle.files.len(), DATA_FILES.len());
        assert_eq!(bundle.files["config.json"]["store_name"], "Original");
    }

    #[tokio::test]
    async fn test_restore_takes_safety_backup() {
        let (dir, store) = setup().await;
        let backup_dir = dir.path().join("backups");
        let service = BackupService::new(&store, &backup_dir, 30);

        set_store_name(&store, "Antes").await;
        let backup = service.create(None).await.unwrap();
        set_store_name(&store, "Despues").await;

        let safety = service.restore(&backup.name).await.unwrap();
        assert_eq!(store.site().load().await.unwrap().store_name, "Antes");

        let safety_bundle: BackupBundle =
            serde_json::from_slice(&service.read(&safety.name).await.unwrap()).unwrap();
        assert_eq!(safety_bundle.files["config.json"]["store_name"], "Despues");
    }

    #[tokio::test]
    async fn test_restore_rejects_bad_bundle_without_writing() {
        let (dir, store) = setup().await;
        let backup_dir = dir.path().join("backups");
        tokio::fs::create_dir_all(&backup_dir).await.unwrap();
        set_store_name(&store, "Intacta").await;

        let bundle = serde_json::json!({
            "created_at": "2024-05-01T10:15:00Z",
            "files": {
                "config.json": { "store_name": "Pisada" },
                "products.json": { "not": "a list" }
            }
        });
        let name = "backup-20240501-101500.json";
        std::fs::write(backup_dir.join(name), bundle.to_string()).unwrap();

        let service = BackupService::new(&store, &backup_dir, 30);
        assert!(matches!(
            service.restore(name).await,
            Err(BackupError::Repository(RepositoryError::Serialization { .. }))
        ));
        assert_eq!(store.site().load().await.unwrap().store_name, "Intacta");
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retention_prunes_oldest() {
        let (dir, store) = setup().await;
        let backup_dir = dir.path().join("backups");
        let service = BackupService::new(&store, &backup_dir, 2);

        let first = service.create(None).await.unwrap();
        service.create(None).await.unwrap();
        service.create(None).await.unwrap();

        let listed = service.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|b| b.name != first.name));
    }

    #[tokio::test]
    async fn test_missing_and_invalid_names() {
        let (dir, store) = setup().await;
        let backup_dir = dir.path().join("backups");
        let service = BackupService::new(&store, &backup_dir, 30);

        assert!(service.list().await.unwrap().is_empty());
        assert!(matches!(
            service.read("backup-20000101-000000.json").await,
            Err(BackupError::NotFound(_))
        ));
        assert!(matches!(
            service.delete("../admins.json").await,
            Err(BackupError::InvalidName(_))
        ));
    }
}

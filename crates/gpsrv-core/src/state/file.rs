// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Keeps provisioned domains and the master secret digest across daemon
// restarts and crashes.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: A document that fails to parse is corrupt
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
// - A corrupt file with no usable backup is an error, never an empty state
//
// The file holds secret digests, so it is created with mode 0600 on unix.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::state_store::{STATE_DOCUMENT_VERSION, StateDocument, StateStore};

/// File-based state store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use gpsrv_core::state::FileStateStore;
/// use gpsrv_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/gpsrv/kdb.json").await?;
///     let document = store.load().await?;
///     store.save(&document).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    /// Serializes writers on the temp/backup/target files
    write_lock: Mutex<()>,
}

/// Why a state file could not be read
enum LoadFailure {
    /// Unreadable file (permissions, IO)
    Io(Error),
    /// Readable but not a valid document
    Corrupt(Error),
}

impl FileStateStore {
    /// Create a file state store, creating parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main state file
    /// 2. If it is corrupt, try loading backup and restore it
    /// 3. If backup is missing or also unusable, fail without touching
    ///    either file
    async fn load_with_recovery(&self) -> Result<StateDocument, Error> {
        let e = match Self::read_document(&self.path).await {
            Ok(document) => {
                tracing::debug!("Loaded state file: {} records", document.domains.len());
                return Ok(document);
            }
            Err(LoadFailure::Io(e)) => return Err(e),
            Err(LoadFailure::Corrupt(e)) => e,
        };

        tracing::warn!(
            "State file appears corrupted: {}. Attempting recovery from backup.",
            e
        );

        let backup_path = Self::backup_path(&self.path);
        if !backup_path.exists() {
            tracing::error!("No backup file found for {}", self.path.display());
            return Err(Error::state_store(format!(
                "{}; no backup to recover from, refusing to start with empty state",
                e
            )));
        }

        match Self::read_document(&backup_path).await {
            Ok(document) => {
                tracing::info!(
                    "Recovered state from backup: {} records",
                    document.domains.len()
                );

                if let Err(restore_err) = fs::copy(&backup_path, &self.path).await {
                    tracing::error!(
                        "Failed to restore state file from backup: {}",
                        restore_err
                    );
                }

                Ok(document)
            }
            Err(LoadFailure::Io(backup_err)) | Err(LoadFailure::Corrupt(backup_err)) => {
                tracing::error!("Backup also unusable: {}", backup_err);
                Err(Error::state_store(format!("{}; backup unusable: {}", e, backup_err)))
            }
        }
    }

    /// Read and parse one document file; a missing file is an empty document
    async fn read_document(path: &Path) -> Result<StateDocument, LoadFailure> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(StateDocument::default());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| LoadFailure::Io(file_error("read", path, e)))?;

        let document: StateDocument = serde_json::from_str(&content)
            .map_err(|e| LoadFailure::Corrupt(file_error("parse", path, e)))?;

        if document.version != STATE_DOCUMENT_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STATE_DOCUMENT_VERSION,
                document.version
            );
        }

        Ok(document)
    }

    /// Write state to file atomically
    async fn write_document(&self, document: &StateDocument) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        let _guard = self.write_lock.lock().await;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path)
                .await
                .map_err(|e| file_error("create", &temp_path, e))?;

            restrict_permissions(&temp_path).await?;

            file.write_all(json.as_bytes())
                .await
                .map_err(|e| file_error("write", &temp_path, e))?;
            file.sync_all()
                .await
                .map_err(|e| file_error("sync", &temp_path, e))?;
        }

        // Previous document becomes the recovery point
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Could not refresh {}: {}", backup_path.display(), e);
            }
        }

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| file_error("replace", &self.path, e))?;

        tracing::trace!(
            "Persisted {} domain(s) to {}",
            document.domains.len(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| file_error("restrict permissions of", path, e))
}

fn file_error(action: &str, path: &Path, e: impl std::fmt::Display) -> Error {
    Error::state_store(format!("Failed to {} {}: {}", action, path.display(), e))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), Error> {
    Ok(())
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<StateDocument, Error> {
        self.load_with_recovery().await
    }

    async fn save(&self, document: &StateDocument) -> Result<(), Error> {
        self.write_document(document).await
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

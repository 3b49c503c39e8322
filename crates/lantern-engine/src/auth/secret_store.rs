// Secret storage for the per-installation auth token
//
// Primary: OS keychain (macOS Keychain Services, Windows Credential Manager,
// Secret Service on Linux). Fallback: a file under the data dir restricted
// to owner read/write. The variant is picked once, by an upfront capability
// probe at construction - call sites never guess.

use std::fs;
use std::path::PathBuf;

use lantern_core::{EngineError, Result};

/// Keychain service name for Lantern secrets.
pub const SERVICE_NAME: &str = "io.lantern.engine";

const TOKEN_ACCOUNT: &str = "auth_token";

/// Storage backend for the installation secret.
pub trait SecretStore: Send + Sync {
    /// Read the stored token. None means no token has been stored yet.
    fn load(&self) -> Result<Option<String>>;

    /// Store the token, replacing any previous value.
    fn save(&self, token: &str) -> Result<()>;

    /// Delete the stored token. Returns whether anything was deleted.
    fn delete(&self) -> Result<bool>;

    /// Short backend label for logs and status ("keychain" or "file").
    fn kind(&self) -> &'static str;
}

/// OS keychain storage via the keyring crate.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, TOKEN_ACCOUNT)
            .map_err(|e| EngineError::secret_store(e.to_string()))
    }
}

impl SecretStore for KeyringStore {
    fn load(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(EngineError::secret_store(e.to_string())),
        }
    }

    fn save(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .map_err(|e| EngineError::secret_store(e.to_string()))
    }

    fn delete(&self) -> Result<bool> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(EngineError::secret_store(e.to_string())),
        }
    }

    fn kind(&self) -> &'static str {
        "keychain"
    }
}

/// File storage with owner-only permissions.
///
/// Reads refuse a token file whose permissions are anything other than 0600:
/// fail closed rather than trust a loosened-permission secret.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl SecretStore for FileStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&self.path)
                .map_err(|e| EngineError::secret_store(e.to_string()))?
                .permissions()
                .mode()
                & 0o777;
            if mode != 0o600 {
                return Err(EngineError::security(format!(
                    "token file {} has unsafe permissions {:o}, expected 600. \
                     Fix with: chmod 600 {}",
                    self.path.display(),
                    mode,
                    self.path.display()
                )));
            }
        }

        let token = fs::read_to_string(&self.path)
            .map_err(|e| EngineError::secret_store(e.to_string()))?;
        Ok(Some(token.trim().to_string()))
    }

    fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::secret_store(e.to_string()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                    .map_err(|e| EngineError::secret_store(e.to_string()))?;
            }
        }

        fs::write(&self.path, token).map_err(|e| EngineError::secret_store(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(|e| EngineError::secret_store(e.to_string()))?;
        }
        Ok(())
    }

    fn delete(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path).map_err(|e| EngineError::secret_store(e.to_string()))?;
        Ok(true)
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

/// Pick the storage backend once, up front.
///
/// Probes the keychain with a read; a missing entry proves the backend
/// works. Anything else falls back to the owner-only file.
pub fn detect_secret_store(service: &str, fallback_path: PathBuf) -> Box<dyn SecretStore> {
    match keyring::Entry::new(service, TOKEN_ACCOUNT) {
        Ok(entry) => match entry.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => {
                return Box::new(KeyringStore::new(service));
            }
            Err(e) => {
                tracing::warn!(error = %e, "OS keychain unavailable, falling back to token file");
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "OS keychain unavailable, falling back to token file");
        }
    }
    Box::new(FileStore::new(fallback_path))
}

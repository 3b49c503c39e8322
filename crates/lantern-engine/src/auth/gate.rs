// Auth gate - owns the installation secret
//
// One instance is constructed at startup and threaded through request
// handling; tests build their own isolated gates. The token is cached in
// memory after the first read and replaced wholesale on rotate/reset.

use parking_lot::Mutex;

use lantern_core::Result;

use super::secret_store::SecretStore;
use super::token::{generate_token, validate_token};

pub struct AuthGate {
    store: Box<dyn SecretStore>,
    cached: Mutex<Option<String>>,
}

impl AuthGate {
    pub fn new(store: Box<dyn SecretStore>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    /// Which storage backend holds the secret ("keychain" or "file").
    pub fn storage_kind(&self) -> &'static str {
        self.store.kind()
    }

    /// The current auth token, generating and storing one on first use.
    pub fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock();
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = match self.store.load()? {
            Some(token) => token,
            None => {
                let token = generate_token();
                self.store.save(&token)?;
                tracing::info!(storage = self.store.kind(), "generated new auth token");
                token
            }
        };
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Constant-time check of a client-supplied token.
    pub fn validate(&self, provided: &str) -> Result<bool> {
        Ok(validate_token(provided, &self.token()?))
    }

    /// Generate and store a new token, invalidating the old one.
    pub fn rotate_token(&self) -> Result<String> {
        let token = generate_token();
        self.store.save(&token)?;
        *self.cached.lock() = Some(token.clone());
        tracing::info!("auth token rotated");
        Ok(token)
    }

    /// Delete all stored copies, then generate fresh.
    pub fn reset_token(&self) -> Result<String> {
        self.store.delete()?;
        *self.cached.lock() = None;
        self.token()
    }

    /// Drop the cached token so the next access re-reads storage.
    pub fn clear_cache(&self) {
        *self.cached.lock() = None;
    }
}

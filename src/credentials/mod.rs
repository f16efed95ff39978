//! Credential storage abstraction.
//!
//! Backends persist the long-lived credentials (login + API key) and cache
//! the short-lived access token so that separate process invocations can
//! share a session. Reads distinguish "nothing stored" (`Ok(None)`) from a
//! backend failure (`Err`); callers above this trait treat read and write
//! failures as cache misses, while purge failures are surfaced.

mod file;
mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::config::{Config, CredentialStorage};
use crate::error::Error;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the cached access token.
    ///
    /// Returns `Ok(None)` if no token has been stored yet.
    async fn read_authn_token(&self) -> Result<Option<Vec<u8>>, Error>;

    /// Cache an access token's raw bytes.
    async fn store_authn_token(&self, token: &[u8]) -> Result<(), Error>;

    /// Read the stored login and API key.
    ///
    /// Returns `Ok(None)` if no credentials have been stored yet.
    async fn read_credentials(&self) -> Result<Option<(String, SecretString)>, Error>;

    /// Store a login and its API key.
    async fn store_credentials(&self, login: &str, api_key: SecretString) -> Result<(), Error>;

    /// Remove everything this store holds.
    ///
    /// Purging a store that holds nothing succeeds. Failures here matter:
    /// the caller asked for removal and needs to know if secrets remain.
    async fn purge_credentials(&self) -> Result<(), Error>;
}

/// Build the credential store selected by the configuration, if any.
pub fn create_credential_store(config: &Config) -> Result<Option<Arc<dyn CredentialStore>>, Error> {
    match config.credential_storage {
        CredentialStorage::None => Ok(None),
        CredentialStorage::File => {
            let store = match &config.credentials_path {
                Some(path) => FileCredentialStore::with_path(path)?,
                None => FileCredentialStore::new()?,
            };
            Ok(Some(Arc::new(store)))
        }
    }
}

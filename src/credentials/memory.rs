//! In-memory credential store for tests and short-lived processes.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use crate::error::Error;

use super::CredentialStore;

#[derive(Default)]
struct Slots {
    token: Option<Vec<u8>>,
    login: Option<String>,
    api_key: Option<SecretString>,
}

/// Process-local store. Nothing survives the process.
pub struct MemoryCredentialStore {
    slots: Mutex<Slots>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn read_authn_token(&self) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.slots.lock().await.token.clone())
    }

    async fn store_authn_token(&self, token: &[u8]) -> Result<(), Error> {
        self.slots.lock().await.token = Some(token.to_vec());
        Ok(())
    }

    async fn read_credentials(&self) -> Result<Option<(String, SecretString)>, Error> {
        let slots = self.slots.lock().await;
        match (&slots.login, &slots.api_key) {
            (Some(login), Some(key)) => Ok(Some((
                login.clone(),
                SecretString::from(key.expose_secret().to_owned()),
            ))),
            _ => Ok(None),
        }
    }

    async fn store_credentials(&self, login: &str, api_key: SecretString) -> Result<(), Error> {
        let mut slots = self.slots.lock().await;
        slots.login = Some(login.to_string());
        slots.api_key = Some(api_key);
        Ok(())
    }

    async fn purge_credentials(&self) -> Result<(), Error> {
        let mut slots = self.slots.lock().await;
        *slots = Slots::default();
        Ok(())
    }
}

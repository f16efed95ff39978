//! File-backed credential store.
//!
//! Everything lives in a single JSON document, by default under
//! `~/.cache/strongroom/credentials.json`. Writes go to a temp file in the
//! same directory followed by a rename, so readers only ever observe a
//! fully-written document.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::CredentialStore;

/// Distinguishes scratch files when several stores write the same path.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    login: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,

    /// Base64 of the raw token bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authn_token: Option<String>,
}

pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store under the user cache directory.
    pub fn new() -> Result<Self, Error> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| Error::StoreUnavailable("could not find cache directory".to_string()))?
            .join("strongroom");
        Self::with_path(dir.join("credentials.json"))
    }

    /// Store at a custom location.
    pub fn with_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::StoreUnavailable(format!("failed to create credential dir {parent:?}: {e}"))
            })?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Document, Error> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => {
                return Err(Error::StoreUnavailable(format!(
                    "failed to read {:?}: {e}",
                    self.path
                )))
            }
        };
        serde_json::from_slice(&content).map_err(|e| {
            Error::StoreUnavailable(format!("failed to parse {:?}: {e}", self.path))
        })
    }

    async fn write_document(&self, document: &Document) -> Result<(), Error> {
        let content = serde_json::to_string_pretty(document).map_err(|e| {
            Error::StoreUnavailable(format!("failed to serialize credentials: {e}"))
        })?;

        // Same-directory temp file so the rename stays on one filesystem,
        // named per writer so concurrent stores never share scratch space.
        let tmp = self.path.with_extension(format!(
            "json.tmp-{}-{}",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, content).await.map_err(|e| {
            Error::StoreUnavailable(format!("failed to write {tmp:?}: {e}"))
        })?;
        restrict_permissions(&tmp).await.map_err(|e| {
            Error::StoreUnavailable(format!("failed to set permissions on {tmp:?}: {e}"))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            Error::StoreUnavailable(format!("failed to replace {:?}: {e}", self.path))
        })
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn read_authn_token(&self) -> Result<Option<Vec<u8>>, Error> {
        let document = self.read_document().await?;
        match document.authn_token {
            Some(encoded) => {
                let bytes = BASE64.decode(encoded.as_bytes()).map_err(|e| {
                    Error::StoreUnavailable(format!("stored token is not base64: {e}"))
                })?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    async fn store_authn_token(&self, token: &[u8]) -> Result<(), Error> {
        let mut document = self.read_document().await?;
        document.authn_token = Some(BASE64.encode(token));
        self.write_document(&document).await
    }

    async fn read_credentials(&self) -> Result<Option<(String, SecretString)>, Error> {
        let document = self.read_document().await?;
        match (document.login, document.api_key) {
            (Some(login), Some(api_key)) => Ok(Some((login, SecretString::from(api_key)))),
            _ => Ok(None),
        }
    }

    async fn store_credentials(&self, login: &str, api_key: SecretString) -> Result<(), Error> {
        let mut document = self.read_document().await?;
        document.login = Some(login.to_string());
        document.api_key = Some(api_key.expose_secret().to_owned());
        self.write_document(&document).await
    }

    async fn purge_credentials(&self) -> Result<(), Error> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::StoreUnavailable(format!(
                "failed to remove {:?}: {e}",
                self.path
            ))),
        }
    }
}

//! Token-file authentication.
//!
//! For environments where a sidecar or injector process maintains the token
//! on disk. A refresh re-reads the file, waiting a bounded time for it to
//! appear; rotation by the external process is detected through the file's
//! mtime.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::Error;

use super::Authenticator;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

pub struct TokenFileAuthenticator {
    path: PathBuf,
    max_wait: Duration,
    last_modified: Mutex<Option<SystemTime>>,
}

impl TokenFileAuthenticator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_wait: DEFAULT_MAX_WAIT,
            last_modified: Mutex::new(None),
        }
    }

    /// Bound how long a refresh waits for the file to show up.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn current_mtime(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .ok()
            .and_then(|m| m.modified().ok())
    }

    /// Poll until the file exists and is non-empty. An empty file means the
    /// writer has not finished yet.
    async fn wait_for_file(&self) -> Result<std::fs::Metadata, Error> {
        let deadline = Instant::now() + self.max_wait;
        loop {
            if let Ok(metadata) = tokio::fs::metadata(&self.path).await {
                if metadata.len() > 0 {
                    return Ok(metadata);
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::AuthenticationTimeout {
                    waited: self.max_wait,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Authenticator for TokenFileAuthenticator {
    async fn refresh_token(&self) -> Result<Vec<u8>, Error> {
        let metadata = self.wait_for_file().await?;
        let bytes = tokio::fs::read(&self.path).await?;
        *self
            .last_modified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = metadata.modified().ok();
        Ok(bytes)
    }

    fn needs_token_refresh(&self) -> bool {
        let seen = *self
            .last_modified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        seen != self.current_mtime()
    }
}

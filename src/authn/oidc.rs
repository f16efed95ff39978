//! OIDC token-cache authentication.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::credentials::CredentialStore;
use crate::error::Error;
use crate::token::AccessToken;

use super::Authenticator;

/// Serves the token cached by a previous interactive OIDC login.
///
/// This strategy never talks to the identity provider itself. When the
/// cache is missing, unreadable, or stale there is nothing to retry
/// silently; the caller has to run the interactive login again.
pub struct OidcAuthenticator {
    storage: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl OidcAuthenticator {
    pub fn new(storage: Arc<dyn CredentialStore>) -> Self {
        Self {
            storage,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl Authenticator for OidcAuthenticator {
    async fn refresh_token(&self) -> Result<Vec<u8>, Error> {
        // A failing cache read is a miss, not a hard error.
        let cached = match self.storage.read_authn_token().await {
            Ok(cached) => cached,
            Err(e) => {
                debug!(error = %e, "token cache unreadable");
                None
            }
        };
        let Some(bytes) = cached else {
            return Err(Error::ReauthenticationRequired);
        };

        let token = match AccessToken::parse(&bytes) {
            Ok(token) => token,
            Err(e) => {
                debug!(error = %e, "cached token is corrupt");
                return Err(Error::ReauthenticationRequired);
            }
        };
        if token.should_refresh_at(self.clock.now()) {
            return Err(Error::ReauthenticationRequired);
        }
        Ok(bytes)
    }

    fn needs_token_refresh(&self) -> bool {
        false
    }
}

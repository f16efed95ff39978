//! Pre-issued token authentication.

use async_trait::async_trait;

use crate::error::Error;

use super::Authenticator;

/// Wraps token bytes obtained outside the client.
///
/// This strategy cannot actually refresh: once the wrapped token expires,
/// the only recovery is new material from wherever it came from, so callers
/// see the server's rejection rather than a silent retry loop.
pub struct TokenAuthenticator {
    token: Vec<u8>,
}

impl TokenAuthenticator {
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn refresh_token(&self) -> Result<Vec<u8>, Error> {
        if self.token.is_empty() {
            return Err(Error::NotAuthenticated);
        }
        Ok(self.token.clone())
    }

    fn needs_token_refresh(&self) -> bool {
        false
    }
}

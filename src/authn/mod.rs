//! Pluggable strategies for obtaining access tokens.
//!
//! Each authenticator knows one way to produce raw token bytes: exchanging
//! an API key, handing out a pre-issued token, reading a file maintained by
//! an external process, or consulting the OIDC token cache. The session
//! layer decides *when* to call them.

mod api_key;
mod oidc;
mod token;
mod token_file;

pub use api_key::{ApiKeyAuthenticator, AuthenticateFn};
pub use oidc::OidcAuthenticator;
pub use token::TokenAuthenticator;
pub use token_file::TokenFileAuthenticator;

use std::fmt;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Obtain current token bytes by whatever means this strategy has.
    async fn refresh_token(&self) -> Result<Vec<u8>, Error>;

    /// Strategy-specific staleness, checked in addition to the token's own
    /// age. Most strategies have none.
    fn needs_token_refresh(&self) -> bool {
        false
    }
}

/// A login name paired with its API key.
#[derive(Debug)]
pub struct LoginPair {
    pub login: String,
    pub api_key: SecretString,
}

impl LoginPair {
    pub fn new(login: impl Into<String>, api_key: impl Into<SecretString>) -> Self {
        Self {
            login: login.into(),
            api_key: api_key.into(),
        }
    }
}

impl Clone for LoginPair {
    fn clone(&self) -> Self {
        Self {
            login: self.login.clone(),
            api_key: SecretString::from(self.api_key.expose_secret().to_owned()),
        }
    }
}

impl fmt::Display for LoginPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.login)
    }
}

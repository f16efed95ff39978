//! API-key authentication.
//!
//! The exchange of an API key for a token is a network call that belongs to
//! the client layer, so the authenticator holds an injected delegate rather
//! than an HTTP handle. That keeps this type transport-agnostic and makes
//! the refresh path trivial to exercise in tests.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::Error;

use super::{Authenticator, LoginPair};

/// Delegate performing the authenticate call for [`ApiKeyAuthenticator`].
pub type AuthenticateFn =
    Arc<dyn Fn(LoginPair) -> BoxFuture<'static, Result<Vec<u8>, Error>> + Send + Sync>;

pub struct ApiKeyAuthenticator {
    login_pair: LoginPair,
    authenticate: AuthenticateFn,
}

impl ApiKeyAuthenticator {
    pub fn new(login_pair: LoginPair, authenticate: AuthenticateFn) -> Self {
        Self {
            login_pair,
            authenticate,
        }
    }

    pub fn login(&self) -> &str {
        &self.login_pair.login
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn refresh_token(&self) -> Result<Vec<u8>, Error> {
        (self.authenticate)(self.login_pair.clone()).await
    }

    fn needs_token_refresh(&self) -> bool {
        false
    }
}

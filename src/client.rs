//! High-level client for the Strongroom API.
//!
//! A `Client` owns the HTTP handle, the request router, and a [`Session`]
//! that keeps the access token fresh. Every authenticated request obtains
//! the current token from the session and stamps it into the
//! `Authorization` header; there is no automatic retry on 401, callers that
//! want recovery call [`Client::force_refresh`] and try again.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::warn;

use crate::authn::{
    ApiKeyAuthenticator, AuthenticateFn, Authenticator, LoginPair, OidcAuthenticator,
    TokenAuthenticator, TokenFileAuthenticator,
};
use crate::config::{AuthnType, Config};
use crate::credentials::{create_credential_store, CredentialStore, MemoryCredentialStore};
use crate::error::Error;
use crate::response::{data_response, json_response, ApiError};
use crate::router::Router;
use crate::session::Session;
use crate::token::AccessToken;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How a policy load treats the existing policy subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    /// Replace the subtree with the submitted policy.
    Put,
    /// Add to the subtree; nothing is deleted.
    Post,
    /// Modify the subtree, deletions allowed.
    Patch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRole {
    pub id: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyResponse {
    #[serde(default)]
    pub created_roles: HashMap<String, CreatedRole>,
    pub version: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhoamiResponse {
    #[serde(default)]
    pub client_ip: String,
    #[serde(default)]
    pub user_agent: String,
    pub account: String,
    pub username: String,
    pub token_issued_at: DateTime<Utc>,
}

impl WhoamiResponse {
    /// Role kind and name for this identity: `host/...` usernames are host
    /// roles, anything else is a user.
    pub fn role(&self) -> (&str, &str) {
        match self.username.split_once('/') {
            Some((kind, name)) => (kind, name),
            None => ("user", self.username.as_str()),
        }
    }

    /// Fully qualified role id for this identity.
    pub fn role_id(&self) -> String {
        let (kind, name) = self.role();
        format!("{}:{}:{}", self.account, kind, name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OidcProvider {
    pub service_id: String,
    #[serde(rename = "type", default)]
    pub provider_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub code_verifier: String,
    #[serde(default)]
    pub redirect_uri: String,
}

pub struct Client {
    config: Config,
    http: reqwest::Client,
    router: Router,
    session: Session,
    storage: Option<Arc<dyn CredentialStore>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

/// Everything a constructor needs before choosing an authenticator.
struct ClientParts {
    http: reqwest::Client,
    router: Router,
    storage: Option<Arc<dyn CredentialStore>>,
}

impl ClientParts {
    fn new(config: &Config) -> Result<Self, Error> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("strongroom-client/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            router: Router::new(config),
            storage: create_credential_store(config)?,
        })
    }

    /// Delegate handed to [`ApiKeyAuthenticator`]; captures the HTTP handle
    /// and router so the authenticator stays transport-agnostic.
    fn authenticate_fn(&self) -> AuthenticateFn {
        let http = self.http.clone();
        let router = self.router.clone();
        Arc::new(move |pair: LoginPair| {
            let http = http.clone();
            let router = router.clone();
            async move { authenticate_request(&http, &router, &pair).await }.boxed()
        })
    }

    fn assemble(
        self,
        config: Config,
        authenticator: Box<dyn Authenticator>,
        hydrate: bool,
    ) -> Client {
        let mut session = Session::new(authenticator);
        if let Some(storage) = &self.storage {
            session = session.with_storage(storage.clone());
        }
        if hydrate {
            session = session.with_store_hydration();
        }
        Client {
            config,
            http: self.http,
            router: self.router,
            session,
            storage: self.storage,
        }
    }
}

impl Client {
    /// Build a client with no credentials at all.
    ///
    /// Only the unauthenticated endpoints work: [`Client::login`],
    /// [`Client::authenticate`], and [`Client::list_oidc_providers`].
    /// Authenticated calls fail with [`Error::NotAuthenticated`]. This is
    /// the entry point for first-time login flows, before any API key
    /// exists.
    pub fn new(config: Config) -> Result<Self, Error> {
        let parts = ClientParts::new(&config)?;
        let authenticator = TokenAuthenticator::new(Vec::<u8>::new());
        Ok(parts.assemble(config, Box::new(authenticator), false))
    }

    /// Authenticate with a login and its API key.
    pub fn from_key(config: Config, login_pair: LoginPair) -> Result<Self, Error> {
        let parts = ClientParts::new(&config)?;
        let authenticator = ApiKeyAuthenticator::new(login_pair, parts.authenticate_fn());
        Ok(parts.assemble(config, Box::new(authenticator), false))
    }

    /// Use a pre-issued token obtained outside the client.
    pub fn from_token(config: Config, token: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let parts = ClientParts::new(&config)?;
        let authenticator = TokenAuthenticator::new(token);
        Ok(parts.assemble(config, Box::new(authenticator), false))
    }

    /// Read tokens from a file maintained by an external process.
    pub fn from_token_file(config: Config, path: impl Into<PathBuf>) -> Result<Self, Error> {
        let parts = ClientParts::new(&config)?;
        let authenticator = TokenFileAuthenticator::new(path);
        Ok(parts.assemble(config, Box::new(authenticator), false))
    }

    /// Serve tokens cached by a previous OIDC login.
    ///
    /// Uses the configured credential store; when storage is `none`, a
    /// process-local store backs the cache so [`Client::oidc_authenticate`]
    /// still works within the process.
    pub fn from_oidc(config: Config) -> Result<Self, Error> {
        let mut parts = ClientParts::new(&config)?;
        let storage: Arc<dyn CredentialStore> = match parts.storage.clone() {
            Some(storage) => storage,
            None => {
                let storage: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
                parts.storage = Some(storage.clone());
                storage
            }
        };
        let authenticator = OidcAuthenticator::new(storage);
        Ok(parts.assemble(config, Box::new(authenticator), true))
    }

    /// Build a client from the default config file and `STRONGROOM_*`
    /// environment variables.
    pub async fn from_environment() -> Result<Self, Error> {
        Self::from_environment_with(Config::load_default()?).await
    }

    /// [`Client::from_environment`] over an explicit config.
    ///
    /// Strategy order: token file, OIDC, login plus API key from
    /// `STRONGROOM_AUTHN_API_KEY`, then credentials stored by an earlier
    /// [`Client::login`].
    pub async fn from_environment_with(config: Config) -> Result<Self, Error> {
        if let Some(path) = config.authn_token_file.clone() {
            return Self::from_token_file(config, path);
        }
        if config.authn_type == AuthnType::Oidc {
            return Self::from_oidc(config);
        }
        let api_key = std::env::var("STRONGROOM_AUTHN_API_KEY").ok();
        if let (Some(login), Some(api_key)) = (config.login.clone(), api_key) {
            return Self::from_key(config, LoginPair::new(login, api_key));
        }
        if let Some(storage) = create_credential_store(&config)? {
            if let Ok(Some((login, api_key))) = storage.read_credentials().await {
                return Self::from_key(config, LoginPair { login, api_key });
            }
        }
        Err(Error::InvalidConfig(
            "no usable authentication strategy: set STRONGROOM_AUTHN_LOGIN and \
             STRONGROOM_AUTHN_API_KEY, configure a token file, or log in first"
                .to_string(),
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn account(&self) -> &str {
        self.router.account()
    }

    /// The current access token, refreshed first when needed.
    pub async fn get_valid_token(&self) -> Result<AccessToken, Error> {
        self.session.get_valid_token().await
    }

    /// Discard the current token's remaining lifetime and refresh now.
    pub async fn force_refresh(&self) -> Result<(), Error> {
        self.session.force_refresh().await
    }

    pub async fn needs_refresh(&self) -> bool {
        self.session.needs_refresh().await
    }

    pub async fn current_token(&self) -> Option<AccessToken> {
        self.session.current_token().await
    }

    async fn authorization(&self) -> Result<String, Error> {
        Ok(self.session.get_valid_token().await?.authorization_header())
    }

    /// One-shot authenticate call, bypassing the session.
    pub async fn authenticate(&self, login_pair: &LoginPair) -> Result<Vec<u8>, Error> {
        authenticate_request(&self.http, &self.router, login_pair).await
    }

    /// Exchange a password for the identity's API key.
    ///
    /// On success the credentials are stored best-effort, so later runs can
    /// pick them up without the password.
    pub async fn login(&self, login: &str, password: &SecretString) -> Result<Vec<u8>, Error> {
        let response = self
            .http
            .get(self.router.login_url())
            .basic_auth(login, Some(password.expose_secret()))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::AuthenticationRejected(
                ApiError::from_response(response).await?,
            ));
        }
        let api_key = response.bytes().await?.to_vec();

        if let Some(storage) = &self.storage {
            let secret = SecretString::from(String::from_utf8_lossy(&api_key).into_owned());
            if let Err(e) = storage.store_credentials(login, secret).await {
                warn!(error = %e, "failed to store credentials");
            }
        }
        Ok(api_key)
    }

    /// Fetch the value of a secret. `variable_id` may be bare, `kind:id`,
    /// or fully qualified.
    pub async fn retrieve_secret(&self, variable_id: &str) -> Result<Vec<u8>, Error> {
        let authorization = self.authorization().await?;
        let response = self
            .http
            .get(self.router.secret_url(variable_id))
            .header("Authorization", authorization)
            .send()
            .await?;
        data_response(response).await
    }

    /// Set the value of a secret.
    pub async fn add_secret(&self, variable_id: &str, secret_value: &str) -> Result<(), Error> {
        let authorization = self.authorization().await?;
        let response = self
            .http
            .post(self.router.secret_url(variable_id))
            .header("Authorization", authorization)
            .body(secret_value.to_owned())
            .send()
            .await?;
        data_response(response).await.map(drop)
    }

    /// Load policy text into the given policy branch.
    pub async fn load_policy(
        &self,
        mode: PolicyMode,
        policy_id: &str,
        policy: &str,
    ) -> Result<PolicyResponse, Error> {
        let authorization = self.authorization().await?;
        let url = self.router.policy_url(policy_id);
        let request = match mode {
            PolicyMode::Put => self.http.put(&url),
            PolicyMode::Post => self.http.post(&url),
            PolicyMode::Patch => self.http.patch(&url),
        };
        let response = request
            .header("Authorization", authorization)
            .body(policy.to_owned())
            .send()
            .await?;
        json_response(response).await
    }

    /// Rotate a role's API key, returning the new key.
    ///
    /// `role_id` must be fully qualified; the convenience wrappers qualify
    /// user and host names for you.
    pub async fn rotate_api_key(&self, role_id: &str) -> Result<Vec<u8>, Error> {
        let authorization = self.authorization().await?;
        let response = self
            .http
            .put(self.router.rotate_api_key_url(role_id))
            .header("Authorization", authorization)
            .send()
            .await?;
        data_response(response).await
    }

    pub async fn rotate_user_api_key(&self, user_id: &str) -> Result<Vec<u8>, Error> {
        self.rotate_api_key(&self.router.full_id("user", user_id))
            .await
    }

    pub async fn rotate_host_api_key(&self, host_id: &str) -> Result<Vec<u8>, Error> {
        self.rotate_api_key(&self.router.full_id("host", host_id))
            .await
    }

    /// Rotate the API key of whichever role the current token belongs to.
    pub async fn rotate_current_role_api_key(&self) -> Result<Vec<u8>, Error> {
        let identity = self.whoami().await?;
        self.rotate_api_key(&identity.role_id()).await
    }

    /// Change a user's password, proving the current one over basic auth.
    pub async fn change_user_password(
        &self,
        username: &str,
        password: &SecretString,
        new_password: &SecretString,
    ) -> Result<(), Error> {
        let response = self
            .http
            .put(self.router.password_url())
            .basic_auth(username, Some(password.expose_secret()))
            .body(new_password.expose_secret().to_owned())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::AuthenticationRejected(
                ApiError::from_response(response).await?,
            ));
        }
        Ok(())
    }

    /// Change the password of whichever user the current token belongs to.
    ///
    /// Host and other non-user roles carry API keys instead of passwords,
    /// so they are refused before any request is made.
    pub async fn change_current_user_password(
        &self,
        password: &SecretString,
        new_password: &SecretString,
    ) -> Result<(), Error> {
        let identity = self.whoami().await?;
        let (kind, name) = identity.role();
        if kind != "user" {
            return Err(Error::PasswordlessRole(kind.to_string()));
        }
        self.change_user_password(name, password, new_password)
            .await
    }

    /// Ask the service who the current token belongs to.
    pub async fn whoami(&self) -> Result<WhoamiResponse, Error> {
        let authorization = self.authorization().await?;
        let response = self
            .http
            .get(self.router.whoami_url())
            .header("Authorization", authorization)
            .send()
            .await?;
        json_response(response).await
    }

    /// Exchange an OIDC authorization code for an access token.
    ///
    /// The token is cached in the credential store best-effort so that
    /// OIDC sessions can refresh from it.
    pub async fn oidc_authenticate(
        &self,
        code: &str,
        nonce: &str,
        code_verifier: &str,
    ) -> Result<Vec<u8>, Error> {
        let service_id = self.config.service_id.as_deref().ok_or_else(|| {
            Error::InvalidConfig("service_id is required for oidc authentication".to_string())
        })?;
        let params = [
            ("code", code),
            ("nonce", nonce),
            ("code_verifier", code_verifier),
        ];
        let response = self
            .http
            .post(self.router.oidc_authenticate_url(service_id))
            .form(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::AuthenticationRejected(
                ApiError::from_response(response).await?,
            ));
        }
        let token = response.bytes().await?.to_vec();

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.store_authn_token(&token).await {
                warn!(error = %e, "failed to cache oidc token");
            }
        }
        Ok(token)
    }

    /// List the OIDC providers the service is configured with.
    pub async fn list_oidc_providers(&self) -> Result<Vec<OidcProvider>, Error> {
        let response = self
            .http
            .get(self.router.oidc_providers_url())
            .send()
            .await?;
        json_response(response).await
    }

    /// Remove everything the credential store holds for this client.
    ///
    /// Unlike other storage interactions, failures are surfaced.
    pub async fn purge_credentials(&self) -> Result<(), Error> {
        match &self.storage {
            Some(storage) => storage.purge_credentials().await,
            None => Ok(()),
        }
    }
}

pub(crate) async fn authenticate_request(
    http: &reqwest::Client,
    router: &Router,
    pair: &LoginPair,
) -> Result<Vec<u8>, Error> {
    let response = http
        .post(router.authenticate_url(&pair.login))
        .header("Content-Type", "text/plain")
        .body(pair.api_key.expose_secret().to_owned())
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(Error::AuthenticationRejected(
            ApiError::from_response(response).await?,
        ));
    }
    Ok(response.bytes().await?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            account: "cucumber".to_string(),
            service_url: "https://strongroom.example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn constructors_reject_invalid_config() {
        let err = Client::from_token(Config::default(), b"token".as_slice()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "got {err:?}");
    }

    #[test]
    fn from_key_builds_with_a_valid_config() {
        let client =
            Client::from_key(valid_config(), LoginPair::new("admin", "the-key")).unwrap();
        assert_eq!(client.account(), "cucumber");
    }

    #[tokio::test]
    async fn unauthenticated_client_cannot_mint_tokens() {
        let client = Client::new(valid_config()).unwrap();
        let err = client.get_valid_token().await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated), "got {err:?}");
    }

    #[tokio::test]
    async fn from_environment_with_requires_some_strategy() {
        let err = Client::from_environment_with(valid_config()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "got {err:?}");
    }

    #[test]
    fn whoami_usernames_split_into_roles() {
        let identity = WhoamiResponse {
            client_ip: String::new(),
            user_agent: String::new(),
            account: "cucumber".to_string(),
            username: "host/cd/gitlab-runner".to_string(),
            token_issued_at: Utc::now(),
        };
        assert_eq!(identity.role(), ("host", "cd/gitlab-runner"));
        assert_eq!(identity.role_id(), "cucumber:host:cd/gitlab-runner");

        let user = WhoamiResponse {
            username: "alice".to_string(),
            ..identity
        };
        assert_eq!(user.role(), ("user", "alice"));
        assert_eq!(user.role_id(), "cucumber:user:alice");
    }
}

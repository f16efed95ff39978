//! Session state: the current access token and when to refresh it.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::authn::Authenticator;
use crate::clock::{Clock, SystemClock};
use crate::credentials::CredentialStore;
use crate::error::Error;
use crate::token::AccessToken;

/// Owns the current token and serializes refreshes.
///
/// The slot's lock is held across the whole check-refresh-install sequence,
/// so concurrent callers that all observe a stale token produce a single
/// authenticator call; everyone else finds the fresh token once they
/// acquire the lock.
pub struct Session {
    authenticator: Box<dyn Authenticator>,
    storage: Option<Arc<dyn CredentialStore>>,
    token: Mutex<Option<AccessToken>>,
    clock: Arc<dyn Clock>,
    hydrate_from_store: bool,
}

impl Session {
    pub fn new(authenticator: Box<dyn Authenticator>) -> Self {
        Self {
            authenticator,
            storage: None,
            token: Mutex::new(None),
            clock: Arc::new(SystemClock),
            hydrate_from_store: false,
        }
    }

    /// Persist refreshed tokens to `storage`, best-effort.
    pub fn with_storage(mut self, storage: Arc<dyn CredentialStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Before each staleness check, adopt whatever token another process
    /// may have cached in storage.
    pub fn with_store_hydration(mut self) -> Self {
        self.hydrate_from_store = true;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The current token, refreshed first if missing or stale.
    pub async fn get_valid_token(&self) -> Result<AccessToken, Error> {
        let mut slot = self.token.lock().await;
        self.hydrate(&mut slot).await;
        if self.is_stale(slot.as_ref()) {
            self.refresh_into(&mut slot).await?;
        }
        slot.clone().ok_or(Error::NotAuthenticated)
    }

    /// Refresh unconditionally, even when the current token is fresh.
    pub async fn force_refresh(&self) -> Result<(), Error> {
        let mut slot = self.token.lock().await;
        self.refresh_into(&mut slot).await
    }

    /// Whether the next [`Self::get_valid_token`] would refresh. Read-only.
    pub async fn needs_refresh(&self) -> bool {
        let slot = self.token.lock().await;
        self.is_stale(slot.as_ref())
    }

    /// Read-only peek at the slot; never triggers a refresh.
    pub async fn current_token(&self) -> Option<AccessToken> {
        self.token.lock().await.clone()
    }

    fn is_stale(&self, token: Option<&AccessToken>) -> bool {
        match token {
            None => true,
            Some(token) => {
                token.should_refresh_at(self.clock.now())
                    || self.authenticator.needs_token_refresh()
            }
        }
    }

    async fn hydrate(&self, slot: &mut Option<AccessToken>) {
        if !self.hydrate_from_store {
            return;
        }
        let Some(storage) = &self.storage else { return };
        match storage.read_authn_token().await {
            Ok(Some(bytes)) => match AccessToken::parse(&bytes) {
                Ok(token) => {
                    debug!(subject = ?token.subject(), "adopted token from store");
                    *slot = Some(token);
                }
                Err(e) => debug!(error = %e, "ignoring corrupt token in store"),
            },
            Ok(None) => {}
            Err(e) => debug!(error = %e, "token store unreadable during hydration"),
        }
    }

    /// Refresh and install. On failure the slot keeps its previous value.
    async fn refresh_into(&self, slot: &mut Option<AccessToken>) -> Result<(), Error> {
        debug!("refreshing access token");
        let bytes = self.authenticator.refresh_token().await?;
        let token = AccessToken::parse(&bytes)?;

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.store_authn_token(&bytes).await {
                warn!(error = %e, "failed to cache access token");
            }
        }

        *slot = Some(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authn::TokenAuthenticator;
    use crate::clock::FixedClock;
    use crate::credentials::MemoryCredentialStore;
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use chrono::{Duration, Utc};
    use futures::future::join_all;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn token_bytes(iat: i64) -> Vec<u8> {
        let payload = BASE64.encode(format!(r#"{{"sub":"alice","iat":{iat}}}"#));
        format!(r#"{{"protected":"eyJh","payload":"{payload}","signature":"c2ln"}}"#).into_bytes()
    }

    /// Counts refreshes and hands out a token issued "now" each time.
    struct CountingAuthenticator {
        calls: Arc<AtomicUsize>,
        delay: std::time::Duration,
    }

    impl CountingAuthenticator {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: calls.clone(),
                    delay: std::time::Duration::ZERO,
                },
                calls,
            )
        }

        fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        async fn refresh_token(&self) -> Result<Vec<u8>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(token_bytes(Utc::now().timestamp()))
        }
    }

    struct FailingStore;

    #[async_trait]
    impl CredentialStore for FailingStore {
        async fn read_authn_token(&self) -> Result<Option<Vec<u8>>, Error> {
            Err(Error::StoreUnavailable("backend offline".to_string()))
        }

        async fn store_authn_token(&self, _token: &[u8]) -> Result<(), Error> {
            Err(Error::StoreUnavailable("backend offline".to_string()))
        }

        async fn read_credentials(&self) -> Result<Option<(String, SecretString)>, Error> {
            Err(Error::StoreUnavailable("backend offline".to_string()))
        }

        async fn store_credentials(
            &self,
            _login: &str,
            _api_key: SecretString,
        ) -> Result<(), Error> {
            Err(Error::StoreUnavailable("backend offline".to_string()))
        }

        async fn purge_credentials(&self) -> Result<(), Error> {
            Err(Error::StoreUnavailable("backend offline".to_string()))
        }
    }

    #[tokio::test]
    async fn first_call_refreshes_and_returns_a_fresh_token() {
        let (authn, calls) = CountingAuthenticator::new();
        let session = Session::new(Box::new(authn));

        let token = session.get_valid_token().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!token.should_refresh());
    }

    #[tokio::test]
    async fn fresh_token_is_reused_without_refreshing() {
        let (authn, calls) = CountingAuthenticator::new();
        let session = Session::new(Box::new(authn));

        let first = session.get_valid_token().await.unwrap();
        let second = session.get_valid_token().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.raw(), second.raw());
    }

    #[tokio::test]
    async fn stale_token_refreshes_again() {
        let (authn, calls) = CountingAuthenticator::new();
        // A clock far in the future makes every issued token look stale.
        let clock = FixedClock::new(Utc::now() + Duration::hours(1));
        let session = Session::new(Box::new(authn)).with_clock(Arc::new(clock));

        session.get_valid_token().await.unwrap();
        session.get_valid_token().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_single_refresh() {
        let (authn, calls) = CountingAuthenticator::new();
        let authn = authn.with_delay(std::time::Duration::from_millis(50));
        let session = Arc::new(Session::new(Box::new(authn)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move { session.get_valid_token().await })
            })
            .collect();

        for result in join_all(tasks).await {
            let token = result.unwrap().unwrap();
            assert!(!token.should_refresh());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_ignores_freshness() {
        let (authn, calls) = CountingAuthenticator::new();
        let session = Session::new(Box::new(authn));

        session.get_valid_token().await.unwrap();
        session.force_refresh().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!session.needs_refresh().await);
    }

    /// Succeeds once, then refuses.
    struct FlakyAuthenticator {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Authenticator for FlakyAuthenticator {
        async fn refresh_token(&self) -> Result<Vec<u8>, Error> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(token_bytes(Utc::now().timestamp()))
            } else {
                Err(Error::NotAuthenticated)
            }
        }
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_previous_token() {
        let session = Session::new(Box::new(FlakyAuthenticator {
            calls: Arc::new(AtomicUsize::new(0)),
        }));

        let before = session.get_valid_token().await.unwrap();
        let err = session.force_refresh().await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated), "got {err:?}");
        assert_eq!(session.current_token().await.unwrap().raw(), before.raw());
    }

    #[tokio::test]
    async fn store_write_failure_does_not_fail_the_refresh() {
        let (authn, calls) = CountingAuthenticator::new();
        let session = Session::new(Box::new(authn)).with_storage(Arc::new(FailingStore));

        let token = session.get_valid_token().await.unwrap();
        assert!(!token.should_refresh());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refreshed_tokens_are_persisted() {
        let (authn, _calls) = CountingAuthenticator::new();
        let store = Arc::new(MemoryCredentialStore::new());
        let session = Session::new(Box::new(authn)).with_storage(store.clone());

        let token = session.get_valid_token().await.unwrap();
        let cached = store.read_authn_token().await.unwrap().unwrap();
        assert_eq!(cached, token.raw());
    }

    #[tokio::test]
    async fn hydration_adopts_an_externally_stored_token() {
        let store = Arc::new(MemoryCredentialStore::new());
        let bytes = token_bytes(Utc::now().timestamp());
        store.store_authn_token(&bytes).await.unwrap();

        // An empty token authenticator errors if it is ever consulted, so
        // success proves the stored token was adopted instead.
        let session = Session::new(Box::new(TokenAuthenticator::new(Vec::<u8>::new())))
            .with_storage(store)
            .with_store_hydration();

        let token = session.get_valid_token().await.unwrap();
        assert_eq!(token.raw(), bytes.as_slice());
    }

    #[tokio::test]
    async fn hydration_ignores_corrupt_stored_bytes() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.store_authn_token(b"garbage").await.unwrap();

        let (authn, calls) = CountingAuthenticator::new();
        let session = Session::new(Box::new(authn))
            .with_storage(store)
            .with_store_hydration();

        session.get_valid_token().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn needs_refresh_reports_without_refreshing() {
        let (authn, calls) = CountingAuthenticator::new();
        let session = Session::new(Box::new(authn));

        assert!(session.needs_refresh().await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        session.get_valid_token().await.unwrap();
        assert!(!session.needs_refresh().await);
    }
}

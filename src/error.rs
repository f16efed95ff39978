//! Error types shared across the client.

use std::time::Duration;

use crate::response::ApiError;

/// Everything that can go wrong while obtaining, caching, or using an
/// access token, plus the transport and API failures of the REST surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Token bytes from the service or a cache failed structural parsing.
    #[error("malformed access token: {0}")]
    MalformedToken(String),

    /// The service refused the presented credentials.
    #[error("authentication rejected (HTTP {}): {}", .0.code, .0)]
    AuthenticationRejected(ApiError),

    /// The cached OIDC token is missing, unreadable, or stale. Silent
    /// refresh is impossible; an interactive login has to happen first.
    #[error("no valid cached token found, please login again")]
    ReauthenticationRequired,

    /// The authenticator has nothing to present.
    #[error("not authenticated: no token or credentials available")]
    NotAuthenticated,

    /// The credential store backend could not be read or written.
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    /// A bounded wait for authentication material ran out.
    #[error("timed out after {}s waiting for authentication", .waited.as_secs())]
    AuthenticationTimeout { waited: Duration },

    /// Only `user` roles have a password to change.
    #[error("password can only be changed for a 'user' role, got {0:?}")]
    PasswordlessRole(String),

    /// A non-authentication endpoint returned an error response.
    #[error(transparent)]
    Api(ApiError),

    /// Transport-level failure before any response body was usable.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status carried by this error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::AuthenticationRejected(e) | Error::Api(e) => Some(e.code),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ApiError;

    #[test]
    fn rejected_error_mentions_status_code() {
        let err = Error::AuthenticationRejected(ApiError::new(401, "Invalid credentials"));
        let msg = err.to_string();
        assert!(msg.contains("401"), "expected status in {msg:?}");
        assert!(msg.contains("Invalid credentials"));
    }

    #[test]
    fn status_extraction() {
        assert_eq!(
            Error::Api(ApiError::new(404, "not found")).status(),
            Some(404)
        );
        assert_eq!(Error::NotAuthenticated.status(), None);
    }
}

//! Access tokens issued by the Strongroom authentication endpoints.
//!
//! Tokens are short-lived signed JSON envelopes. The client never verifies
//! the signature; it only needs the issue time to decide when to refresh,
//! and the raw bytes to present on requests.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::error::Error;

/// Validity the service grants a token when the payload carries no `exp`.
pub const TOKEN_LIFETIME_SECS: i64 = 8 * 60;

/// How long before the deadline a token is considered due for refresh.
pub const REFRESH_MARGIN_SECS: i64 = 2 * 60;

#[derive(Debug, Deserialize)]
struct Envelope {
    protected: String,
    payload: String,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    iat: Option<f64>,
    exp: Option<f64>,
}

/// A parsed access token.
///
/// Immutable once constructed: the raw bytes are kept exactly as received
/// and all claims are extracted up front, so a value of this type is always
/// internally consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    raw: Vec<u8>,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    subject: Option<String>,
}

impl AccessToken {
    /// Parse raw token bytes, failing fast on any structural problem.
    pub fn parse(raw: &[u8]) -> Result<Self, Error> {
        let envelope: Envelope = serde_json::from_slice(raw)
            .map_err(|e| Error::MalformedToken(format!("not a token envelope: {e}")))?;
        if envelope.protected.is_empty()
            || envelope.payload.is_empty()
            || envelope.signature.is_empty()
        {
            return Err(Error::MalformedToken(
                "envelope field is empty".to_string(),
            ));
        }

        let payload = BASE64
            .decode(envelope.payload.as_bytes())
            .map_err(|e| Error::MalformedToken(format!("payload is not base64: {e}")))?;
        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|e| Error::MalformedToken(format!("payload is not JSON: {e}")))?;

        let iat = claims
            .iat
            .ok_or_else(|| Error::MalformedToken("payload is missing 'iat'".to_string()))?;
        let issued_at = timestamp(iat)?;
        let expires_at = claims.exp.map(timestamp).transpose()?;

        Ok(Self {
            raw: raw.to_vec(),
            issued_at,
            expires_at,
            subject: claims.sub,
        })
    }

    /// The exact bytes received from the service, unmodified.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Whether the token is due for refresh at the given instant.
    ///
    /// Pure function of the token and `now`: the deadline is the payload's
    /// `exp` when present, otherwise `issued_at` plus the assumed lifetime,
    /// and the token is due once `now` reaches the refresh margin before
    /// that deadline. Claims at the edge of the representable time range
    /// saturate the window arithmetic instead of overflowing.
    pub fn should_refresh_at(&self, now: DateTime<Utc>) -> bool {
        let deadline = self
            .expires_at
            .or_else(|| {
                self.issued_at
                    .checked_add_signed(chrono::Duration::seconds(TOKEN_LIFETIME_SECS))
            })
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let threshold = deadline
            .checked_sub_signed(chrono::Duration::seconds(REFRESH_MARGIN_SECS))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        now >= threshold
    }

    /// [`Self::should_refresh_at`] against the system clock.
    pub fn should_refresh(&self) -> bool {
        self.should_refresh_at(Utc::now())
    }

    /// Value for the `Authorization` header: `Token token="<base64>"`.
    ///
    /// Deterministic for a given token, so stamping a request twice
    /// produces the same header.
    pub fn authorization_header(&self) -> String {
        format!("Token token=\"{}\"", BASE64.encode(&self.raw))
    }
}

fn timestamp(epoch_secs: f64) -> Result<DateTime<Utc>, Error> {
    Utc.timestamp_opt(epoch_secs as i64, 0)
        .single()
        .ok_or_else(|| Error::MalformedToken(format!("timestamp {epoch_secs} out of range")))
}

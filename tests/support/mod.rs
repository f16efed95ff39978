use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use serde_json::json;
use strongroom::Config;

/// A syntactically valid access token claiming `iat` (epoch seconds) and
/// optionally `exp`. The signature is not checked client-side.
pub fn token_body(iat: i64, exp: Option<i64>) -> String {
    let mut claims = json!({"sub": "admin", "iat": iat});
    if let Some(exp) = exp {
        claims["exp"] = json!(exp);
    }
    json!({
        "protected": "eyJhbGciOiJzdHJvbmdyb29tL3YxIn0=",
        "payload": STANDARD.encode(claims.to_string()),
        "signature": "c2lnbmF0dXJl"
    })
    .to_string()
}

/// A token issued right now, fresh for the next six minutes.
pub fn fresh_token_body() -> String {
    token_body(Utc::now().timestamp(), None)
}

/// A token already past its refresh threshold.
pub fn stale_token_body() -> String {
    token_body(Utc::now().timestamp() - 600, None)
}

pub fn test_config(service_url: &str) -> Config {
    Config {
        account: "cucumber".to_string(),
        service_url: service_url.to_string(),
        ..Default::default()
    }
}

/// The header value the service expects for a given token body.
pub fn authorization_for(token_body: &str) -> String {
    format!("Token token=\"{}\"", STANDARD.encode(token_body))
}

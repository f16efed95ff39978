//! Response handling for the Strongroom HTTP API.

use std::fmt;

use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::Error;

/// Structured error payload the service attaches to non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetails {
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ApiErrorDetails,
}

/// An error response from the service.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code of the response.
    pub code: u16,

    /// Raw body text, kept when the body was not the structured shape.
    pub message: String,

    pub details: Option<ApiErrorDetails>,
}

impl ApiError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Parse the body of a non-2xx response, degrading gracefully:
    /// structured JSON error, then raw body text, then just the status.
    pub(crate) async fn from_response(response: Response) -> Result<Self, Error> {
        let code = response.status().as_u16();
        let body = response.bytes().await?;

        if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(&body) {
            return Ok(Self {
                code,
                message: String::new(),
                details: Some(parsed.error),
            });
        }

        let message = String::from_utf8_lossy(&body).trim().to_string();
        Ok(Self {
            code,
            message,
            details: None,
        })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.message.is_empty() {
            parts.push(self.message.as_str());
        }
        if let Some(details) = &self.details {
            if !details.message.is_empty() {
                parts.push(details.message.as_str());
            }
        }
        if parts.is_empty() {
            write!(f, "HTTP {}", self.code)
        } else {
            write!(f, "{}", parts.join(". "))
        }
    }
}

impl std::error::Error for ApiError {}

/// Body bytes of a successful response, or the parsed API error.
pub(crate) async fn data_response(response: Response) -> Result<Vec<u8>, Error> {
    if response.status().is_success() {
        Ok(response.bytes().await?.to_vec())
    } else {
        Err(Error::Api(ApiError::from_response(response).await?))
    }
}

/// Deserialized JSON body of a successful response, or the parsed API error.
pub(crate) async fn json_response<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(Error::Api(ApiError::from_response(response).await?))
    }
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

/// Which authentication strategy the client should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthnType {
    #[default]
    ApiKey,
    Token,
    Oidc,
}

impl std::str::FromStr for AuthnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api-key" => Ok(AuthnType::ApiKey),
            "token" => Ok(AuthnType::Token),
            "oidc" => Ok(AuthnType::Oidc),
            other => Err(Error::InvalidConfig(format!(
                "unknown authn type {other:?} (expected api-key, token, or oidc)"
            ))),
        }
    }
}

/// Which credential store backend to use, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStorage {
    File,
    #[default]
    None,
}

impl std::str::FromStr for CredentialStorage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(CredentialStorage::File),
            "none" => Ok(CredentialStorage::None),
            other => Err(Error::InvalidConfig(format!(
                "unknown credential storage {other:?} (expected file or none)"
            ))),
        }
    }
}

/// Client configuration.
///
/// The API key itself is deliberately not part of this struct; it reaches
/// the client through `STRONGROOM_AUTHN_API_KEY` or an explicit
/// [`LoginPair`](crate::authn::LoginPair) and stays wrapped in a
/// `SecretString` for its whole lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Organization account on the service. Required.
    pub account: String,

    /// Base URL of the service, e.g. `https://strongroom.example.com`. Required.
    pub service_url: String,

    /// Identity to authenticate as (e.g. `admin`, `host/app-1`).
    pub login: Option<String>,

    pub authn_type: AuthnType,

    /// OIDC provider service id, required when `authn_type` is `oidc`.
    pub service_id: Option<String>,

    /// Path to a token file maintained by an external process.
    pub authn_token_file: Option<PathBuf>,

    pub credential_storage: CredentialStorage,

    /// Override for the file backend's location.
    pub credentials_path: Option<PathBuf>,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            Error::InvalidConfig(format!("failed to parse {}: {e}", path.display()))
        })?;
        Ok(config)
    }

    /// Load config from a file, or return the default if it doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self, Error> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load the default config file and apply environment overrides.
    pub fn load_default() -> Result<Self, Error> {
        let path = match std::env::var("STRONGROOM_CONFIG") {
            Ok(p) => PathBuf::from(p),
            Err(_) => default_config_path(),
        };
        let mut config = Self::load_or_default(&path)?;
        config.merge_env();
        Ok(config)
    }

    /// Apply `STRONGROOM_*` environment variables on top of this config.
    pub fn merge_env(&mut self) {
        self.merge_env_from(|name| std::env::var(name).ok());
    }

    fn merge_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("STRONGROOM_ACCOUNT") {
            self.account = v;
        }
        if let Some(v) = get("STRONGROOM_SERVICE_URL") {
            self.service_url = v;
        }
        if let Some(v) = get("STRONGROOM_AUTHN_LOGIN") {
            self.login = Some(v);
        }
        if let Some(v) = get("STRONGROOM_AUTHN_TYPE") {
            match v.parse() {
                Ok(t) => self.authn_type = t,
                Err(e) => warn!(error = %e, "ignoring STRONGROOM_AUTHN_TYPE"),
            }
        }
        if let Some(v) = get("STRONGROOM_SERVICE_ID") {
            self.service_id = Some(v);
        }
        if let Some(v) = get("STRONGROOM_AUTHN_TOKEN_FILE") {
            self.authn_token_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("STRONGROOM_CREDENTIAL_STORAGE") {
            match v.parse() {
                Ok(s) => self.credential_storage = s,
                Err(e) => warn!(error = %e, "ignoring STRONGROOM_CREDENTIAL_STORAGE"),
            }
        }
        if let Some(v) = get("STRONGROOM_CREDENTIALS_PATH") {
            self.credentials_path = Some(PathBuf::from(v));
        }
    }

    /// Check that the config is usable, reporting every problem at once.
    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            ("account", self.account.as_str()),
            ("service_url", self.service_url.as_str()),
        ];
        let mut problems: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| format!("{name} is required"))
            .collect();

        if !self.service_url.is_empty() {
            if let Err(e) = reqwest::Url::parse(&self.service_url) {
                problems.push(format!("service_url is not a valid URL: {e}"));
            }
        }
        if self.authn_type == AuthnType::Oidc && self.service_id.is_none() {
            problems.push("service_id is required for oidc authentication".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfig(problems.join("; ")))
        }
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./strongroom.toml` if it exists in the current directory
/// 2. `~/.config/strongroom/strongroom.toml`
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("strongroom.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("strongroom").join("strongroom.toml");
    }

    local_config
}

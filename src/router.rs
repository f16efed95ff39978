//! URL construction for the Strongroom HTTP API.
//!
//! Resource identifiers are normalized to their fully qualified
//! `account:kind:identifier` form before they are placed in a path, and
//! identifier segments are percent-encoded. The account inside a fully
//! qualified id wins over the configured one, so a mismatched id fails on
//! the server rather than being silently rewritten here.

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct Router {
    base_url: String,
    account: String,
}

impl Router {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.service_url.trim_end_matches('/').to_string(),
            account: config.account.clone(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Qualify `id` as `account:kind:identifier`.
    ///
    /// A bare identifier gains the configured account and the given kind; a
    /// `kind:identifier` pair gains the account; a fully qualified id passes
    /// through untouched.
    pub fn full_id(&self, kind: &str, id: &str) -> String {
        let parts: Vec<&str> = id.splitn(3, ':').collect();
        match parts.as_slice() {
            [identifier] => format!("{}:{}:{}", self.account, kind, identifier),
            [given_kind, identifier] => format!("{}:{}:{}", self.account, given_kind, identifier),
            _ => id.to_string(),
        }
    }

    pub fn authenticate_url(&self, login: &str) -> String {
        format!(
            "{}/authn/{}/{}/authenticate",
            self.base_url,
            self.account,
            urlencoding::encode(login)
        )
    }

    pub fn login_url(&self) -> String {
        format!("{}/authn/{}/login", self.base_url, self.account)
    }

    pub fn password_url(&self) -> String {
        format!("{}/authn/{}/password", self.base_url, self.account)
    }

    pub fn oidc_authenticate_url(&self, service_id: &str) -> String {
        format!(
            "{}/authn-oidc/{}/{}/authenticate",
            self.base_url,
            urlencoding::encode(service_id),
            self.account
        )
    }

    pub fn oidc_providers_url(&self) -> String {
        format!("{}/authn-oidc/{}/providers", self.base_url, self.account)
    }

    pub fn secret_url(&self, variable_id: &str) -> String {
        let full_id = self.full_id("variable", variable_id);
        let (account, kind, identifier) = split_full_id(&full_id);
        format!(
            "{}/secrets/{}/{}/{}",
            self.base_url,
            account,
            kind,
            urlencoding::encode(identifier)
        )
    }

    pub fn policy_url(&self, policy_id: &str) -> String {
        let full_id = self.full_id("policy", policy_id);
        let (account, kind, identifier) = split_full_id(&full_id);
        format!(
            "{}/policies/{}/{}/{}",
            self.base_url,
            account,
            kind,
            urlencoding::encode(identifier)
        )
    }

    /// `role_id` must already be fully qualified; see [`Self::full_id`].
    pub fn rotate_api_key_url(&self, role_id: &str) -> String {
        format!(
            "{}/authn/{}/api_key?role={}",
            self.base_url,
            self.account,
            urlencoding::encode(role_id)
        )
    }

    pub fn whoami_url(&self) -> String {
        format!("{}/whoami", self.base_url)
    }
}

fn split_full_id(full_id: &str) -> (&str, &str, &str) {
    let mut parts = full_id.splitn(3, ':');
    let account = parts.next().unwrap_or_default();
    let kind = parts.next().unwrap_or_default();
    let identifier = parts.next().unwrap_or_default();
    (account, kind, identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new(&Config {
            account: "cucumber".to_string(),
            service_url: "https://strongroom.example.com/".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn trailing_slash_is_trimmed_from_the_base() {
        assert_eq!(
            router().whoami_url(),
            "https://strongroom.example.com/whoami"
        );
    }

    #[test]
    fn authenticate_url_escapes_the_login() {
        assert_eq!(
            router().authenticate_url("host/app-1"),
            "https://strongroom.example.com/authn/cucumber/host%2Fapp-1/authenticate"
        );
    }

    #[test]
    fn bare_identifier_gains_account_and_kind() {
        assert_eq!(
            router().secret_url("db-password"),
            "https://strongroom.example.com/secrets/cucumber/variable/db-password"
        );
    }

    #[test]
    fn identifier_segment_is_percent_encoded() {
        assert_eq!(
            router().secret_url("prod/db/password"),
            "https://strongroom.example.com/secrets/cucumber/variable/prod%2Fdb%2Fpassword"
        );
    }

    #[test]
    fn two_part_identifier_keeps_its_kind() {
        assert_eq!(
            router().secret_url("public-key:alice"),
            "https://strongroom.example.com/secrets/cucumber/public-key/alice"
        );
    }

    #[test]
    fn fully_qualified_identifier_passes_through() {
        // Wrong account flows to the server and fails there.
        assert_eq!(
            router().secret_url("foobar:variable:db-password"),
            "https://strongroom.example.com/secrets/foobar/variable/db-password"
        );
    }

    #[test]
    fn identifier_may_itself_contain_colons() {
        assert_eq!(
            router().full_id("variable", "cucumber:variable:a:b"),
            "cucumber:variable:a:b"
        );
        assert_eq!(
            router().secret_url("cucumber:variable:a:b"),
            "https://strongroom.example.com/secrets/cucumber/variable/a%3Ab"
        );
    }

    #[test]
    fn policy_url_uses_the_policies_prefix() {
        assert_eq!(
            router().policy_url("root"),
            "https://strongroom.example.com/policies/cucumber/policy/root"
        );
    }

    #[test]
    fn password_url_is_account_scoped() {
        assert_eq!(
            router().password_url(),
            "https://strongroom.example.com/authn/cucumber/password"
        );
    }

    #[test]
    fn rotate_url_escapes_the_role_query() {
        let router = router();
        let role = router.full_id("user", "alice");
        assert_eq!(
            router.rotate_api_key_url(&role),
            "https://strongroom.example.com/authn/cucumber/api_key?role=cucumber%3Auser%3Aalice"
        );
    }

    #[test]
    fn oidc_urls_scope_by_service_and_account() {
        assert_eq!(
            router().oidc_authenticate_url("keycloak"),
            "https://strongroom.example.com/authn-oidc/keycloak/cucumber/authenticate"
        );
        assert_eq!(
            router().oidc_providers_url(),
            "https://strongroom.example.com/authn-oidc/cucumber/providers"
        );
    }
}

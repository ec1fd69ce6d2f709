//! Globus identity provider.
//!
//! Implements the three-call Globus flow: authcode → access token, token
//! introspection for the primary identity, and an optional secondary-identity
//! fetch for the rest of the account's identity set.

use std::collections::{BTreeSet, HashSet};

use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::AuthError;
use crate::identity::{IdentityProvider, IdentityProviderConfig};
use crate::types::{RemoteIdentity, RemoteIdentityDetails, RemoteIdentityId};

const PROVIDER_NAME: &str = "Globus";
const SCOPE: &str = "urn:globus:auth:scope:auth.globus.org:view_identities email";

const AUTHORIZE_PATH: &str = "/v2/oauth2/authorize";
const TOKEN_PATH: &str = "/v2/oauth2/token";
const INTROSPECT_PATH: &str = "/v2/oauth2/token/introspect";
const IDENTITIES_PATH: &str = "/v2/api/identities";

/// Config key that suppresses the secondary-identity fetch.
const IGNORE_SECONDARY_KEY: &str = "ignore-secondary-identities";

pub struct GlobusIdentityProvider {
    config: IdentityProviderConfig,
    client: reqwest::Client,
    ignore_secondaries: bool,
}

impl GlobusIdentityProvider {
    /// # Errors
    /// `IllegalParameter` if the config is not for this provider.
    pub fn new(config: IdentityProviderConfig) -> Result<Self, AuthError> {
        if config.name() != PROVIDER_NAME {
            return Err(AuthError::IllegalParameter(format!(
                "Bad config name: {}",
                config.name()
            )));
        }
        let ignore_secondaries = config
            .custom()
            .get(IGNORE_SECONDARY_KEY)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        Ok(Self {
            config,
            client: reqwest::Client::new(),
            ignore_secondaries,
        })
    }

    fn api_endpoint(&self, path: &str) -> Url {
        let mut url = self.config.api_url().clone();
        url.set_path(path);
        url
    }

    fn retrieval_error(&self, message: &str) -> AuthError {
        AuthError::IdentityRetrieval(format!("{message} {PROVIDER_NAME}"))
    }

    async fn get_access_token(&self, authcode: &str, link: bool) -> Result<String, AuthError> {
        let redirect = if link {
            self.config.link_redirect_url()
        } else {
            self.config.login_redirect_url()
        };
        let response = self
            .client
            .post(self.api_endpoint(TOKEN_PATH))
            .header(ACCEPT, "application/json")
            .basic_auth(self.config.client_id(), Some(self.config.client_secret()))
            .form(&[
                ("code", authcode),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                AuthError::IdentityRetrieval(format!("Failed to contact {PROVIDER_NAME}: {e}"))
            })?;
        let body = check_json(response, PROVIDER_NAME).await?;
        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| self.retrieval_error("No access token was returned by"))?;
        Ok(token.to_string())
    }

    /// Introspect the access token, returning the primary identity and the
    /// ids of any secondary identities.
    async fn introspect(
        &self,
        access_token: &str,
    ) -> Result<(RemoteIdentity, BTreeSet<String>), AuthError> {
        let response = self
            .client
            .post(self.api_endpoint(INTROSPECT_PATH))
            .header(ACCEPT, "application/json")
            .basic_auth(self.config.client_id(), Some(self.config.client_secret()))
            .form(&[("include", "identities_set"), ("token", access_token)])
            .send()
            .await
            .map_err(|e| {
                AuthError::IdentityRetrieval(format!("Failed to contact {PROVIDER_NAME}: {e}"))
            })?;
        let body = check_json(response, PROVIDER_NAME).await?;

        if !audience_contains(&body, self.config.client_id()) {
            return Err(AuthError::IdentityRetrieval(format!(
                "The audience returned by {PROVIDER_NAME} does not include this client"
            )));
        }

        let sub = body
            .get("sub")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| self.retrieval_error("No identity id was returned by"))?;
        let primary = RemoteIdentity::new(
            RemoteIdentityId::new(PROVIDER_NAME, sub)?,
            RemoteIdentityDetails::new(
                body.get("username").and_then(Value::as_str),
                body.get("name").and_then(Value::as_str),
                body.get("email").and_then(Value::as_str),
            ),
        );

        let secondary_ids = body
            .get("identities_set")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .filter(|id| *id != sub)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok((primary, secondary_ids))
    }

    async fn get_secondary_identities(
        &self,
        access_token: &str,
        ids: &BTreeSet<String>,
    ) -> Result<Vec<RemoteIdentity>, AuthError> {
        let joined = ids.iter().cloned().collect::<Vec<_>>().join(",");
        let mut url = self.api_endpoint(IDENTITIES_PATH);
        url.query_pairs_mut().append_pair("ids", &joined);
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                AuthError::IdentityRetrieval(format!("Failed to contact {PROVIDER_NAME}: {e}"))
            })?;
        let body = check_json(response, PROVIDER_NAME).await?;

        let identities = body
            .get("identities")
            .and_then(Value::as_array)
            .ok_or_else(|| self.retrieval_error("No identities were returned by"))?;
        identities
            .iter()
            .map(|ident| {
                let id = ident
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| self.retrieval_error("An identity id is missing from"))?;
                Ok(RemoteIdentity::new(
                    RemoteIdentityId::new(PROVIDER_NAME, id)?,
                    RemoteIdentityDetails::new(
                        ident.get("username").and_then(Value::as_str),
                        ident.get("name").and_then(Value::as_str),
                        ident.get("email").and_then(Value::as_str),
                    ),
                ))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl IdentityProvider for GlobusIdentityProvider {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn image_uri(&self) -> &str {
        self.config.image_uri()
    }

    fn login_url(&self, state: &str, link: bool) -> Url {
        let redirect = if link {
            self.config.link_redirect_url()
        } else {
            self.config.login_redirect_url()
        };
        let mut url = self.config.login_url().clone();
        url.set_path(AUTHORIZE_PATH);
        url.query_pairs_mut()
            .append_pair("scope", SCOPE)
            .append_pair("state", state)
            .append_pair("redirect_uri", redirect.as_str())
            .append_pair("response_type", "code")
            .append_pair("client_id", self.config.client_id());
        url
    }

    async fn get_identities(
        &self,
        authcode: &str,
        link: bool,
    ) -> Result<HashSet<RemoteIdentity>, AuthError> {
        let authcode = authcode.trim();
        if authcode.is_empty() {
            return Err(AuthError::IllegalParameter(
                "authcode cannot be null or empty".to_string(),
            ));
        }
        let access_token = self.get_access_token(authcode, link).await?;
        let (primary, secondary_ids) = self.introspect(&access_token).await?;

        let mut identities = HashSet::from([primary]);
        if !secondary_ids.is_empty() && !self.ignore_secondaries {
            identities.extend(
                self.get_secondary_identities(&access_token, &secondary_ids)
                    .await?,
            );
        } else if !secondary_ids.is_empty() {
            debug!(count = secondary_ids.len(), "skipping secondary identities");
        }
        Ok(identities)
    }
}

/// Reject non-2xx responses and parse the body as JSON.
async fn check_json(response: reqwest::Response, provider: &str) -> Result<Value, AuthError> {
    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::IdentityRetrieval(format!(
            "{provider} returned an error: HTTP {status}"
        )));
    }
    response.json().await.map_err(|_| {
        AuthError::IdentityRetrieval(format!("Unable to parse response from {provider}"))
    })
}

fn audience_contains(body: &Value, client_id: &str) -> bool {
    match body.get("aud") {
        Some(Value::Array(auds)) => auds
            .iter()
            .filter_map(Value::as_str)
            .any(|aud| aud == client_id),
        Some(Value::String(aud)) => aud == client_id,
        _ => false,
    }
}

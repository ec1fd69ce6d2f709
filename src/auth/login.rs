//! The OAuth2 login state machine.
//!
//! `login` is called on redirect back from a provider, with no UI in control
//! of the flow. When the login cannot complete immediately (multiple
//! candidate accounts, unlinked identities, disabled login) the identity
//! set is parked under a temporary token and every recoverable error is
//! deferred until the UI retrieves the login state and continues the flow.

use std::collections::HashSet;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::auth::{Authentication, require_nonblank};
use crate::crypto;
use crate::error::AuthError;
use crate::storage::TemporaryIdentities;
use crate::types::{
    AuthUser, DisplayName, EmailAddress, IncomingToken, LinkedIdentity, NewToken, NewUser,
    RemoteIdentity, TemporaryToken, UserName, UserSearchSpec,
};

const LOGIN_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// The result of the provider leg of a login: either a completed login or a
/// temporary token for the account-choice continuation.
#[derive(Debug)]
pub enum LoginToken {
    LoggedIn(NewToken),
    Deferred(TemporaryToken),
}

/// The state of a deferred login, as presented to the account-choice UI.
#[derive(Debug)]
pub struct LoginState {
    provider: String,
    login_allowed: bool,
    /// Identities already linked to an account, with that account.
    linked: Vec<(AuthUser, LinkedIdentity)>,
    /// Identities with no account, available for account creation.
    unlinked: Vec<LinkedIdentity>,
}

impl LoginState {
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn login_allowed(&self) -> bool {
        self.login_allowed
    }

    #[must_use]
    pub fn linked(&self) -> &[(AuthUser, LinkedIdentity)] {
        &self.linked
    }

    #[must_use]
    pub fn unlinked(&self) -> &[LinkedIdentity] {
        &self.unlinked
    }
}

impl Authentication {
    /// Continue a login after redirection from an identity provider.
    ///
    /// Completes immediately when the identities map to exactly one
    /// enabled account and login is allowed for it; otherwise parks the
    /// identity set under a 30-minute temporary token.
    ///
    /// # Errors
    /// `NoSuchProvider` for unknown/disabled providers, `MissingParameter`
    /// for a blank authcode, `IdentityRetrieval` for provider failures.
    pub async fn login(&self, provider: &str, authcode: &str) -> Result<LoginToken, AuthError> {
        let idp = self.identity_provider(provider).await?;
        let authcode = require_nonblank(authcode, "authorization code")?;
        let identities = idp.get_identities(authcode, false).await?;

        // Track distinct account names rather than user values; roles or
        // other state could change between storage reads.
        let mut names = HashSet::new();
        let mut last_user = None;
        let mut linked = Vec::new();
        let mut unlinked = Vec::new();
        for identity in identities {
            match self.storage().get_user_by_identity(&identity).await? {
                Some(user) => {
                    let stored = user.identity_for(&identity).cloned().ok_or_else(|| {
                        AuthError::Internal(format!(
                            "user {} lost identity between lookups",
                            user.user_name()
                        ))
                    })?;
                    names.insert(user.user_name().clone());
                    linked.push(stored);
                    last_user = Some(user);
                }
                None => unlinked.push(identity),
            }
        }

        if let Some(user) = last_user
            && names.len() == 1
            && unlinked.is_empty()
        {
            // Deferral instead of an error on policy failures: the UI is not
            // in control yet, so recoverable errors surface from
            // get_login_state/complete_login instead.
            let allowed = self.cfg().app_config().await?.login_allowed() || user.is_admin();
            if allowed && !user.is_disabled() {
                return Ok(LoginToken::LoggedIn(
                    self.issue_login_token(user.user_name()).await?,
                ));
            }
        }
        let token = self
            .store_identities_temporarily(unlinked, linked, LOGIN_TOKEN_LIFETIME)
            .await?;
        Ok(LoginToken::Deferred(token))
    }

    pub(crate) async fn store_identities_temporarily(
        &self,
        unlinked: Vec<RemoteIdentity>,
        linked: Vec<LinkedIdentity>,
        lifetime: Duration,
    ) -> Result<TemporaryToken, AuthError> {
        let mut identities: Vec<LinkedIdentity> =
            unlinked.into_iter().map(RemoteIdentity::with_new_id).collect();
        identities.extend(linked);
        let token = TemporaryToken::new(crypto::generate_token()?, lifetime);
        self.storage()
            .store_temporary_identities(TemporaryIdentities {
                token_hash: token.hash(),
                id: token.id(),
                identities,
                expires: token.expires(),
            })
            .await?;
        Ok(token)
    }

    /// The state of a deferred login, classifying each stored identity as
    /// linked to an account or available for account creation.
    ///
    /// # Errors
    /// `InvalidToken` for an unknown or expired temporary token.
    pub async fn get_login_state(&self, token: &IncomingToken) -> Result<LoginState, AuthError> {
        let identities = self.temporary_identities(token).await?;
        let Some(first) = identities.first() else {
            return Err(AuthError::Internal(
                "temporary login token stored with no identities".to_string(),
            ));
        };
        let provider = first.remote_id().provider().to_string();
        let login_allowed = self.cfg().app_config().await?.login_allowed();
        let mut linked = Vec::new();
        let mut unlinked = Vec::new();
        for identity in identities {
            match self
                .storage()
                .get_user_by_identity(identity.identity())
                .await?
            {
                // Keep the stored identity (not the user's copy): if the
                // identity was linked concurrently its local id changed, and
                // later temporary-token lookups go by the stored id.
                Some(user) => linked.push((user, identity)),
                None => unlinked.push(identity),
            }
        }
        Ok(LoginState {
            provider,
            login_allowed,
            linked,
            unlinked,
        })
    }

    async fn temporary_identities(
        &self,
        token: &IncomingToken,
    ) -> Result<Vec<LinkedIdentity>, AuthError> {
        match self.storage().get_temporary_identities(&token.hash()).await {
            Ok(identities) => Ok(identities),
            Err(AuthError::NoSuchToken) => Err(AuthError::InvalidToken),
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn identity_from_token(
        &self,
        token: &IncomingToken,
        identity_id: Uuid,
    ) -> Result<Option<LinkedIdentity>, AuthError> {
        let identities = self.temporary_identities(token).await?;
        Ok(identities.into_iter().find(|i| i.local_id() == identity_id))
    }

    /// Create a new account linked to one of the identities parked under a
    /// temporary login token, and log in as it.
    ///
    /// # Errors
    /// `Unauthorized` when account creation is disabled, for the root name,
    /// or when the identity id is not in the token's set; `UserExists` and
    /// `IdentityLinked` on storage conflicts.
    pub async fn create_user(
        &self,
        token: &IncomingToken,
        identity_id: Uuid,
        user_name: &UserName,
        display_name: &DisplayName,
        email: &EmailAddress,
    ) -> Result<NewToken, AuthError> {
        if !self.cfg().app_config().await?.login_allowed() {
            return Err(AuthError::Unauthorized(
                "Account creation is disabled".to_string(),
            ));
        }
        if user_name.is_root() {
            return Err(AuthError::Unauthorized("Cannot create ROOT user".to_string()));
        }
        let Some(identity) = self.identity_from_token(token, identity_id).await? else {
            return Err(AuthError::Unauthorized(format!(
                "Not authorized to create user with remote identity {identity_id}"
            )));
        };
        self.storage()
            .create_user(NewUser {
                user_name: user_name.clone(),
                email: email.clone(),
                display_name: display_name.clone(),
                identity,
                last_login: None,
            })
            .await?;
        info!(user = %user_name, "created user from login flow");
        self.issue_login_token(user_name).await
    }

    /// Complete a deferred login against one of the identities parked under
    /// a temporary login token.
    ///
    /// # Errors
    /// `Unauthorized` when the identity id is not in the token's set or
    /// non-admin login is disabled, `Authentication` when no account is
    /// linked to the identity, `Disabled` for disabled accounts.
    pub async fn complete_login(
        &self,
        token: &IncomingToken,
        identity_id: Uuid,
    ) -> Result<NewToken, AuthError> {
        let Some(identity) = self.identity_from_token(token, identity_id).await? else {
            return Err(AuthError::Unauthorized(format!(
                "Not authorized to login to user with remote identity {identity_id}"
            )));
        };
        let Some(user) = self
            .storage()
            .get_user_by_identity(identity.identity())
            .await?
        else {
            // An account that was never created; curl can get here even if
            // the UI cannot.
            return Err(AuthError::Authentication(
                "There is no account linked to the provided identity ID".to_string(),
            ));
        };
        if !self.cfg().app_config().await?.login_allowed() && !user.is_admin() {
            return Err(AuthError::Unauthorized(
                "Non-admin login is disabled".to_string(),
            ));
        }
        if user.is_disabled() {
            return Err(AuthError::Disabled("This account is disabled".to_string()));
        }
        self.issue_login_token(user.user_name()).await
    }

    /// Suggest an available user name near a raw suggestion, appending or
    /// bumping a numeric suffix as needed. Returns `None` only when no
    /// reasonable name fits the length limit.
    pub async fn available_user_name(
        &self,
        suggestion: &str,
    ) -> Result<Option<UserName>, AuthError> {
        let suggestion = match UserName::sanitize(suggestion) {
            Some(name) => name,
            None => UserName::new("user").map_err(|e| AuthError::Internal(e.to_string()))?,
        };
        self.find_available_user_name(&suggestion).await
    }

    async fn find_available_user_name(
        &self,
        suggestion: &UserName,
    ) -> Result<Option<UserName>, AuthError> {
        let name = suggestion.name();
        let stripped = name.trim_end_matches(|c: char| c.is_ascii_digit());
        let spec = UserSearchSpec::builder()
            .with_search_regex(&format!("^{}\\d*$", regex::escape(stripped)))
            .with_search_on_user_name(true)
            .build();
        let existing = self
            .storage()
            .search_user_display_names(&spec, None, true)
            .await?;

        let mut taken = false;
        let mut largest: u64 = 0;
        for existing_name in existing.keys() {
            taken = taken || existing_name.name() == name;
            let suffix = &existing_name.name()[stripped.len()..];
            // An empty suffix occupies slot 1 (the bare name).
            let n = if suffix.is_empty() {
                1
            } else {
                suffix.parse().unwrap_or(0)
            };
            largest = largest.max(n);
        }

        // The suggestion is free to use as long as it's not taken and no
        // digits were stripped; otherwise bump past the largest suffix.
        let stripped_digits = stripped.len() != name.len();
        let new_name = if !taken && !stripped_digits {
            name.to_string()
        } else {
            format!("{stripped}{}", largest + 1)
        };
        if new_name.len() > UserName::MAX_LEN {
            return Ok(None);
        }
        let user_name = UserName::new(&new_name)
            .map_err(|e| AuthError::Internal(format!("generated an invalid user name: {e}")))?;
        Ok(Some(user_name))
    }

    /// Import a user from an external service without credentials, linking
    /// it to the given remote identity. Unusable identity details fall back
    /// to placeholder values.
    ///
    /// Not for exposure in public APIs.
    ///
    /// # Errors
    /// `UserExists` and `IdentityLinked` on conflicts.
    pub async fn import_user(
        &self,
        user_name: &UserName,
        identity: RemoteIdentity,
    ) -> Result<(), AuthError> {
        let display_name = match identity
            .details()
            .full_name()
            .and_then(|n| DisplayName::new(n).ok())
        {
            Some(name) => name,
            None => DisplayName::new("unknown").map_err(|e| AuthError::Internal(e.to_string()))?,
        };
        let email = identity
            .details()
            .email()
            .and_then(|e| EmailAddress::new(e).ok())
            .unwrap_or(EmailAddress::Unknown);
        self.storage()
            .create_user(NewUser {
                user_name: user_name.clone(),
                email,
                display_name,
                identity: identity.with_new_id(),
                last_login: None,
            })
            .await?;
        info!(user = %user_name, "imported user");
        Ok(())
    }
}

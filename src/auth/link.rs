//! The OAuth2 link state machine.
//!
//! Links additional remote identities to an existing standard account. Like
//! login, the provider leg runs on a browser redirect, so anything that
//! cannot complete immediately is parked under a short temporary token and
//! surfaced once the UI is back in control, including the empty candidate
//! set, so the UI can tell the user everything was already linked.

use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::auth::{Authentication, require_nonblank};
use crate::error::AuthError;
use crate::types::{
    AuthUser, IncomingToken, LinkedIdentity, RemoteIdentity, TemporaryToken,
};

const LINK_TOKEN_LIFETIME: Duration = Duration::from_secs(10 * 60);

/// The result of the provider leg of a link: completed, or deferred to the
/// identity-choice continuation.
#[derive(Debug)]
pub enum LinkToken {
    Linked,
    Deferred(TemporaryToken),
}

/// The state of a deferred link: the user and the identities available to
/// link.
#[derive(Debug)]
pub struct LinkIdentities {
    user: AuthUser,
    identities: Vec<LinkedIdentity>,
}

impl LinkIdentities {
    #[must_use]
    pub fn user(&self) -> &AuthUser {
        &self.user
    }

    #[must_use]
    pub fn identities(&self) -> &[LinkedIdentity] {
        &self.identities
    }
}

impl Authentication {
    /// Continue a link flow after redirection from an identity provider.
    /// Links immediately when exactly one unlinked candidate remains and the
    /// provider is not configured to force a choice.
    ///
    /// # Errors
    /// `LinkFailed` for local accounts, `NoSuchProvider`,
    /// `MissingParameter`, and `IdentityRetrieval` as in login.
    pub async fn link(
        &self,
        token: &IncomingToken,
        provider: &str,
        authcode: &str,
    ) -> Result<LinkToken, AuthError> {
        let user = self.get_user(token).await?;
        if user.is_local() {
            // The UI never offers linking to local accounts.
            return Err(AuthError::LinkFailed(
                "Cannot link identities to local accounts".to_string(),
            ));
        }
        let idp = self.identity_provider(provider).await?;
        let authcode = require_nonblank(authcode, "authorization code")?;
        let identities = idp.get_identities(authcode, true).await?;
        let candidates = self.filter_link_candidates(identities).await?;

        let force_choice = self
            .cfg()
            .app_config()
            .await?
            .provider_config(provider)
            .force_link_choice;
        if candidates.len() == 1 && !force_choice {
            let identity = candidates.into_iter().next().map(RemoteIdentity::with_new_id);
            let Some(identity) = identity else {
                return Err(AuthError::Internal("candidate set lost its entry".to_string()));
            };
            // Local-account and already-linked cases were checked above, so
            // storage can only fail here on a rare race.
            match self.storage().link(user.user_name(), identity).await {
                Ok(()) => {}
                Err(AuthError::NoSuchUser(_)) => {
                    return Err(AuthError::Storage(
                        "User unexpectedly disappeared from the database".to_string(),
                    ));
                }
                Err(e) => return Err(e),
            }
            info!(user = %user.user_name(), "linked identity");
            return Ok(LinkToken::Linked);
        }
        // Store the candidates, even when there are none.
        let tt = self
            .store_identities_temporarily(candidates, Vec::new(), LINK_TOKEN_LIFETIME)
            .await?;
        Ok(LinkToken::Deferred(tt))
    }

    /// Drop identities that some user already holds.
    async fn filter_link_candidates(
        &self,
        identities: impl IntoIterator<Item = RemoteIdentity>,
    ) -> Result<Vec<RemoteIdentity>, AuthError> {
        let mut remaining = Vec::new();
        for identity in identities {
            if self
                .storage()
                .get_user_by_identity(&identity)
                .await?
                .is_none()
            {
                remaining.push(identity);
            }
        }
        Ok(remaining)
    }

    /// The state of a deferred link.
    ///
    /// # Errors
    /// `LinkFailed` for local accounts or when every stored identity is
    /// already linked, `InvalidToken` for a bad temporary token.
    pub async fn get_link_state(
        &self,
        token: &IncomingToken,
        link_token: &IncomingToken,
    ) -> Result<LinkIdentities, AuthError> {
        let user = self.get_user(token).await?;
        if user.is_local() {
            return Err(AuthError::LinkFailed(
                "Cannot link identities to local accounts".to_string(),
            ));
        }
        let stored = self.stored_link_identities(link_token).await?;
        let mut identities = Vec::new();
        for identity in stored {
            if self
                .storage()
                .get_user_by_identity(identity.identity())
                .await?
                .is_none()
            {
                identities.push(identity);
            }
        }
        if identities.is_empty() {
            return Err(AuthError::LinkFailed(
                "All provided identities are already linked".to_string(),
            ));
        }
        Ok(LinkIdentities { user, identities })
    }

    async fn stored_link_identities(
        &self,
        link_token: &IncomingToken,
    ) -> Result<Vec<LinkedIdentity>, AuthError> {
        match self
            .storage()
            .get_temporary_identities(&link_token.hash())
            .await
        {
            Ok(identities) => Ok(identities),
            Err(AuthError::NoSuchToken) => Err(AuthError::InvalidToken),
            Err(e) => Err(e),
        }
    }

    /// Complete a deferred link against one of the stored identities.
    ///
    /// # Errors
    /// `LinkFailed` when the id is not in the token's set or the identity
    /// was linked in the meantime.
    pub async fn complete_link(
        &self,
        token: &IncomingToken,
        link_token: &IncomingToken,
        identity_id: Uuid,
    ) -> Result<(), AuthError> {
        let user = self.get_user(token).await?;
        let identity = self
            .stored_link_identities(link_token)
            .await?
            .into_iter()
            .find(|i| i.local_id() == identity_id);
        let Some(identity) = identity else {
            return Err(AuthError::LinkFailed(format!(
                "Not authorized to link identity {identity_id}"
            )));
        };
        match self.storage().link(user.user_name(), identity).await {
            Ok(()) => {
                info!(user = %user.user_name(), "linked identity");
                Ok(())
            }
            Err(AuthError::NoSuchUser(_)) => Err(AuthError::Storage(
                "User unexpectedly disappeared from the database".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    /// Remove a linked identity from the caller's account. Storage refuses
    /// to leave a standard account with no identities.
    ///
    /// # Errors
    /// `UnlinkFailed` for local users, unknown identity ids, or a last
    /// remaining identity.
    pub async fn unlink(&self, token: &IncomingToken, identity_id: Uuid) -> Result<(), AuthError> {
        let user = self.get_user(token).await?;
        match self.storage().unlink(user.user_name(), identity_id).await {
            Ok(()) => {
                info!(user = %user.user_name(), "unlinked identity");
                Ok(())
            }
            Err(AuthError::NoSuchUser(_)) => Err(AuthError::Storage(
                "User unexpectedly disappeared from the database".to_string(),
            )),
            Err(e) => Err(e),
        }
    }
}

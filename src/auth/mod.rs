//! The authentication engine.
//!
//! One [`Authentication`] value drives every flow: OAuth2 login and link
//! state machines, token issuance and revocation, local password accounts,
//! role administration, and user search. It holds no per-request state; the
//! only cross-request memory is the config cache.

mod admin;
mod cache;
mod link;
mod local;
mod login;
mod roles;
mod tokens;

use std::collections::HashMap;
use std::sync::Arc;

use cache::ConfigCache;
use tracing::error;

use crate::crypto::PasswordCrypt;
use crate::error::AuthError;
use crate::identity::{IdentityProvider, ProviderRegistry};
use crate::storage::Storage;
use crate::types::{
    AuthConfig, AuthConfigSet, AuthUser, HashedToken, IncomingToken, ProviderConfig, Role,
    UserName, ViewableUser,
};

pub use link::{LinkIdentities, LinkToken};
pub use local::LocalLoginResult;
pub use login::{LoginState, LoginToken};

pub(crate) const MAX_RETURNED_USERS: usize = 10_000;
pub(crate) const TEMP_PWD_LENGTH: usize = 10;
pub(crate) const MAX_TOKEN_NAME_LENGTH: usize = 100;

/// The authentication engine. See the crate docs for the account and role
/// model.
pub struct Authentication {
    storage: Arc<dyn Storage>,
    providers: ProviderRegistry,
    crypt: PasswordCrypt,
    cfg: ConfigCache,
}

impl Authentication {
    /// Build the engine over a storage system and a set of identity
    /// providers. Default configuration values, including a disabled entry
    /// for every registered provider, are persisted without overwriting
    /// anything an administrator already set.
    ///
    /// # Errors
    /// `Storage` if the storage system cannot be initialized.
    pub async fn new(
        storage: Arc<dyn Storage>,
        providers: ProviderRegistry,
        default_external_config: HashMap<String, String>,
    ) -> Result<Self, AuthError> {
        let provider_defaults = providers
            .provider_names()
            .iter()
            .map(|name| (name.clone(), ProviderConfig::default()))
            .collect();
        let defaults = AuthConfigSet::new(
            AuthConfig::new(
                AuthConfig::DEFAULT_LOGIN_ALLOWED,
                provider_defaults,
                HashMap::new(),
            ),
            default_external_config,
        );
        storage
            .update_config(defaults, false)
            .await
            .map_err(|e| AuthError::Storage(format!("Failed to set config in storage: {e}")))?;
        let cfg = ConfigCache::new(Arc::clone(&storage)).await?;
        Ok(Self {
            storage,
            providers,
            crypt: PasswordCrypt,
            cfg,
        })
    }

    /// Resolve a token to its server-side record.
    ///
    /// # Errors
    /// `InvalidToken` for unknown or expired tokens.
    pub async fn get_token(&self, token: &IncomingToken) -> Result<HashedToken, AuthError> {
        match self.storage.get_token(&token.hash()).await {
            Ok(ht) => Ok(ht),
            Err(AuthError::NoSuchToken) => Err(AuthError::InvalidToken),
            Err(e) => Err(e),
        }
    }

    /// Resolve a token to its user.
    ///
    /// # Errors
    /// `InvalidToken` for bad tokens, `Disabled` for disabled accounts.
    pub async fn get_user(&self, token: &IncomingToken) -> Result<AuthUser, AuthError> {
        self.get_user_with_roles(token, &[]).await
    }

    /// Resolve a token to its user, requiring at least one of the given
    /// roles (via the roles' included sets) when `required` is non-empty.
    pub(crate) async fn get_user_with_roles(
        &self,
        token: &IncomingToken,
        required: &[Role],
    ) -> Result<AuthUser, AuthError> {
        let ht = self.get_token(token).await?;
        self.user_for_token(&ht, required).await
    }

    /// As [`Self::get_user_with_roles`], for an already resolved token.
    pub(crate) async fn user_for_token(
        &self,
        ht: &HashedToken,
        required: &[Role],
    ) -> Result<AuthUser, AuthError> {
        let user = match self.storage.get_user(ht.user_name()).await {
            Ok(user) => user,
            Err(AuthError::NoSuchUser(name)) => {
                error!(user = %name, "valid token for a missing user");
                return Err(AuthError::Internal(format!(
                    "Token for user {name} exists, but the user record is missing"
                )));
            }
            Err(e) => return Err(e),
        };
        if user.is_disabled() {
            // This disabled user still had a live token; kill them all.
            self.storage.delete_tokens(ht.user_name()).await?;
            return Err(AuthError::Disabled("This account is disabled".to_string()));
        }
        if !required.is_empty() {
            let has = user.included_roles();
            if !required.iter().any(|r| has.contains(r)) {
                return Err(AuthError::unauthorized());
            }
        }
        Ok(user)
    }

    /// A restricted view of a user, for one user viewing another. The full
    /// view is returned only for the caller's own account.
    ///
    /// # Errors
    /// `NoSuchUser` if the viewed user does not exist.
    pub async fn view_user(
        &self,
        token: &IncomingToken,
        user: &UserName,
    ) -> Result<ViewableUser, AuthError> {
        let ht = self.get_token(token).await?;
        let viewed = self.storage.get_user(user).await?;
        let own_account = ht.user_name() == viewed.user_name();
        Ok(ViewableUser::new(viewed, own_account))
    }

    /// The registered provider, treating config-disabled providers as
    /// unknown.
    pub(crate) async fn identity_provider(
        &self,
        provider: &str,
    ) -> Result<Arc<dyn IdentityProvider>, AuthError> {
        let idp = self.providers.get(provider)?;
        if !self.cfg.app_config().await?.provider_config(provider).enabled {
            return Err(AuthError::NoSuchProvider(provider.to_string()));
        }
        Ok(Arc::clone(idp))
    }

    pub(crate) fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub(crate) fn registry(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub(crate) fn crypt(&self) -> &PasswordCrypt {
        &self.crypt
    }

    pub(crate) fn cfg(&self) -> &ConfigCache {
        &self.cfg
    }
}

/// Trim a required string parameter, rejecting blank input.
pub(crate) fn require_nonblank<'a>(value: &'a str, name: &str) -> Result<&'a str, AuthError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AuthError::MissingParameter(name.to_string()));
    }
    Ok(value)
}

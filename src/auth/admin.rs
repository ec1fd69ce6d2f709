//! Account administration, user search, and configuration management.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};
use url::Url;

use crate::auth::{Authentication, MAX_RETURNED_USERS};
use crate::error::AuthError;
use crate::types::{
    AuthConfigSet, AuthUser, DisplayName, IncomingToken, Role, UserName, UserSearchSpec,
    UserUpdate,
};

impl Authentication {
    /// Get a full user record. Administrators only.
    pub async fn get_user_as_admin(
        &self,
        token: &IncomingToken,
        user_name: &UserName,
    ) -> Result<AuthUser, AuthError> {
        self.get_user_with_roles(token, &[Role::Root, Role::CreateAdmin, Role::Admin])
            .await?;
        self.storage().get_user(user_name).await
    }

    /// Disable or enable an account.
    ///
    /// Only root may disable the root account, and nobody may enable it
    /// through this path. Disabling deletes the user's tokens twice, once
    /// before and once after the disable write, to narrow the window for a
    /// concurrent login to survive.
    ///
    /// # Errors
    /// `Unauthorized` per the root rules, `IllegalParameter` for a blank
    /// disable reason.
    pub async fn disable_account(
        &self,
        token: &IncomingToken,
        user_name: &UserName,
        disable: bool,
        reason: &str,
    ) -> Result<(), AuthError> {
        let admin = self
            .get_user_with_roles(token, &[Role::Root, Role::CreateAdmin, Role::Admin])
            .await?;
        if disable {
            if user_name.is_root() && !admin.is_root() {
                return Err(AuthError::Unauthorized(
                    "Only the root user can disable the root account".to_string(),
                ));
            }
            let reason = reason.trim();
            if reason.is_empty() {
                return Err(AuthError::IllegalParameter(
                    "Must provide a reason why the account was disabled".to_string(),
                ));
            }
            self.storage().delete_tokens(user_name).await?;
            self.storage()
                .disable_account(user_name, admin.user_name(), reason)
                .await?;
            // A login in flight may have passed the disabled check and
            // stored a token after the first delete; the second pass plus
            // the disabled check in get_user cover the remainder.
            self.storage().delete_tokens(user_name).await?;
            warn!(user = %user_name, actor = %admin.user_name(), reason, "account disabled");
        } else {
            if user_name.is_root() {
                return Err(AuthError::Unauthorized(
                    "The root user cannot be enabled from the UI".to_string(),
                ));
            }
            self.storage()
                .enable_account(user_name, admin.user_name())
                .await?;
            info!(user = %user_name, actor = %admin.user_name(), "account enabled");
        }
        Ok(())
    }

    /// Apply a user's changes to their own display name and email. An empty
    /// update is a no-op.
    pub async fn update_user(
        &self,
        token: &IncomingToken,
        update: UserUpdate,
    ) -> Result<(), AuthError> {
        if !update.has_updates() {
            return Ok(());
        }
        let ht = self.get_token(token).await?;
        match self.storage().update_user(ht.user_name(), update).await {
            Err(AuthError::NoSuchUser(name)) => Err(AuthError::Storage(format!(
                "Token for user {name} exists, but the user record is missing"
            ))),
            other => other,
        }
    }

    /// Display names for a set of user names. Missing users are simply
    /// absent from the result.
    ///
    /// # Errors
    /// `IllegalParameter` when more than 10 000 names are requested.
    pub async fn get_user_display_names(
        &self,
        token: &IncomingToken,
        user_names: &HashSet<UserName>,
    ) -> Result<HashMap<UserName, DisplayName>, AuthError> {
        self.get_token(token).await?;
        if user_names.len() > MAX_RETURNED_USERS {
            return Err(AuthError::IllegalParameter(format!(
                "User count exceeds maximum of {MAX_RETURNED_USERS}"
            )));
        }
        if user_names.is_empty() {
            return Ok(HashMap::new());
        }
        self.storage().get_user_display_names(user_names).await
    }

    /// Search for users by a search specification. Non-admins may only run
    /// prefix searches without role filters. Results are capped at 10 000.
    pub async fn search_user_display_names(
        &self,
        token: &IncomingToken,
        spec: &UserSearchSpec,
    ) -> Result<HashMap<UserName, DisplayName>, AuthError> {
        let user = self.get_user(token).await?;
        if !Role::Admin.is_satisfied_by(user.roles()) {
            if spec.is_role_search() || spec.is_custom_role_search() {
                return Err(AuthError::Unauthorized(
                    "Only admins may search on roles".to_string(),
                ));
            }
            if spec.prefix().is_none() {
                return Err(AuthError::Unauthorized(
                    "Only admins may search without a prefix".to_string(),
                ));
            }
        }
        self.storage()
            .search_user_display_names(spec, Some(MAX_RETURNED_USERS), false)
            .await
    }

    /// Names of the enabled identity providers, in registration order.
    pub async fn identity_providers(&self) -> Result<Vec<String>, AuthError> {
        let config = self.cfg().app_config().await?;
        Ok(self
            .registry()
            .provider_names()
            .iter()
            .filter(|name| config.provider_config(name).enabled)
            .cloned()
            .collect())
    }

    /// The authorize redirect URL for a provider.
    ///
    /// # Errors
    /// `NoSuchProvider` for unknown or disabled providers.
    pub async fn identity_provider_url(
        &self,
        provider: &str,
        state: &str,
        link: bool,
    ) -> Result<Url, AuthError> {
        Ok(self.identity_provider(provider).await?.login_url(state, link))
    }

    /// Replace the stored configuration. Administrators only. Every
    /// provider named in the new configuration must be registered.
    ///
    /// # Errors
    /// `NoSuchProvider` for unregistered providers.
    pub async fn update_config(
        &self,
        token: &IncomingToken,
        config: AuthConfigSet,
    ) -> Result<(), AuthError> {
        self.get_user_with_roles(token, &[Role::Admin]).await?;
        for provider in config.config().providers().keys() {
            if !self.registry().contains(provider) {
                return Err(AuthError::NoSuchProvider(provider.clone()));
            }
        }
        self.storage().update_config(config, true).await?;
        // Readers must observe the mutation immediately.
        self.cfg().force_refresh().await?;
        info!("auth configuration updated");
        Ok(())
    }

    /// The current configuration. Administrators only.
    pub async fn get_config(&self, token: &IncomingToken) -> Result<AuthConfigSet, AuthError> {
        self.get_user_with_roles(token, &[Role::Admin]).await?;
        self.cfg().get().await
    }

    /// The external configuration values, without requiring credentials.
    ///
    /// Not for exposure in public APIs.
    pub async fn external_config(&self) -> Result<HashMap<String, String>, AuthError> {
        Ok(self.cfg().get().await?.external().clone())
    }
}

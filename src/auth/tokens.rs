//! Token issuance, lookup, and revocation.

use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use crate::auth::{Authentication, MAX_TOKEN_NAME_LENGTH, require_nonblank};
use crate::crypto;
use crate::error::AuthError;
use crate::types::{
    HashedToken, IncomingToken, NewToken, Role, TokenLifetimeType, TokenSet, TokenType, UserName,
};

impl Authentication {
    /// Issue a login token for a user that just authenticated, and record
    /// the login time. Internal: callers have already authenticated the
    /// user.
    pub(crate) async fn issue_login_token(
        &self,
        user_name: &UserName,
    ) -> Result<NewToken, AuthError> {
        let lifetime_ms = self
            .cfg()
            .app_config()
            .await?
            .token_lifetime_ms(TokenLifetimeType::Login);
        let token = NewToken::new(
            TokenType::Login,
            None,
            crypto::generate_token()?,
            user_name.clone(),
            Duration::from_millis(lifetime_ms),
        );
        self.storage().store_token(token.hashed()).await?;
        self.set_last_login(user_name).await?;
        info!(user = %user_name, "issued login token");
        Ok(token)
    }

    // The user is known to exist at this point; a miss is storage breakage.
    async fn set_last_login(&self, user_name: &UserName) -> Result<(), AuthError> {
        match self
            .storage()
            .set_last_login(user_name, chrono::Utc::now())
            .await
        {
            Err(AuthError::NoSuchUser(name)) => Err(AuthError::Storage(format!(
                "User should exist but doesn't: {name}"
            ))),
            other => other,
        }
    }

    /// Create a developer or server token. Only a login token may create
    /// tokens, and the caller must hold the matching token-creation role.
    ///
    /// # Errors
    /// `MissingParameter`/`IllegalParameter` for a bad name, `Unauthorized`
    /// for non-login tokens or missing roles.
    pub async fn create_token(
        &self,
        token: &IncomingToken,
        token_name: &str,
        server_token: bool,
    ) -> Result<NewToken, AuthError> {
        let token_name = require_nonblank(token_name, "token name")?;
        if token_name.chars().count() > MAX_TOKEN_NAME_LENGTH {
            return Err(AuthError::IllegalParameter(format!(
                "token name exceeds maximum length of {MAX_TOKEN_NAME_LENGTH}"
            )));
        }
        if token_name.chars().any(char::is_control) {
            return Err(AuthError::IllegalParameter(
                "token name contains control characters".to_string(),
            ));
        }
        let ht = self.get_token(token).await?;
        if ht.token_type() != TokenType::Login {
            return Err(AuthError::Unauthorized(
                "Only login tokens may be used to create a token".to_string(),
            ));
        }
        let user = self.user_for_token(&ht, &[]).await?;
        let (required, lifetime_type) = if server_token {
            (Role::ServToken, TokenLifetimeType::Serv)
        } else {
            (Role::DevToken, TokenLifetimeType::Dev)
        };
        if !required.is_satisfied_by(user.roles()) {
            return Err(AuthError::Unauthorized(format!(
                "User {} is not authorized to create this token type",
                user.user_name()
            )));
        }
        let lifetime_ms = self.cfg().app_config().await?.token_lifetime_ms(lifetime_type);
        let new_token = NewToken::new(
            TokenType::ExtendedLifetime,
            Some(token_name.to_string()),
            crypto::generate_token()?,
            user.user_name().clone(),
            Duration::from_millis(lifetime_ms),
        );
        self.storage().store_token(new_token.hashed()).await?;
        info!(user = %user.user_name(), server = server_token, "issued extended lifetime token");
        Ok(new_token)
    }

    /// The caller's tokens.
    ///
    /// # Errors
    /// `InvalidToken` for a bad token.
    pub async fn get_tokens(&self, token: &IncomingToken) -> Result<TokenSet, AuthError> {
        let ht = self.get_token(token).await?;
        let tokens = self.storage().get_tokens(ht.user_name()).await?;
        Ok(TokenSet::new(ht, tokens))
    }

    /// An arbitrary user's tokens. Administrators only.
    pub async fn get_tokens_as_admin(
        &self,
        token: &IncomingToken,
        user_name: &UserName,
    ) -> Result<Vec<HashedToken>, AuthError> {
        self.get_user_with_roles(token, &[Role::Admin]).await?;
        self.storage().get_tokens(user_name).await
    }

    /// Revoke one of the caller's own tokens by id.
    ///
    /// # Errors
    /// `NoSuchToken` if the caller has no token with that id.
    pub async fn revoke_token(
        &self,
        token: &IncomingToken,
        token_id: Uuid,
    ) -> Result<(), AuthError> {
        let ht = self.get_token(token).await?;
        self.storage().delete_token(ht.user_name(), token_id).await
    }

    /// Revoke one of another user's tokens. Administrators only.
    pub async fn revoke_user_token(
        &self,
        token: &IncomingToken,
        user_name: &UserName,
        token_id: Uuid,
    ) -> Result<(), AuthError> {
        self.get_user_with_roles(token, &[Role::Admin]).await?;
        self.storage().delete_token(user_name, token_id).await
    }

    /// Revoke the presented token itself. Returns the revoked record, or
    /// `None` if the token did not exist and there was nothing to do.
    pub async fn revoke_current_token(
        &self,
        token: &IncomingToken,
    ) -> Result<Option<HashedToken>, AuthError> {
        match self.storage().get_token(&token.hash()).await {
            Ok(ht) => {
                self.storage().delete_token(ht.user_name(), ht.id()).await?;
                Ok(Some(ht))
            }
            Err(AuthError::NoSuchToken) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Revoke all of the caller's tokens, including the presented one.
    pub async fn revoke_tokens(&self, token: &IncomingToken) -> Result<(), AuthError> {
        let ht = self.get_token(token).await?;
        info!(user = %ht.user_name(), "revoking all tokens for user");
        self.storage().delete_tokens(ht.user_name()).await
    }

    /// Revoke all of another user's tokens. Administrators only.
    pub async fn revoke_user_tokens(
        &self,
        token: &IncomingToken,
        user_name: &UserName,
    ) -> Result<(), AuthError> {
        self.get_user_with_roles(token, &[Role::Admin]).await?;
        info!(user = %user_name, "admin revoking all tokens for user");
        self.storage().delete_tokens(user_name).await
    }

    /// Revoke every token in the system. Administrators only.
    pub async fn revoke_all_tokens(&self, token: &IncomingToken) -> Result<(), AuthError> {
        self.get_user_with_roles(token, &[Role::Admin]).await?;
        info!("revoking all tokens globally");
        self.storage().delete_all_tokens().await
    }

    /// A random token string not persisted anywhere.
    ///
    /// # Errors
    /// `Internal` if the random source fails.
    pub fn bare_token(&self) -> Result<String, AuthError> {
        crypto::generate_token()
    }

    /// The suggested client-side cache time for token validity, in
    /// milliseconds.
    pub async fn suggested_token_cache_time(&self) -> Result<u64, AuthError> {
        Ok(self
            .cfg()
            .app_config()
            .await?
            .token_lifetime_ms(TokenLifetimeType::ExtCache))
    }
}

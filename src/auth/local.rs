//! Local (password) account management.
//!
//! Local accounts are intended for administrators and service-token owners;
//! the general population logs in through identity providers. Plaintext
//! passwords live in [`Password`] values, which zero their buffers on drop.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::auth::{Authentication, TEMP_PWD_LENGTH};
use crate::crypto::{self, Password};
use crate::error::AuthError;
use crate::types::{
    DisplayName, EmailAddress, IncomingToken, LocalUser, NewLocalUser, NewToken, Role, UserName,
};

/// The outcome of a local login: a token, or a demand that the user reset
/// their password first.
#[derive(Debug)]
pub enum LocalLoginResult {
    LoggedIn(NewToken),
    ResetRequired(UserName),
}

impl Authentication {
    /// Create the root account, or reset its password if it already exists.
    /// A disabled root account is re-enabled.
    ///
    /// Not for exposure in public APIs.
    ///
    /// # Errors
    /// `Storage` on storage failures.
    pub async fn create_root(&self, password: Password) -> Result<(), AuthError> {
        let salt = crypto::generate_salt()?;
        let hash = self.crypt().encrypt(password.as_bytes(), &salt);
        drop(password);
        let root = NewLocalUser {
            user_name: UserName::root(),
            email: EmailAddress::Unknown,
            display_name: DisplayName::new("root")
                .map_err(|e| AuthError::Internal(e.to_string()))?,
            roles: HashSet::from([Role::Root]),
            password_hash: hash.to_vec(),
            salt: salt.clone(),
            force_reset: false,
        };
        // Insert first and fall back to update. Checking existence before
        // creating would race with a concurrent insert.
        match self.storage().create_local_user(root).await {
            Ok(()) => {
                info!("created root account");
                Ok(())
            }
            Err(AuthError::UserExists(_)) => {
                let name = UserName::root();
                self.storage()
                    .change_password(&name, &hash, &salt, false)
                    .await?;
                if self.storage().get_user(&name).await?.is_disabled() {
                    warn!("re-enabling disabled root account");
                    self.storage().enable_account(&name, &name).await?;
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Create a local user with a generated temporary password, which is
    /// returned for out-of-band delivery and must be reset on first login.
    ///
    /// # Errors
    /// `Unauthorized` without an admin role or for the root user name,
    /// `UserExists` if the name is taken.
    pub async fn create_local_user(
        &self,
        admin_token: &IncomingToken,
        user_name: &UserName,
        display_name: &DisplayName,
        email: &EmailAddress,
    ) -> Result<Password, AuthError> {
        self.get_user_with_roles(admin_token, &[Role::Root, Role::CreateAdmin, Role::Admin])
            .await?;
        if user_name.is_root() {
            return Err(AuthError::Unauthorized("Cannot create ROOT user".to_string()));
        }
        let password = crypto::generate_temporary_password(TEMP_PWD_LENGTH);
        let salt = crypto::generate_salt()?;
        let hash = self.crypt().encrypt(password.as_bytes(), &salt);
        self.storage()
            .create_local_user(NewLocalUser {
                user_name: user_name.clone(),
                email: email.clone(),
                display_name: display_name.clone(),
                roles: HashSet::new(),
                password_hash: hash.to_vec(),
                salt,
                force_reset: true,
            })
            .await?;
        info!(user = %user_name, "created local user");
        Ok(password)
    }

    /// Log in with a username and password.
    ///
    /// # Errors
    /// `Authentication` on credential mismatch (deliberately identical for
    /// unknown users and wrong passwords), `Unauthorized` when non-admin
    /// login is disabled, `Disabled` for disabled accounts.
    pub async fn local_login(
        &self,
        user_name: &UserName,
        password: Password,
    ) -> Result<LocalLoginResult, AuthError> {
        let user = self.authenticate_local(user_name, password).await?;
        if user.reset_required() {
            return Ok(LocalLoginResult::ResetRequired(user.user_name().clone()));
        }
        Ok(LocalLoginResult::LoggedIn(
            self.issue_login_token(user.user_name()).await?,
        ))
    }

    async fn authenticate_local(
        &self,
        user_name: &UserName,
        password: Password,
    ) -> Result<LocalUser, AuthError> {
        let mismatch = || AuthError::Authentication("Username / password mismatch".to_string());
        let user = match self.storage().get_local_user(user_name).await {
            Ok(user) => user,
            Err(AuthError::NoSuchUser(_)) => return Err(mismatch()),
            Err(e) => return Err(e),
        };
        let authenticated =
            self.crypt()
                .authenticate(password.as_bytes(), user.password_hash(), user.salt());
        drop(password);
        if !authenticated {
            return Err(mismatch());
        }
        if !self.cfg().app_config().await?.login_allowed() && !user.user().is_admin() {
            return Err(AuthError::Unauthorized(
                "Non-admin login is disabled".to_string(),
            ));
        }
        if user.user().is_disabled() {
            return Err(AuthError::Disabled("This account is disabled".to_string()));
        }
        Ok(user)
    }

    /// Change a password, authenticating with the old one. Clears any
    /// pending forced reset.
    pub async fn local_password_change(
        &self,
        user_name: &UserName,
        old_password: Password,
        new_password: Password,
    ) -> Result<(), AuthError> {
        self.authenticate_local(user_name, old_password).await?;
        let salt = crypto::generate_salt()?;
        let hash = self.crypt().encrypt(new_password.as_bytes(), &salt);
        drop(new_password);
        self.storage()
            .change_password(user_name, &hash, &salt, false)
            .await?;
        info!(user = %user_name, "password changed");
        Ok(())
    }

    /// Reset a user's password to a fresh temporary one. Administrators
    /// only. The user must change it on next login.
    pub async fn reset_password(
        &self,
        admin_token: &IncomingToken,
        user_name: &UserName,
    ) -> Result<Password, AuthError> {
        self.get_user_with_roles(admin_token, &[Role::Admin]).await?;
        let password = crypto::generate_temporary_password(TEMP_PWD_LENGTH);
        let salt = crypto::generate_salt()?;
        let hash = self.crypt().encrypt(password.as_bytes(), &salt);
        self.storage()
            .change_password(user_name, &hash, &salt, true)
            .await?;
        info!(user = %user_name, "password reset by admin");
        Ok(password)
    }

    /// Require a password reset on a user's next login. Administrators only.
    pub async fn force_reset_password(
        &self,
        admin_token: &IncomingToken,
        user_name: &UserName,
    ) -> Result<(), AuthError> {
        self.get_user_with_roles(admin_token, &[Role::Admin]).await?;
        self.storage().force_password_reset(user_name).await
    }

    /// Require a password reset for every local user. Administrators only.
    pub async fn force_reset_all_passwords(
        &self,
        admin_token: &IncomingToken,
    ) -> Result<(), AuthError> {
        self.get_user_with_roles(admin_token, &[Role::Admin]).await?;
        warn!("forcing password reset for all local users");
        self.storage().force_password_reset_all().await
    }
}

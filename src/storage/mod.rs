//! The persistence capability the engine consumes.
//!
//! Implementations own all durable state and provide single-operation
//! atomicity; the engine never relies on cross-operation transactions. Token
//! lookups always take the token hash, never the plaintext.

pub mod memory;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AuthError;
use crate::types::{
    AuthConfigSet, AuthUser, CustomRole, DisplayName, HashedToken, LinkedIdentity, LocalUser,
    NewLocalUser, NewUser, RemoteIdentity, Role, UserName, UserSearchSpec, UserUpdate,
};

pub use memory::MemoryStorage;

/// Deferred login/link state stored under a temporary token's hash.
#[derive(Clone, Debug)]
pub struct TemporaryIdentities {
    pub token_hash: String,
    pub id: Uuid,
    pub identities: Vec<LinkedIdentity>,
    pub expires: DateTime<Utc>,
}

/// Storage operations required by the authentication engine.
///
/// Missing entities surface as the `NoSuchX` error kinds;
/// transport/availability failures as `Storage`. Expired tokens and
/// temporary identity sets are garbage collected by the implementation and
/// read as missing.
#[async_trait]
pub trait Storage: Send + Sync {
    // Users.
    async fn create_user(&self, user: NewUser) -> Result<(), AuthError>;
    async fn create_local_user(&self, user: NewLocalUser) -> Result<(), AuthError>;
    async fn get_user(&self, name: &UserName) -> Result<AuthUser, AuthError>;
    async fn get_local_user(&self, name: &UserName) -> Result<LocalUser, AuthError>;
    /// Look up the user linked to a remote identity, by provider-scoped id.
    async fn get_user_by_identity(
        &self,
        identity: &RemoteIdentity,
    ) -> Result<Option<AuthUser>, AuthError>;
    async fn update_user(&self, name: &UserName, update: UserUpdate) -> Result<(), AuthError>;
    async fn set_last_login(
        &self,
        name: &UserName,
        time: DateTime<Utc>,
    ) -> Result<(), AuthError>;
    async fn disable_account(
        &self,
        name: &UserName,
        admin: &UserName,
        reason: &str,
    ) -> Result<(), AuthError>;
    async fn enable_account(&self, name: &UserName, admin: &UserName) -> Result<(), AuthError>;

    // Local credentials.
    async fn change_password(
        &self,
        name: &UserName,
        hash: &[u8],
        salt: &[u8],
        force_reset: bool,
    ) -> Result<(), AuthError>;
    async fn force_password_reset(&self, name: &UserName) -> Result<(), AuthError>;
    async fn force_password_reset_all(&self) -> Result<(), AuthError>;

    // Remote identities.
    async fn link(&self, name: &UserName, identity: LinkedIdentity) -> Result<(), AuthError>;
    /// Remove an identity by its local id. Must refuse to leave a standard
    /// user with no identities.
    async fn unlink(&self, name: &UserName, id: Uuid) -> Result<(), AuthError>;

    // Display name lookup.
    async fn get_user_display_names(
        &self,
        names: &HashSet<UserName>,
    ) -> Result<HashMap<UserName, DisplayName>, AuthError>;
    async fn search_user_display_names(
        &self,
        spec: &UserSearchSpec,
        limit: Option<usize>,
        include_root: bool,
    ) -> Result<HashMap<UserName, DisplayName>, AuthError>;

    // Roles.
    async fn update_roles(
        &self,
        name: &UserName,
        add: &HashSet<Role>,
        remove: &HashSet<Role>,
    ) -> Result<(), AuthError>;
    async fn set_custom_role(&self, role: CustomRole) -> Result<(), AuthError>;
    /// Delete a custom role and remove it from every user holding it.
    async fn delete_custom_role(&self, id: &str) -> Result<(), AuthError>;
    async fn get_custom_roles(&self) -> Result<HashSet<CustomRole>, AuthError>;
    async fn update_custom_roles(
        &self,
        name: &UserName,
        add: &HashSet<String>,
        remove: &HashSet<String>,
    ) -> Result<(), AuthError>;

    // Tokens.
    async fn store_token(&self, token: HashedToken) -> Result<(), AuthError>;
    async fn get_token(&self, token_hash: &str) -> Result<HashedToken, AuthError>;
    async fn get_tokens(&self, name: &UserName) -> Result<Vec<HashedToken>, AuthError>;
    async fn delete_token(&self, name: &UserName, id: Uuid) -> Result<(), AuthError>;
    async fn delete_tokens(&self, name: &UserName) -> Result<(), AuthError>;
    async fn delete_all_tokens(&self) -> Result<(), AuthError>;

    // Deferred login/link state.
    async fn store_temporary_identities(
        &self,
        identities: TemporaryIdentities,
    ) -> Result<(), AuthError>;
    async fn get_temporary_identities(
        &self,
        token_hash: &str,
    ) -> Result<Vec<LinkedIdentity>, AuthError>;

    // Configuration.
    async fn get_config(&self) -> Result<AuthConfigSet, AuthError>;
    /// Persist configuration values. With `overwrite` false, only values not
    /// already present are written (initialization semantics); with true,
    /// the provided values replace the stored ones.
    async fn update_config(&self, config: AuthConfigSet, overwrite: bool)
    -> Result<(), AuthError>;
}

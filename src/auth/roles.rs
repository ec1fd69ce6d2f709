//! Role and custom-role administration.

use std::collections::{BTreeSet, HashSet};

use tracing::info;

use crate::auth::{Authentication, require_nonblank};
use crate::error::AuthError;
use crate::types::{CustomRole, IncomingToken, Role, UserName};

fn role_descriptions(roles: &HashSet<Role>) -> String {
    // Sorted so error messages are deterministic.
    roles
        .iter()
        .map(|r| r.description())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(", ")
}

impl Authentication {
    /// Add and remove built-in roles on a user account.
    ///
    /// Granting requires the role to be in the acting user's grantable set.
    /// So does removing, except that users may remove any of their own
    /// roles without grant authority.
    ///
    /// # Errors
    /// `IllegalParameter` when a role is both added and removed,
    /// `Unauthorized` for the root account or missing grant authority.
    pub async fn update_roles(
        &self,
        token: &IncomingToken,
        user_name: &UserName,
        add: &HashSet<Role>,
        remove: &HashSet<Role>,
    ) -> Result<(), AuthError> {
        let both: HashSet<Role> = add.intersection(remove).copied().collect();
        if !both.is_empty() {
            return Err(AuthError::IllegalParameter(format!(
                "One or more roles is to be both removed and added: {}",
                role_descriptions(&both)
            )));
        }
        if user_name.is_root() {
            return Err(AuthError::Unauthorized("Cannot change ROOT roles".to_string()));
        }
        let acting = self.get_user(token).await?;
        let grantable = acting.grantable_roles();

        let add_denied: HashSet<Role> = add.difference(&grantable).copied().collect();
        if !add_denied.is_empty() {
            return Err(AuthError::Unauthorized(format!(
                "Not authorized to grant role(s): {}",
                role_descriptions(&add_denied)
            )));
        }
        let remove_denied: HashSet<Role> = remove.difference(&grantable).copied().collect();
        if !remove_denied.is_empty() && user_name != acting.user_name() {
            return Err(AuthError::Unauthorized(format!(
                "Not authorized to remove role(s): {}",
                role_descriptions(&remove_denied)
            )));
        }
        self.storage().update_roles(user_name, add, remove).await?;
        info!(user = %user_name, actor = %acting.user_name(), "updated roles");
        Ok(())
    }

    /// Remove roles from the caller's own account. No grant authority
    /// needed; built-in roles are privileges, not tags.
    pub async fn remove_roles(
        &self,
        token: &IncomingToken,
        remove: &HashSet<Role>,
    ) -> Result<(), AuthError> {
        let ht = self.get_token(token).await?;
        match self
            .update_roles(token, ht.user_name(), &HashSet::new(), remove)
            .await
        {
            Err(AuthError::NoSuchUser(name)) => Err(AuthError::Storage(format!(
                "Token for user {name} exists, but the user record is missing"
            ))),
            other => other,
        }
    }

    /// Create or update a custom role. Administrators only.
    pub async fn set_custom_role(
        &self,
        token: &IncomingToken,
        role: CustomRole,
    ) -> Result<(), AuthError> {
        self.get_user_with_roles(token, &[Role::Admin]).await?;
        info!(role = role.id(), "set custom role");
        self.storage().set_custom_role(role).await
    }

    /// Delete a custom role, removing it from every user. Administrators
    /// only.
    ///
    /// # Errors
    /// `MissingParameter` for a blank id, `NoSuchRole` for an unknown one.
    pub async fn delete_custom_role(
        &self,
        token: &IncomingToken,
        role_id: &str,
    ) -> Result<(), AuthError> {
        let role_id = require_nonblank(role_id, "role id")?;
        self.get_user_with_roles(token, &[Role::Admin]).await?;
        info!(role = role_id, "deleting custom role");
        self.storage().delete_custom_role(role_id).await
    }

    /// All custom roles. With `force_admin`, requires an administrative
    /// role; otherwise any valid token will do.
    pub async fn get_custom_roles(
        &self,
        token: &IncomingToken,
        force_admin: bool,
    ) -> Result<HashSet<CustomRole>, AuthError> {
        if force_admin {
            self.get_user_with_roles(token, &[Role::Admin, Role::CreateAdmin, Role::Root])
                .await?;
        } else {
            self.get_token(token).await?;
        }
        self.storage().get_custom_roles().await
    }

    /// Add and remove custom roles on a user account. Administrators only;
    /// users may not shed their own custom roles, since admins use them as
    /// tags users shouldn't control.
    ///
    /// # Errors
    /// `IllegalParameter` when a role is both added and removed,
    /// `NoSuchRole` for unknown role ids.
    pub async fn update_custom_roles(
        &self,
        token: &IncomingToken,
        user_name: &UserName,
        add: &HashSet<String>,
        remove: &HashSet<String>,
    ) -> Result<(), AuthError> {
        let both: BTreeSet<&String> = add.intersection(remove).collect();
        if !both.is_empty() {
            let joined = both
                .into_iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AuthError::IllegalParameter(format!(
                "One or more roles is to be both removed and added: {joined}"
            )));
        }
        self.get_user_with_roles(token, &[Role::Admin]).await?;
        self.storage()
            .update_custom_roles(user_name, add, remove)
            .await?;
        info!(user = %user_name, "updated custom roles");
        Ok(())
    }
}

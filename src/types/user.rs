//! User account types.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AuthError;
use crate::types::identity::{LinkedIdentity, RemoteIdentity};
use crate::types::name::{DisplayName, EmailAddress, UserName};
use crate::types::role::Role;

/// Whether and why an account is disabled, and who last toggled it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserDisabledState {
    reason: Option<String>,
    admin: Option<UserName>,
    time: Option<DateTime<Utc>>,
}

impl UserDisabledState {
    #[must_use]
    pub fn disabled(reason: &str, admin: UserName, time: DateTime<Utc>) -> Self {
        Self {
            reason: Some(reason.to_string()),
            admin: Some(admin),
            time: Some(time),
        }
    }

    #[must_use]
    pub fn enabled(admin: UserName, time: DateTime<Utc>) -> Self {
        Self {
            reason: None,
            admin: Some(admin),
            time: Some(time),
        }
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.reason.is_some()
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    #[must_use]
    pub fn admin(&self) -> Option<&UserName> {
        self.admin.as_ref()
    }

    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }
}

/// A user account.
///
/// Standard users carry at least one linked remote identity and no password.
/// Local users carry no identities and authenticate by password (see
/// [`LocalUser`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    user_name: UserName,
    email: EmailAddress,
    display_name: DisplayName,
    roles: HashSet<Role>,
    custom_roles: HashSet<String>,
    policy_ids: HashSet<String>,
    created: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
    disabled_state: UserDisabledState,
    local: bool,
    identities: HashSet<LinkedIdentity>,
}

impl AuthUser {
    /// Assemble a user record. Storage implementations are the expected
    /// callers.
    ///
    /// # Errors
    /// `IllegalParameter` when the local flag and the identity set disagree:
    /// a local user must have no identities, a standard user at least one.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_name: UserName,
        email: EmailAddress,
        display_name: DisplayName,
        roles: HashSet<Role>,
        custom_roles: HashSet<String>,
        policy_ids: HashSet<String>,
        created: DateTime<Utc>,
        last_login: Option<DateTime<Utc>>,
        disabled_state: UserDisabledState,
        local: bool,
        identities: HashSet<LinkedIdentity>,
    ) -> Result<Self, AuthError> {
        if local && !identities.is_empty() {
            return Err(AuthError::IllegalParameter(
                "local users may not have linked identities".to_string(),
            ));
        }
        if !local && identities.is_empty() {
            return Err(AuthError::IllegalParameter(
                "standard users must have at least one linked identity".to_string(),
            ));
        }
        Ok(Self {
            user_name,
            email,
            display_name,
            roles,
            custom_roles,
            policy_ids,
            created,
            last_login,
            disabled_state,
            local,
            identities,
        })
    }

    #[must_use]
    pub fn user_name(&self) -> &UserName {
        &self.user_name
    }

    #[must_use]
    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    #[must_use]
    pub fn display_name(&self) -> &DisplayName {
        &self.display_name
    }

    #[must_use]
    pub fn roles(&self) -> &HashSet<Role> {
        &self.roles
    }

    #[must_use]
    pub fn custom_roles(&self) -> &HashSet<String> {
        &self.custom_roles
    }

    #[must_use]
    pub fn policy_ids(&self) -> &HashSet<String> {
        &self.policy_ids
    }

    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    #[must_use]
    pub fn last_login(&self) -> Option<DateTime<Utc>> {
        self.last_login
    }

    #[must_use]
    pub fn disabled_state(&self) -> &UserDisabledState {
        &self.disabled_state
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled_state.is_disabled()
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.local
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.user_name.is_root()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        Role::is_admin(&self.roles)
    }

    #[must_use]
    pub fn identities(&self) -> &HashSet<LinkedIdentity> {
        &self.identities
    }

    /// Find this user's linked identity matching a remote identity by its
    /// provider-scoped id, ignoring the display details.
    #[must_use]
    pub fn identity_for(&self, remote: &RemoteIdentity) -> Option<&LinkedIdentity> {
        self.identities
            .iter()
            .find(|i| i.remote_id() == remote.remote_id())
    }

    /// The union of the included sets of the user's roles.
    #[must_use]
    pub fn included_roles(&self) -> HashSet<Role> {
        self.roles
            .iter()
            .flat_map(|r| r.included().iter().copied())
            .collect()
    }

    /// The roles this user may grant to or remove from other users.
    #[must_use]
    pub fn grantable_roles(&self) -> HashSet<Role> {
        self.roles
            .iter()
            .flat_map(|r| r.grantable().iter().copied())
            .collect()
    }

    // Mutators for storage implementations. The public surface stays
    // immutable; external callers go through the engine.

    pub(crate) fn set_roles(&mut self, roles: HashSet<Role>) {
        self.roles = roles;
    }

    pub(crate) fn set_custom_roles(&mut self, custom_roles: HashSet<String>) {
        self.custom_roles = custom_roles;
    }

    pub(crate) fn set_disabled_state(&mut self, state: UserDisabledState) {
        self.disabled_state = state;
    }

    pub(crate) fn set_last_login(&mut self, time: DateTime<Utc>) {
        self.last_login = Some(time);
    }

    pub(crate) fn set_display_name(&mut self, display_name: DisplayName) {
        self.display_name = display_name;
    }

    pub(crate) fn set_email(&mut self, email: EmailAddress) {
        self.email = email;
    }

    pub(crate) fn add_identity(&mut self, identity: LinkedIdentity) {
        self.identities.insert(identity);
    }

    pub(crate) fn remove_identity(&mut self, id: Uuid) {
        self.identities.retain(|i| i.local_id() != id);
    }
}

/// Password material and reset state for a local user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalUser {
    user: AuthUser,
    password_hash: Vec<u8>,
    salt: Vec<u8>,
    force_reset: bool,
    last_reset: Option<DateTime<Utc>>,
}

impl LocalUser {
    /// # Errors
    /// `IllegalParameter` if the hash is under 10 bytes or the salt under 2,
    /// or if the wrapped user is not local.
    pub fn new(
        user: AuthUser,
        password_hash: Vec<u8>,
        salt: Vec<u8>,
        force_reset: bool,
        last_reset: Option<DateTime<Utc>>,
    ) -> Result<Self, AuthError> {
        if !user.is_local() {
            return Err(AuthError::IllegalParameter(
                "user is not a local user".to_string(),
            ));
        }
        if password_hash.len() < 10 {
            return Err(AuthError::IllegalParameter(
                "password hash missing or too small".to_string(),
            ));
        }
        if salt.len() < 2 {
            return Err(AuthError::IllegalParameter(
                "salt missing or too small".to_string(),
            ));
        }
        Ok(Self {
            user,
            password_hash,
            salt,
            force_reset,
            last_reset,
        })
    }

    #[must_use]
    pub fn user(&self) -> &AuthUser {
        &self.user
    }

    #[must_use]
    pub fn user_name(&self) -> &UserName {
        self.user.user_name()
    }

    #[must_use]
    pub fn password_hash(&self) -> &[u8] {
        &self.password_hash
    }

    #[must_use]
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Whether the user must reset their password before logging in.
    #[must_use]
    pub fn reset_required(&self) -> bool {
        self.force_reset
    }

    #[must_use]
    pub fn last_reset(&self) -> Option<DateTime<Utc>> {
        self.last_reset
    }
}

/// A standard user to be created, linked to exactly one remote identity.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub user_name: UserName,
    pub email: EmailAddress,
    pub display_name: DisplayName,
    pub identity: LinkedIdentity,
    pub last_login: Option<DateTime<Utc>>,
}

/// A local user to be created.
#[derive(Clone, Debug)]
pub struct NewLocalUser {
    pub user_name: UserName,
    pub email: EmailAddress,
    pub display_name: DisplayName,
    pub roles: HashSet<Role>,
    pub password_hash: Vec<u8>,
    pub salt: Vec<u8>,
    pub force_reset: bool,
}

/// Self-service changes to a user's display name and email. An empty update
/// is a no-op the engine never forwards to storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserUpdate {
    display_name: Option<DisplayName>,
    email: Option<EmailAddress>,
}

impl UserUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: DisplayName) -> Self {
        self.display_name = Some(display_name);
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: EmailAddress) -> Self {
        self.email = Some(email);
        self
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&DisplayName> {
        self.display_name.as_ref()
    }

    #[must_use]
    pub fn email(&self) -> Option<&EmailAddress> {
        self.email.as_ref()
    }

    #[must_use]
    pub fn has_updates(&self) -> bool {
        self.display_name.is_some() || self.email.is_some()
    }
}

/// A restricted view of a user, for one user viewing another. The email
/// address is visible only to the account owner.
#[derive(Clone, Debug)]
pub struct ViewableUser {
    user: AuthUser,
    own_account: bool,
}

impl ViewableUser {
    #[must_use]
    pub fn new(user: AuthUser, own_account: bool) -> Self {
        Self { user, own_account }
    }

    #[must_use]
    pub fn user_name(&self) -> &UserName {
        self.user.user_name()
    }

    #[must_use]
    pub fn display_name(&self) -> &DisplayName {
        self.user.display_name()
    }

    #[must_use]
    pub fn email(&self) -> Option<&EmailAddress> {
        self.own_account.then(|| self.user.email())
    }

    #[must_use]
    pub fn is_own_account(&self) -> bool {
        self.own_account
    }
}

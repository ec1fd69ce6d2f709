//! Built-in and custom roles.

use std::collections::HashSet;

use crate::error::AuthError;

/// The built-in roles.
///
/// The grant hierarchy is fixed: root grants create-administrator,
/// create-administrator grants administrator, and administrator grants the
/// token-creation roles. A role's *included* set is the set of roles it
/// implicitly satisfies when authorization checks run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Root,
    CreateAdmin,
    Admin,
    DevToken,
    ServToken,
}

impl Role {
    /// All built-in roles.
    pub const ALL: [Role; 5] = [
        Role::Root,
        Role::CreateAdmin,
        Role::Admin,
        Role::DevToken,
        Role::ServToken,
    ];

    /// Stable identifier used in storage and on the wire.
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            Self::Root => "Root",
            Self::CreateAdmin => "CreateAdmin",
            Self::Admin => "Admin",
            Self::DevToken => "DevToken",
            Self::ServToken => "ServToken",
        }
    }

    /// Human-readable description used in error messages.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Root => "Root",
            Self::CreateAdmin => "Create administrator",
            Self::Admin => "Administrator",
            Self::DevToken => "Create developer tokens",
            Self::ServToken => "Create server tokens",
        }
    }

    /// The roles this role implicitly satisfies, including itself.
    #[must_use]
    pub fn included(&self) -> &'static [Role] {
        match self {
            Self::Root => &[Role::Root],
            Self::CreateAdmin => &[Role::CreateAdmin],
            Self::Admin => &[Role::Admin, Role::DevToken, Role::ServToken],
            Self::DevToken => &[Role::DevToken],
            Self::ServToken => &[Role::ServToken, Role::DevToken],
        }
    }

    /// The roles this role is permitted to grant to (or remove from) others.
    #[must_use]
    pub fn grantable(&self) -> &'static [Role] {
        match self {
            Self::Root => &[Role::CreateAdmin],
            Self::CreateAdmin => &[Role::Admin],
            Self::Admin => &[Role::DevToken, Role::ServToken],
            Self::DevToken | Self::ServToken => &[],
        }
    }

    /// Whether a role set satisfies this role via the included sets.
    #[must_use]
    pub fn is_satisfied_by(&self, roles: &HashSet<Role>) -> bool {
        roles.iter().any(|r| r.included().contains(self))
    }

    /// Whether the role set carries any administrative privilege.
    #[must_use]
    pub fn is_admin(roles: &HashSet<Role>) -> bool {
        roles
            .iter()
            .any(|r| matches!(r, Role::Root | Role::CreateAdmin | Role::Admin))
    }
}

/// An administrator-defined role: an opaque tag with no built-in privileges.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CustomRole {
    id: String,
    description: String,
}

impl CustomRole {
    pub const MAX_ID_LEN: usize = 100;

    /// # Errors
    /// `MissingParameter` for blank fields, `IllegalParameter` for an id that
    /// is not lowercase alphanumeric or is too long.
    pub fn new(id: &str, description: &str) -> Result<Self, AuthError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AuthError::MissingParameter("custom role id".to_string()));
        }
        if id.len() > Self::MAX_ID_LEN {
            return Err(AuthError::IllegalParameter(format!(
                "custom role id exceeds maximum length of {}",
                Self::MAX_ID_LEN
            )));
        }
        if !id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(AuthError::IllegalParameter(format!(
                "Illegal custom role id: {id}"
            )));
        }
        let description = description.trim();
        if description.is_empty() {
            return Err(AuthError::MissingParameter(
                "custom role description".to_string(),
            ));
        }
        Ok(Self {
            id: id.to_string(),
            description: description.to_string(),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

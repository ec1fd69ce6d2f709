//! User search specifications.

use std::collections::HashSet;

use crate::types::role::Role;

/// What to search for when looking up user display names.
///
/// A spec carries either a literal prefix (the form non-admins may use) or a
/// full regex (engine-internal, used by the username-suggestion algorithm),
/// plus flags for which fields to match and optional role filters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserSearchSpec {
    prefix: Option<String>,
    regex: Option<String>,
    search_user_name: bool,
    search_display_name: bool,
    roles: HashSet<Role>,
    custom_roles: HashSet<String>,
}

impl UserSearchSpec {
    #[must_use]
    pub fn builder() -> UserSearchSpecBuilder {
        UserSearchSpecBuilder {
            spec: Self::default(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    #[must_use]
    pub fn regex(&self) -> Option<&str> {
        self.regex.as_deref()
    }

    #[must_use]
    pub fn has_search_string(&self) -> bool {
        self.prefix.is_some() || self.regex.is_some()
    }

    #[must_use]
    pub fn search_user_name(&self) -> bool {
        self.search_user_name
    }

    #[must_use]
    pub fn search_display_name(&self) -> bool {
        self.search_display_name
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
    pub fn is_role_search(&self) -> bool {
        !self.roles.is_empty()
    }

    #[must_use]
    pub fn is_custom_role_search(&self) -> bool {
        !self.custom_roles.is_empty()
    }
}

pub struct UserSearchSpecBuilder {
    spec: UserSearchSpec,
}

impl UserSearchSpecBuilder {
    /// Search on a literal name prefix. Replaces any regex.
    #[must_use]
    pub fn with_search_prefix(mut self, prefix: &str) -> Self {
        self.spec.prefix = Some(prefix.to_string());
        self.spec.regex = None;
        self
    }

    /// Search on a full regex. Engine-internal; not reachable through the
    /// admin search surface.
    #[must_use]
    pub(crate) fn with_search_regex(mut self, regex: &str) -> Self {
        self.spec.regex = Some(regex.to_string());
        self.spec.prefix = None;
        self
    }

    #[must_use]
    pub fn with_search_on_user_name(mut self, search: bool) -> Self {
        self.spec.search_user_name = search;
        self
    }

    #[must_use]
    pub fn with_search_on_display_name(mut self, search: bool) -> Self {
        self.spec.search_display_name = search;
        self
    }

    #[must_use]
    pub fn with_search_on_role(mut self, role: Role) -> Self {
        self.spec.roles.insert(role);
        self
    }

    #[must_use]
    pub fn with_search_on_custom_role(mut self, role_id: &str) -> Self {
        self.spec.custom_roles.insert(role_id.to_string());
        self
    }

    #[must_use]
    pub fn build(self) -> UserSearchSpec {
        self.spec
    }
}

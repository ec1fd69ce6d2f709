//! Third-party identities returned by OAuth2 providers.

use uuid::Uuid;

use crate::error::AuthError;

/// A provider-scoped identity id: the provider's name plus the identity id
/// the provider assigns. At most one local user may hold a given id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteIdentityId {
    provider: String,
    id: String,
}

impl RemoteIdentityId {
    /// # Errors
    /// `MissingParameter` if either part is blank.
    pub fn new(provider: &str, id: &str) -> Result<Self, AuthError> {
        let provider = provider.trim();
        if provider.is_empty() {
            return Err(AuthError::MissingParameter("provider".to_string()));
        }
        let id = id.trim();
        if id.is_empty() {
            return Err(AuthError::MissingParameter("remote identity id".to_string()));
        }
        Ok(Self {
            provider: provider.to_string(),
            id: id.to_string(),
        })
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Display details a provider reports for an identity. Providers routinely
/// omit fields, so all are optional; blank values normalize to absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RemoteIdentityDetails {
    username: Option<String>,
    full_name: Option<String>,
    email: Option<String>,
}

impl RemoteIdentityDetails {
    #[must_use]
    pub fn new(
        username: Option<&str>,
        full_name: Option<&str>,
        email: Option<&str>,
    ) -> Self {
        Self {
            username: normalize(username),
            full_name: normalize(full_name),
            email: normalize(email),
        }
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn full_name(&self) -> Option<&str> {
        self.full_name.as_deref()
    }

    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// An identity as reported by a provider, not yet tied to a local account.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteIdentity {
    remote_id: RemoteIdentityId,
    details: RemoteIdentityDetails,
}

impl RemoteIdentity {
    #[must_use]
    pub fn new(remote_id: RemoteIdentityId, details: RemoteIdentityDetails) -> Self {
        Self { remote_id, details }
    }

    #[must_use]
    pub fn remote_id(&self) -> &RemoteIdentityId {
        &self.remote_id
    }

    #[must_use]
    pub fn details(&self) -> &RemoteIdentityDetails {
        &self.details
    }

    /// Attach a freshly minted local id.
    #[must_use]
    pub fn with_new_id(self) -> LinkedIdentity {
        LinkedIdentity {
            local_id: Uuid::new_v4(),
            identity: self,
        }
    }

}

/// A remote identity plus the locally assigned id used to reference it in
/// link/unlink operations and deferred login state.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LinkedIdentity {
    local_id: Uuid,
    identity: RemoteIdentity,
}

impl LinkedIdentity {
    #[must_use]
    pub fn local_id(&self) -> Uuid {
        self.local_id
    }

    #[must_use]
    pub fn identity(&self) -> &RemoteIdentity {
        &self.identity
    }

    #[must_use]
    pub fn remote_id(&self) -> &RemoteIdentityId {
        self.identity.remote_id()
    }
}

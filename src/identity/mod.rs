//! Identity provider capability and registry.

pub mod globus;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::AuthError;
use crate::types::RemoteIdentity;

pub use globus::GlobusIdentityProvider;

/// Static configuration for one identity provider instance.
#[derive(Clone, Debug)]
pub struct IdentityProviderConfig {
    name: String,
    login_url: Url,
    api_url: Url,
    client_id: String,
    client_secret: String,
    image_uri: String,
    login_redirect_url: Url,
    link_redirect_url: Url,
    custom: HashMap<String, String>,
}

impl IdentityProviderConfig {
    /// # Errors
    /// `MissingParameter` for blank name, client id, client secret, or image
    /// URI.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        login_url: Url,
        api_url: Url,
        client_id: &str,
        client_secret: &str,
        image_uri: &str,
        login_redirect_url: Url,
        link_redirect_url: Url,
        custom: HashMap<String, String>,
    ) -> Result<Self, AuthError> {
        for (value, what) in [
            (name, "provider name"),
            (client_id, "client id"),
            (client_secret, "client secret"),
            (image_uri, "image uri"),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::MissingParameter(what.to_string()));
            }
        }
        Ok(Self {
            name: name.trim().to_string(),
            login_url,
            api_url,
            client_id: client_id.trim().to_string(),
            client_secret: client_secret.to_string(),
            image_uri: image_uri.trim().to_string(),
            login_redirect_url,
            link_redirect_url,
            custom,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn login_url(&self) -> &Url {
        &self.login_url
    }

    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn image_uri(&self) -> &str {
        &self.image_uri
    }

    #[must_use]
    pub fn login_redirect_url(&self) -> &Url {
        &self.login_redirect_url
    }

    #[must_use]
    pub fn link_redirect_url(&self) -> &Url {
        &self.link_redirect_url
    }

    /// Provider-specific settings, e.g. `ignore-secondary-identities`.
    #[must_use]
    pub fn custom(&self) -> &HashMap<String, String> {
        &self.custom
    }
}

/// A third-party OAuth2 identity provider.
///
/// Implementations build the authorize redirect and convert an authorization
/// code into the set of identities the provider reports for the account.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Case-sensitive, registry-unique provider name.
    fn provider_name(&self) -> &str;

    /// URI of an image to display for this provider.
    fn image_uri(&self) -> &str;

    /// The authorize URL to redirect the user's browser to. `link` selects
    /// the link redirect target instead of the login one.
    fn login_url(&self, state: &str, link: bool) -> Url;

    /// Exchange an authorization code for the remote identities it grants
    /// access to.
    async fn get_identities(
        &self,
        authcode: &str,
        link: bool,
    ) -> Result<HashSet<RemoteIdentity>, AuthError>;
}

/// Name-keyed provider lookup, frozen at construction.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    // Registration order is the display order for provider listings.
    order: Vec<String>,
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    /// # Errors
    /// `IllegalParameter` on duplicate provider names.
    pub fn new(providers: Vec<Arc<dyn IdentityProvider>>) -> Result<Self, AuthError> {
        let mut registry = Self::default();
        for provider in providers {
            let name = provider.provider_name().to_string();
            if registry.providers.contains_key(&name) {
                return Err(AuthError::IllegalParameter(format!(
                    "Provider already registered: {name}"
                )));
            }
            registry.order.push(name.clone());
            registry.providers.insert(name, provider);
        }
        Ok(registry)
    }

    /// # Errors
    /// `NoSuchProvider` for unknown names.
    pub fn get(&self, name: &str) -> Result<&Arc<dyn IdentityProvider>, AuthError> {
        self.providers
            .get(name)
            .ok_or_else(|| AuthError::NoSuchProvider(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Provider names in registration order.
    #[must_use]
    pub fn provider_names(&self) -> &[String] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::{
        IdentityProvider, IdentityProviderConfig, ProviderRegistry,
    };
    use crate::error::AuthError;
    use crate::types::RemoteIdentity;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use url::Url;

    struct FakeProvider(&'static str);

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn provider_name(&self) -> &str {
            self.0
        }

        fn image_uri(&self) -> &str {
            "http://image.com"
        }

        fn login_url(&self, _state: &str, _link: bool) -> Url {
            Url::parse("https://login.com").unwrap()
        }

        async fn get_identities(
            &self,
            _authcode: &str,
            _link: bool,
        ) -> Result<HashSet<RemoteIdentity>, AuthError> {
            Ok(HashSet::new())
        }
    }

    #[test]
    fn registry_resolves_by_exact_name() {
        let registry = ProviderRegistry::new(vec![
            Arc::new(FakeProvider("Globus")),
            Arc::new(FakeProvider("Google")),
        ])
        .unwrap();
        assert!(registry.get("Globus").is_ok());
        assert!(registry.contains("Google"));
        assert_eq!(registry.provider_names(), ["Globus", "Google"]);
        assert!(matches!(
            registry.get("globus"),
            Err(AuthError::NoSuchProvider(_))
        ));
    }

    #[test]
    fn registry_rejects_duplicates() {
        let result = ProviderRegistry::new(vec![
            Arc::new(FakeProvider("Globus")),
            Arc::new(FakeProvider("Globus")),
        ]);
        assert!(matches!(result, Err(AuthError::IllegalParameter(_))));
    }

    #[test]
    fn config_rejects_blank_fields() {
        let url = Url::parse("https://login.com").unwrap();
        let result = IdentityProviderConfig::new(
            "  ",
            url.clone(),
            url.clone(),
            "id",
            "secret",
            "http://image.com",
            url.clone(),
            url,
            HashMap::new(),
        );
        assert!(matches!(result, Err(AuthError::MissingParameter(_))));
    }
}

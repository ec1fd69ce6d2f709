//! Shared fixtures for the integration tests: an in-memory engine wired to a
//! scriptable identity provider.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use url::Url;

use identeco::auth::Authentication;
use identeco::error::AuthError;
use identeco::identity::{IdentityProvider, ProviderRegistry};
use identeco::storage::{MemoryStorage, Storage};
use identeco::types::{
    AuthConfig, AuthConfigSet, DisplayName, EmailAddress, ProviderConfig, RemoteIdentity,
    RemoteIdentityDetails, RemoteIdentityId, UserName,
};

pub const PROVIDER: &str = "FakeProv";

/// An identity provider that returns preconfigured identity sets per
/// authcode.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<HashMap<String, HashSet<RemoteIdentity>>>,
}

impl ScriptedProvider {
    pub async fn respond_to(&self, authcode: &str, identities: HashSet<RemoteIdentity>) {
        self.responses
            .lock()
            .await
            .insert(authcode.to_string(), identities);
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn image_uri(&self) -> &str {
        "http://fake.example.com/image.png"
    }

    fn login_url(&self, state: &str, _link: bool) -> Url {
        let mut url = Url::parse("https://fake.example.com/authorize").unwrap();
        url.query_pairs_mut().append_pair("state", state);
        url
    }

    async fn get_identities(
        &self,
        authcode: &str,
        _link: bool,
    ) -> Result<HashSet<RemoteIdentity>, AuthError> {
        self.responses
            .lock()
            .await
            .get(authcode)
            .cloned()
            .ok_or_else(|| {
                AuthError::IdentityRetrieval(format!("Unknown authcode for {PROVIDER}"))
            })
    }
}

pub struct TestEnv {
    pub auth: Authentication,
    pub storage: Arc<MemoryStorage>,
    pub provider: Arc<ScriptedProvider>,
}

/// An engine over fresh in-memory storage, with the scripted provider
/// enabled and non-admin login switched on or off.
pub async fn test_env(login_allowed: bool) -> TestEnv {
    let storage = Arc::new(MemoryStorage::new());
    // Seed the enabled-provider config before the engine initializes; the
    // engine's own defaults never overwrite existing values.
    storage
        .update_config(
            AuthConfigSet::new(
                AuthConfig::new(
                    login_allowed,
                    HashMap::from([(
                        PROVIDER.to_string(),
                        ProviderConfig {
                            enabled: true,
                            force_login_choice: false,
                            force_link_choice: false,
                        },
                    )]),
                    HashMap::new(),
                ),
                HashMap::new(),
            ),
            true,
        )
        .await
        .unwrap();

    let provider = Arc::new(ScriptedProvider::default());
    let providers: Vec<Arc<dyn IdentityProvider>> = vec![provider.clone()];
    let registry = ProviderRegistry::new(providers).unwrap();
    let engine_storage: Arc<dyn Storage> = storage.clone();
    let auth = Authentication::new(engine_storage, registry, HashMap::new())
        .await
        .unwrap();
    TestEnv {
        auth,
        storage,
        provider,
    }
}

pub fn remote_identity(id: &str, username: &str) -> RemoteIdentity {
    RemoteIdentity::new(
        RemoteIdentityId::new(PROVIDER, id).unwrap(),
        RemoteIdentityDetails::new(Some(username), None, None),
    )
}

pub fn user_name(name: &str) -> UserName {
    UserName::new(name).unwrap()
}

pub fn display_name(name: &str) -> DisplayName {
    DisplayName::new(name).unwrap()
}

pub fn email(addr: &str) -> EmailAddress {
    EmailAddress::new(addr).unwrap()
}

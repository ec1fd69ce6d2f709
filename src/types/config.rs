//! Server configuration values.

use std::collections::HashMap;

/// The configurable token lifetime classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenLifetimeType {
    /// Login tokens.
    Login,
    /// Developer tokens.
    Dev,
    /// Server tokens.
    Serv,
    /// Suggested client-side cache time for token validity checks.
    ExtCache,
}

impl TokenLifetimeType {
    /// Built-in lifetime defaults, in milliseconds.
    #[must_use]
    pub fn default_ms(&self) -> u64 {
        match self {
            Self::Login => 14 * 24 * 60 * 60 * 1000,
            Self::Dev => 90 * 24 * 60 * 60 * 1000,
            Self::Serv => 100_000_000 * 24 * 60 * 60 * 1000,
            Self::ExtCache => 5 * 60 * 1000,
        }
    }
}

/// Per-provider switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Whether the provider is available to external callers at all.
    pub enabled: bool,
    /// Always defer login completion to the account-choice UI, even when a
    /// single unambiguous account matches.
    pub force_login_choice: bool,
    /// Always defer link completion to the identity-choice UI.
    pub force_link_choice: bool,
}

/// The engine's own configuration: global login switch, provider switches,
/// and token lifetimes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthConfig {
    login_allowed: bool,
    providers: HashMap<String, ProviderConfig>,
    token_lifetimes_ms: HashMap<TokenLifetimeType, u64>,
}

impl AuthConfig {
    /// Non-admin login and account creation are disabled by default; a fresh
    /// deployment must be opened up explicitly.
    pub const DEFAULT_LOGIN_ALLOWED: bool = false;

    #[must_use]
    pub fn new(
        login_allowed: bool,
        providers: HashMap<String, ProviderConfig>,
        token_lifetimes_ms: HashMap<TokenLifetimeType, u64>,
    ) -> Self {
        Self {
            login_allowed,
            providers,
            token_lifetimes_ms,
        }
    }

    #[must_use]
    pub fn login_allowed(&self) -> bool {
        self.login_allowed
    }

    /// The config entry for a provider; absent entries read as disabled.
    #[must_use]
    pub fn provider_config(&self, provider: &str) -> ProviderConfig {
        self.providers.get(provider).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn providers(&self) -> &HashMap<String, ProviderConfig> {
        &self.providers
    }

    /// A configured lifetime, falling back to the built-in default.
    #[must_use]
    pub fn token_lifetime_ms(&self, lifetime: TokenLifetimeType) -> u64 {
        self.token_lifetimes_ms
            .get(&lifetime)
            .copied()
            .unwrap_or_else(|| lifetime.default_ms())
    }

    #[must_use]
    pub fn token_lifetimes_ms(&self) -> &HashMap<TokenLifetimeType, u64> {
        &self.token_lifetimes_ms
    }
}

/// The engine configuration plus the external (front-end-facing) values the
/// engine stores but does not interpret.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthConfigSet {
    config: AuthConfig,
    external: HashMap<String, String>,
}

impl AuthConfigSet {
    #[must_use]
    pub fn new(config: AuthConfig, external: HashMap<String, String>) -> Self {
        Self { config, external }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn external(&self) -> &HashMap<String, String> {
        &self.external
    }
}

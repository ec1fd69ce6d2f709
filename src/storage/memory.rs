//! In-memory storage.
//!
//! Backs the test suite and single-process deployments. All state lives in
//! maps behind one async mutex; each trait method is a single critical
//! section, which provides the per-operation atomicity the engine expects.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AuthError;
use crate::storage::{Storage, TemporaryIdentities};
use crate::types::{
    AuthConfig, AuthConfigSet, AuthUser, CustomRole, DisplayName, HashedToken, LinkedIdentity,
    LocalUser, NewLocalUser, NewUser, ProviderConfig, RemoteIdentity, RemoteIdentityId, Role,
    TokenLifetimeType, UserDisabledState, UserName, UserSearchSpec, UserUpdate,
};

#[derive(Clone, Debug)]
struct LocalCredentials {
    password_hash: Vec<u8>,
    salt: Vec<u8>,
    force_reset: bool,
    last_reset: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
struct UserRecord {
    user: AuthUser,
    credentials: Option<LocalCredentials>,
}

/// Stored configuration with per-value presence, so initialization can fill
/// defaults without clobbering values an admin already set.
#[derive(Debug, Default)]
struct StoredConfig {
    login_allowed: Option<bool>,
    providers: HashMap<String, ProviderConfig>,
    lifetimes_ms: HashMap<TokenLifetimeType, u64>,
    external: HashMap<String, String>,
}

impl StoredConfig {
    fn apply(&mut self, config: AuthConfigSet, overwrite: bool) {
        if overwrite || self.login_allowed.is_none() {
            self.login_allowed = Some(config.config().login_allowed());
        }
        for (name, pc) in config.config().providers() {
            if overwrite || !self.providers.contains_key(name) {
                self.providers.insert(name.clone(), *pc);
            }
        }
        for (lifetime, ms) in config.config().token_lifetimes_ms() {
            if overwrite || !self.lifetimes_ms.contains_key(lifetime) {
                self.lifetimes_ms.insert(*lifetime, *ms);
            }
        }
        for (key, value) in config.external() {
            if overwrite || !self.external.contains_key(key) {
                self.external.insert(key.clone(), value.clone());
            }
        }
    }

    fn snapshot(&self) -> AuthConfigSet {
        AuthConfigSet::new(
            AuthConfig::new(
                self.login_allowed.unwrap_or(AuthConfig::DEFAULT_LOGIN_ALLOWED),
                self.providers.clone(),
                self.lifetimes_ms.clone(),
            ),
            self.external.clone(),
        )
    }
}

#[derive(Default)]
struct Inner {
    users: HashMap<UserName, UserRecord>,
    identity_owners: HashMap<RemoteIdentityId, UserName>,
    custom_roles: HashMap<String, CustomRole>,
    tokens: HashMap<String, HashedToken>,
    temporary: HashMap<String, TemporaryIdentities>,
    config: StoredConfig,
}

/// Map-backed [`Storage`] implementation.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn no_such_user(name: &UserName) -> AuthError {
    AuthError::NoSuchUser(name.name().to_string())
}

impl Inner {
    fn user(&self, name: &UserName) -> Result<&UserRecord, AuthError> {
        self.users.get(name).ok_or_else(|| no_such_user(name))
    }

    fn user_mut(&mut self, name: &UserName) -> Result<&mut UserRecord, AuthError> {
        self.users.get_mut(name).ok_or_else(|| no_such_user(name))
    }

    fn credentials_mut(&mut self, name: &UserName) -> Result<&mut LocalCredentials, AuthError> {
        self.user_mut(name)?
            .credentials
            .as_mut()
            .ok_or_else(|| no_such_user(name))
    }
}

fn check_password_material(hash: &[u8], salt: &[u8]) -> Result<(), AuthError> {
    if hash.len() < 10 {
        return Err(AuthError::IllegalParameter(
            "password hash missing or too small".to_string(),
        ));
    }
    if salt.len() < 2 {
        return Err(AuthError::IllegalParameter(
            "salt missing or too small".to_string(),
        ));
    }
    Ok(())
}

/// Matcher for display-name search: a literal prefix matches the user name
/// or any whitespace-separated word of the display name; a regex matches the
/// whole name.
enum NameMatcher {
    Any,
    Prefix(String),
    Pattern(Regex),
}

impl NameMatcher {
    fn build(spec: &UserSearchSpec) -> Result<Self, AuthError> {
        if let Some(regex) = spec.regex() {
            let compiled = Regex::new(regex)
                .map_err(|e| AuthError::Storage(format!("invalid search regex: {e}")))?;
            Ok(Self::Pattern(compiled))
        } else if let Some(prefix) = spec.prefix() {
            Ok(Self::Prefix(prefix.to_lowercase()))
        } else {
            Ok(Self::Any)
        }
    }

    fn matches_user_name(&self, name: &UserName) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => name.name().starts_with(prefix),
            Self::Pattern(regex) => regex.is_match(name.name()),
        }
    }

    fn matches_display_name(&self, name: &DisplayName) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => name
                .name()
                .to_lowercase()
                .split_whitespace()
                .any(|word| word.starts_with(prefix)),
            Self::Pattern(regex) => regex.is_match(name.name()),
        }
    }
}

fn search_matches(spec: &UserSearchSpec, matcher: &NameMatcher, user: &AuthUser) -> bool {
    if spec.has_search_string() {
        // With no field flags, search both fields.
        let on_user = spec.search_user_name() || !spec.search_display_name();
        let on_display = spec.search_display_name() || !spec.search_user_name();
        let hit = (on_user && matcher.matches_user_name(user.user_name()))
            || (on_display && matcher.matches_display_name(user.display_name()));
        if !hit {
            return false;
        }
    }
    if !spec.roles().iter().all(|r| user.roles().contains(r)) {
        return false;
    }
    spec.custom_roles()
        .iter()
        .all(|r| user.custom_roles().contains(r))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_user(&self, user: NewUser) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        if inner.users.contains_key(&user.user_name) {
            return Err(AuthError::UserExists(user.user_name.name().to_string()));
        }
        let remote_id = user.identity.remote_id().clone();
        if inner.identity_owners.contains_key(&remote_id) {
            return Err(AuthError::IdentityLinked(format!(
                "{}/{}",
                remote_id.provider(),
                remote_id.id()
            )));
        }
        let record = AuthUser::new(
            user.user_name.clone(),
            user.email,
            user.display_name,
            HashSet::new(),
            HashSet::new(),
            HashSet::new(),
            Utc::now(),
            user.last_login,
            UserDisabledState::default(),
            false,
            HashSet::from([user.identity]),
        )?;
        inner.identity_owners.insert(remote_id, user.user_name.clone());
        inner.users.insert(
            user.user_name,
            UserRecord {
                user: record,
                credentials: None,
            },
        );
        Ok(())
    }

    async fn create_local_user(&self, user: NewLocalUser) -> Result<(), AuthError> {
        check_password_material(&user.password_hash, &user.salt)?;
        let mut inner = self.inner.lock().await;
        if inner.users.contains_key(&user.user_name) {
            return Err(AuthError::UserExists(user.user_name.name().to_string()));
        }
        let record = AuthUser::new(
            user.user_name.clone(),
            user.email,
            user.display_name,
            user.roles,
            HashSet::new(),
            HashSet::new(),
            Utc::now(),
            None,
            UserDisabledState::default(),
            true,
            HashSet::new(),
        )?;
        inner.users.insert(
            user.user_name,
            UserRecord {
                user: record,
                credentials: Some(LocalCredentials {
                    password_hash: user.password_hash,
                    salt: user.salt,
                    force_reset: user.force_reset,
                    last_reset: None,
                }),
            },
        );
        Ok(())
    }

    async fn get_user(&self, name: &UserName) -> Result<AuthUser, AuthError> {
        let inner = self.inner.lock().await;
        Ok(inner.user(name)?.user.clone())
    }

    async fn get_local_user(&self, name: &UserName) -> Result<LocalUser, AuthError> {
        let inner = self.inner.lock().await;
        let record = inner.user(name)?;
        let creds = record.credentials.as_ref().ok_or_else(|| no_such_user(name))?;
        LocalUser::new(
            record.user.clone(),
            creds.password_hash.clone(),
            creds.salt.clone(),
            creds.force_reset,
            creds.last_reset,
        )
    }

    async fn get_user_by_identity(
        &self,
        identity: &RemoteIdentity,
    ) -> Result<Option<AuthUser>, AuthError> {
        let inner = self.inner.lock().await;
        let Some(owner) = inner.identity_owners.get(identity.remote_id()) else {
            return Ok(None);
        };
        Ok(Some(inner.user(owner)?.user.clone()))
    }

    async fn update_user(&self, name: &UserName, update: UserUpdate) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        let record = inner.user_mut(name)?;
        if let Some(display_name) = update.display_name() {
            record.user.set_display_name(display_name.clone());
        }
        if let Some(email) = update.email() {
            record.user.set_email(email.clone());
        }
        Ok(())
    }

    async fn set_last_login(
        &self,
        name: &UserName,
        time: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        inner.user_mut(name)?.user.set_last_login(time);
        Ok(())
    }

    async fn disable_account(
        &self,
        name: &UserName,
        admin: &UserName,
        reason: &str,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        inner
            .user_mut(name)?
            .user
            .set_disabled_state(UserDisabledState::disabled(reason, admin.clone(), Utc::now()));
        Ok(())
    }

    async fn enable_account(&self, name: &UserName, admin: &UserName) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        inner
            .user_mut(name)?
            .user
            .set_disabled_state(UserDisabledState::enabled(admin.clone(), Utc::now()));
        Ok(())
    }

    async fn change_password(
        &self,
        name: &UserName,
        hash: &[u8],
        salt: &[u8],
        force_reset: bool,
    ) -> Result<(), AuthError> {
        check_password_material(hash, salt)?;
        let mut inner = self.inner.lock().await;
        let creds = inner.credentials_mut(name)?;
        creds.password_hash = hash.to_vec();
        creds.salt = salt.to_vec();
        creds.force_reset = force_reset;
        creds.last_reset = Some(Utc::now());
        Ok(())
    }

    async fn force_password_reset(&self, name: &UserName) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        inner.credentials_mut(name)?.force_reset = true;
        Ok(())
    }

    async fn force_password_reset_all(&self) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        for record in inner.users.values_mut() {
            if let Some(creds) = record.credentials.as_mut() {
                creds.force_reset = true;
            }
        }
        Ok(())
    }

    async fn link(&self, name: &UserName, identity: LinkedIdentity) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        let record = inner.user(name)?;
        if record.user.is_local() {
            return Err(AuthError::LinkFailed(
                "Cannot link identities to local accounts".to_string(),
            ));
        }
        let remote_id = identity.remote_id().clone();
        if inner.identity_owners.contains_key(&remote_id) {
            return Err(AuthError::IdentityLinked(format!(
                "{}/{}",
                remote_id.provider(),
                remote_id.id()
            )));
        }
        inner.identity_owners.insert(remote_id, name.clone());
        inner.user_mut(name)?.user.add_identity(identity);
        Ok(())
    }

    async fn unlink(&self, name: &UserName, id: Uuid) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        let record = inner.user(name)?;
        if record.user.is_local() {
            return Err(AuthError::UnlinkFailed(
                "Local user accounts have no linked identities".to_string(),
            ));
        }
        let Some(identity) = record
            .user
            .identities()
            .iter()
            .find(|i| i.local_id() == id)
        else {
            return Err(AuthError::UnlinkFailed(format!(
                "The user is not linked to identity {id}"
            )));
        };
        if record.user.identities().len() < 2 {
            return Err(AuthError::UnlinkFailed(
                "Removing this identity would leave the user with no identities".to_string(),
            ));
        }
        let remote_id = identity.remote_id().clone();
        inner.identity_owners.remove(&remote_id);
        inner.user_mut(name)?.user.remove_identity(id);
        Ok(())
    }

    async fn get_user_display_names(
        &self,
        names: &HashSet<UserName>,
    ) -> Result<HashMap<UserName, DisplayName>, AuthError> {
        let inner = self.inner.lock().await;
        Ok(names
            .iter()
            .filter_map(|name| {
                inner
                    .users
                    .get(name)
                    .map(|r| (name.clone(), r.user.display_name().clone()))
            })
            .collect())
    }

    async fn search_user_display_names(
        &self,
        spec: &UserSearchSpec,
        limit: Option<usize>,
        include_root: bool,
    ) -> Result<HashMap<UserName, DisplayName>, AuthError> {
        let matcher = NameMatcher::build(spec)?;
        let inner = self.inner.lock().await;
        let mut found = HashMap::new();
        for (name, record) in &inner.users {
            if limit.is_some_and(|l| found.len() >= l) {
                break;
            }
            if name.is_root() && !include_root {
                continue;
            }
            if search_matches(spec, &matcher, &record.user) {
                found.insert(name.clone(), record.user.display_name().clone());
            }
        }
        Ok(found)
    }

    async fn update_roles(
        &self,
        name: &UserName,
        add: &HashSet<Role>,
        remove: &HashSet<Role>,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        let record = inner.user_mut(name)?;
        let mut roles = record.user.roles().clone();
        roles.extend(add.iter().copied());
        roles.retain(|r| !remove.contains(r));
        record.user.set_roles(roles);
        Ok(())
    }

    async fn set_custom_role(&self, role: CustomRole) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        inner.custom_roles.insert(role.id().to_string(), role);
        Ok(())
    }

    async fn delete_custom_role(&self, id: &str) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        if inner.custom_roles.remove(id).is_none() {
            return Err(AuthError::NoSuchRole(id.to_string()));
        }
        for record in inner.users.values_mut() {
            let mut roles = record.user.custom_roles().clone();
            if roles.remove(id) {
                record.user.set_custom_roles(roles);
            }
        }
        Ok(())
    }

    async fn get_custom_roles(&self) -> Result<HashSet<CustomRole>, AuthError> {
        let inner = self.inner.lock().await;
        Ok(inner.custom_roles.values().cloned().collect())
    }

    async fn update_custom_roles(
        &self,
        name: &UserName,
        add: &HashSet<String>,
        remove: &HashSet<String>,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        for id in add.iter().chain(remove.iter()) {
            if !inner.custom_roles.contains_key(id) {
                return Err(AuthError::NoSuchRole(id.clone()));
            }
        }
        let record = inner.user_mut(name)?;
        let mut roles = record.user.custom_roles().clone();
        roles.extend(add.iter().cloned());
        roles.retain(|r| !remove.contains(r));
        record.user.set_custom_roles(roles);
        Ok(())
    }

    async fn store_token(&self, token: HashedToken) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        inner.tokens.insert(token.token_hash().to_string(), token);
        Ok(())
    }

    async fn get_token(&self, token_hash: &str) -> Result<HashedToken, AuthError> {
        let mut inner = self.inner.lock().await;
        let Some(token) = inner.tokens.get(token_hash) else {
            return Err(AuthError::NoSuchToken);
        };
        if token.is_expired(Utc::now()) {
            inner.tokens.remove(token_hash);
            return Err(AuthError::NoSuchToken);
        }
        Ok(inner.tokens[token_hash].clone())
    }

    async fn get_tokens(&self, name: &UserName) -> Result<Vec<HashedToken>, AuthError> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        Ok(inner
            .tokens
            .values()
            .filter(|t| t.user_name() == name && !t.is_expired(now))
            .cloned()
            .collect())
    }

    async fn delete_token(&self, name: &UserName, id: Uuid) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        let Some(hash) = inner
            .tokens
            .iter()
            .find(|(_, t)| t.id() == id && t.user_name() == name)
            .map(|(hash, _)| hash.clone())
        else {
            return Err(AuthError::NoSuchToken);
        };
        inner.tokens.remove(&hash);
        Ok(())
    }

    async fn delete_tokens(&self, name: &UserName) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        inner.tokens.retain(|_, t| t.user_name() != name);
        Ok(())
    }

    async fn delete_all_tokens(&self) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        inner.tokens.clear();
        Ok(())
    }

    async fn store_temporary_identities(
        &self,
        identities: TemporaryIdentities,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        inner
            .temporary
            .insert(identities.token_hash.clone(), identities);
        Ok(())
    }

    async fn get_temporary_identities(
        &self,
        token_hash: &str,
    ) -> Result<Vec<LinkedIdentity>, AuthError> {
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.temporary.get(token_hash) else {
            return Err(AuthError::NoSuchToken);
        };
        if Utc::now() >= stored.expires {
            inner.temporary.remove(token_hash);
            return Err(AuthError::NoSuchToken);
        }
        Ok(stored.identities.clone())
    }

    async fn get_config(&self) -> Result<AuthConfigSet, AuthError> {
        let inner = self.inner.lock().await;
        Ok(inner.config.snapshot())
    }

    async fn update_config(
        &self,
        config: AuthConfigSet,
        overwrite: bool,
    ) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        inner.config.apply(config, overwrite);
        Ok(())
    }
}

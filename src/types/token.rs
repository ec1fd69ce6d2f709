//! Bearer token types.
//!
//! Plaintext token values exist only in [`IncomingToken`], [`NewToken`], and
//! [`TemporaryToken`]; storage only ever sees the SHA-256 hash.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AuthError;
use crate::types::name::UserName;

/// Expiry instant for a lifetime from now. Lifetimes beyond the calendar's
/// range saturate to the far future instead of overflowing.
fn expiry(created: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lifetime)
        .ok()
        .and_then(|delta| created.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Hash a plaintext token for storage lookup.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// The kind of a persisted token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenType {
    /// Issued by a login flow; standard lifetime.
    Login,
    /// Developer or server token; lifetime set by the matching config key.
    ExtendedLifetime,
}

/// A bearer token presented by a client. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct IncomingToken(String);

impl IncomingToken {
    /// Wrap a presented token, stripping surrounding whitespace.
    ///
    /// # Errors
    /// `NoTokenProvided` if nothing remains after trimming.
    pub fn new(token: &str) -> Result<Self, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::NoTokenProvided(
                "No user token provided".to_string(),
            ));
        }
        Ok(Self(token.to_string()))
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn hash(&self) -> String {
        hash_token(&self.0)
    }
}

impl fmt::Debug for IncomingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IncomingToken(<redacted>)")
    }
}

/// The server-side record of a token: everything but the plaintext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashedToken {
    id: Uuid,
    token_type: TokenType,
    name: Option<String>,
    user_name: UserName,
    token_hash: String,
    created: DateTime<Utc>,
    expires: DateTime<Utc>,
}

impl HashedToken {
    #[must_use]
    pub fn new(
        id: Uuid,
        token_type: TokenType,
        name: Option<String>,
        user_name: UserName,
        token_hash: String,
        created: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            token_type,
            name,
            user_name,
            token_hash,
            created,
            expires,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn user_name(&self) -> &UserName {
        &self.user_name
    }

    #[must_use]
    pub fn token_hash(&self) -> &str {
        &self.token_hash
    }

    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    #[must_use]
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }
}

/// A freshly issued token. The plaintext is handed to the caller exactly
/// once; only the hashed form goes to storage.
#[derive(Clone, Debug)]
pub struct NewToken {
    id: Uuid,
    token_type: TokenType,
    name: Option<String>,
    token: String,
    user_name: UserName,
    created: DateTime<Utc>,
    expires: DateTime<Utc>,
}

impl NewToken {
    #[must_use]
    pub fn new(
        token_type: TokenType,
        name: Option<String>,
        token: String,
        user_name: UserName,
        lifetime: Duration,
    ) -> Self {
        let created = Utc::now();
        Self {
            id: Uuid::new_v4(),
            token_type,
            name,
            token,
            user_name,
            created,
            expires: expiry(created, lifetime),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn user_name(&self) -> &UserName {
        &self.user_name
    }

    #[must_use]
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// The storable form of this token.
    #[must_use]
    pub fn hashed(&self) -> HashedToken {
        HashedToken {
            id: self.id,
            token_type: self.token_type,
            name: self.name.clone(),
            user_name: self.user_name.clone(),
            token_hash: hash_token(&self.token),
            created: self.created,
            expires: self.expires,
        }
    }
}

/// A short-lived token carrying deferred login or link state.
#[derive(Clone, Debug)]
pub struct TemporaryToken {
    id: Uuid,
    token: String,
    created: DateTime<Utc>,
    expires: DateTime<Utc>,
}

impl TemporaryToken {
    #[must_use]
    pub fn new(token: String, lifetime: Duration) -> Self {
        let created = Utc::now();
        Self {
            id: Uuid::new_v4(),
            token,
            created,
            expires: expiry(created, lifetime),
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    #[must_use]
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    #[must_use]
    pub fn hash(&self) -> String {
        hash_token(&self.token)
    }
}

/// A user's tokens: the one used to make the request plus all others.
#[derive(Clone, Debug)]
pub struct TokenSet {
    current: HashedToken,
    tokens: Vec<HashedToken>,
}

impl TokenSet {
    /// The current token is removed from the listing if present.
    #[must_use]
    pub fn new(current: HashedToken, mut tokens: Vec<HashedToken>) -> Self {
        tokens.retain(|t| t.id() != current.id());
        Self { current, tokens }
    }

    #[must_use]
    pub fn current(&self) -> &HashedToken {
        &self.current
    }

    #[must_use]
    pub fn tokens(&self) -> &[HashedToken] {
        &self.tokens
    }
}

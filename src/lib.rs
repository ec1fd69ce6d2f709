//! # Identeco (authentication & identity-linking engine)
//!
//! `identeco` brokers login for human users via third-party OAuth2 identity
//! providers and via local password accounts, issues opaque bearer tokens,
//! and exposes user and role administration. Client UIs and downstream
//! services present tokens for validation and user lookup.
//!
//! ## Account model
//!
//! Two kinds of accounts exist. **Standard users** are created and logged in
//! via OAuth2 identity providers and always hold at least one third-party
//! identity. **Local users** have no linked identities and authenticate with
//! a password; they are intended for administrators and owners of
//! long-lived server tokens, not the general population.
//!
//! ## Roles
//!
//! Built-in roles gate engine operations; administrators may also define
//! custom roles and assign them to users as tags. The built-in grant chain
//! is deliberately narrow: root exists only to grant create-administrator,
//! which exists only to grant administrator.
//!
//! ## Tokens
//!
//! All tokens are opaque random strings. Storage only ever sees their
//! SHA-256 hashes, and plaintext values are returned to the caller exactly
//! once. OAuth2 login and link flows that need user interaction park their
//! state under short-lived temporary tokens and resume when the UI calls
//! back; the redirect leg of an OAuth2 flow has no UI in control, so
//! recoverable errors are deferred until one does.
//!
//! The HTTP surface, the persistent store, and concrete crypto primitives
//! are collaborators behind traits; see [`storage::Storage`] and
//! [`identity::IdentityProvider`].

pub mod auth;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod storage;
pub mod types;

pub use auth::{
    Authentication, LinkIdentities, LinkToken, LocalLoginResult, LoginState, LoginToken,
};
pub use error::{AuthError, ErrorKind};

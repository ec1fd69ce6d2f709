//! Crate-wide error taxonomy with stable error codes.
//!
//! Every failure the engine surfaces carries an [`ErrorKind`] so transport
//! layers can map errors to wire codes without string matching. Messages are
//! human-readable and never contain token plaintext or password material.

use thiserror::Error;

/// Stable error classification. The numeric codes are part of the public
/// surface and must never be reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthenticationFailed,
    NoTokenProvided,
    InvalidToken,
    Unauthorized,
    Disabled,
    MissingParameter,
    IllegalParameter,
    UserAlreadyExists,
    IdentityAlreadyLinked,
    NoSuchUser,
    NoSuchToken,
    NoSuchIdentityProvider,
    NoSuchRole,
    LinkFailed,
    UnlinkFailed,
    IdentityRetrievalFailed,
    StorageError,
    ConfigMappingError,
    InternalError,
}

impl ErrorKind {
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::AuthenticationFailed => 10000,
            Self::NoTokenProvided => 10010,
            Self::InvalidToken => 10020,
            Self::Unauthorized => 20000,
            Self::Disabled => 20010,
            Self::MissingParameter => 30000,
            Self::IllegalParameter => 30001,
            Self::UserAlreadyExists => 40000,
            Self::IdentityAlreadyLinked => 40010,
            Self::IdentityRetrievalFailed => 40500,
            Self::NoSuchUser => 50000,
            Self::NoSuchToken => 50010,
            Self::NoSuchIdentityProvider => 50020,
            Self::NoSuchRole => 50030,
            Self::LinkFailed => 60000,
            Self::UnlinkFailed => 60010,
            Self::StorageError => 70000,
            Self::ConfigMappingError => 70010,
            Self::InternalError => 99000,
        }
    }

    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "Authentication failed",
            Self::NoTokenProvided => "No token provided",
            Self::InvalidToken => "Invalid token",
            Self::Unauthorized => "Unauthorized",
            Self::Disabled => "Account disabled",
            Self::MissingParameter => "Missing input parameter",
            Self::IllegalParameter => "Illegal input parameter",
            Self::UserAlreadyExists => "User already exists",
            Self::IdentityAlreadyLinked => "Identity already linked",
            Self::IdentityRetrievalFailed => "Identity retrieval failed",
            Self::NoSuchUser => "No such user",
            Self::NoSuchToken => "No such token",
            Self::NoSuchIdentityProvider => "No such identity provider",
            Self::NoSuchRole => "No such role",
            Self::LinkFailed => "Linking failed",
            Self::UnlinkFailed => "Unlinking failed",
            Self::StorageError => "Auth storage error",
            Self::ConfigMappingError => "External config mapping error",
            Self::InternalError => "Internal error",
        }
    }
}

/// Errors surfaced by the authentication engine and its capabilities.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credential mismatch or unknown identity. Unknown-user and
    /// wrong-password cases share one message to prevent user enumeration.
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    NoTokenProvided(String),
    #[error("Invalid token")]
    InvalidToken,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Disabled(String),
    #[error("Missing input parameter: {0}")]
    MissingParameter(String),
    #[error("{0}")]
    IllegalParameter(String),
    #[error("User already exists: {0}")]
    UserExists(String),
    #[error("Identity is already linked: {0}")]
    IdentityLinked(String),
    #[error("{0}")]
    IdentityRetrieval(String),
    #[error("No such user: {0}")]
    NoSuchUser(String),
    #[error("No such token")]
    NoSuchToken,
    #[error("No such identity provider: {0}")]
    NoSuchProvider(String),
    #[error("No such role: {0}")]
    NoSuchRole(String),
    #[error("{0}")]
    LinkFailed(String),
    #[error("{0}")]
    UnlinkFailed(String),
    #[error("Auth storage error: {0}")]
    Storage(String),
    #[error("External config mapping error: {0}")]
    ConfigMapping(String),
    /// Programmer-invariant violations, e.g. a valid token whose user does
    /// not exist in storage.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Unauthorized with the generic message.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::Unauthorized("Unauthorized".to_string())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication(_) => ErrorKind::AuthenticationFailed,
            Self::NoTokenProvided(_) => ErrorKind::NoTokenProvided,
            Self::InvalidToken => ErrorKind::InvalidToken,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Disabled(_) => ErrorKind::Disabled,
            Self::MissingParameter(_) => ErrorKind::MissingParameter,
            Self::IllegalParameter(_) => ErrorKind::IllegalParameter,
            Self::UserExists(_) => ErrorKind::UserAlreadyExists,
            Self::IdentityLinked(_) => ErrorKind::IdentityAlreadyLinked,
            Self::IdentityRetrieval(_) => ErrorKind::IdentityRetrievalFailed,
            Self::NoSuchUser(_) => ErrorKind::NoSuchUser,
            Self::NoSuchToken => ErrorKind::NoSuchToken,
            Self::NoSuchProvider(_) => ErrorKind::NoSuchIdentityProvider,
            Self::NoSuchRole(_) => ErrorKind::NoSuchRole,
            Self::LinkFailed(_) => ErrorKind::LinkFailed,
            Self::UnlinkFailed(_) => ErrorKind::UnlinkFailed,
            Self::Storage(_) => ErrorKind::StorageError,
            Self::ConfigMapping(_) => ErrorKind::ConfigMappingError,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }
}

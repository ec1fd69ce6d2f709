//! Validated name and address types.
//!
//! All string inputs from the outside world pass through these constructors
//! before the engine or storage sees them.

use std::fmt;

use crate::error::AuthError;

/// Name of the reserved root account. Not a legal user name for anyone else.
const ROOT_NAME: &str = "***ROOT***";

/// A normalized account identifier: a lowercase letter followed by lowercase
/// alphanumerics, at most [`UserName::MAX_LEN`] characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserName(String);

impl UserName {
    pub const MAX_LEN: usize = 100;

    /// Parse and validate a user name. The reserved root name is accepted and
    /// yields the root user name.
    ///
    /// # Errors
    /// `MissingParameter` for blank input, `IllegalParameter` for length or
    /// character violations.
    pub fn new(name: &str) -> Result<Self, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::MissingParameter("user name".to_string()));
        }
        if name == ROOT_NAME {
            return Ok(Self::root());
        }
        if name.len() > Self::MAX_LEN {
            return Err(AuthError::IllegalParameter(format!(
                "user name exceeds maximum length of {}",
                Self::MAX_LEN
            )));
        }
        let mut chars = name.chars();
        let first_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
        if !first_ok || !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(AuthError::IllegalParameter(format!(
                "Illegal user name: {name}"
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// The reserved root account name.
    #[must_use]
    pub fn root() -> Self {
        Self(ROOT_NAME.to_string())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_NAME
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Map arbitrary input to a valid user name, or `None` when nothing
    /// usable remains. Lowercases, drops illegal characters and leading
    /// digits, and truncates to the maximum length.
    #[must_use]
    pub fn sanitize(suggested: &str) -> Option<Self> {
        let cleaned: String = suggested
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .skip_while(char::is_ascii_digit)
            .take(Self::MAX_LEN)
            .collect();
        if cleaned.is_empty() {
            None
        } else {
            Some(Self(cleaned))
        }
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Free-text display name: non-blank, no control characters, at most 100
/// characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DisplayName(String);

impl DisplayName {
    pub const MAX_LEN: usize = 100;

    /// # Errors
    /// `MissingParameter` for blank input, `IllegalParameter` for control
    /// characters or excessive length.
    pub fn new(name: &str) -> Result<Self, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::MissingParameter("display name".to_string()));
        }
        if name.chars().any(char::is_control) {
            return Err(AuthError::IllegalParameter(
                "display name contains control characters".to_string(),
            ));
        }
        if name.chars().count() > Self::MAX_LEN {
            return Err(AuthError::IllegalParameter(format!(
                "display name exceeds maximum length of {}",
                Self::MAX_LEN
            )));
        }
        Ok(Self(name.to_string()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An email address, or the unknown sentinel for accounts without one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EmailAddress {
    Unknown,
    Address(String),
}

impl EmailAddress {
    pub const MAX_LEN: usize = 1000;

    /// Validate an RFC-shaped address.
    ///
    /// # Errors
    /// `MissingParameter` for blank input, `IllegalParameter` otherwise.
    pub fn new(email: &str) -> Result<Self, AuthError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::MissingParameter("email address".to_string()));
        }
        if email.chars().count() > Self::MAX_LEN {
            return Err(AuthError::IllegalParameter(format!(
                "email address exceeds maximum length of {}",
                Self::MAX_LEN
            )));
        }
        if email.chars().any(char::is_control) || !valid_email_shape(email) {
            return Err(AuthError::IllegalParameter(format!(
                "Illegal email address: {email}"
            )));
        }
        Ok(Self::Address(email.to_string()))
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// The address, or `None` for the unknown sentinel.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Unknown => None,
            Self::Address(addr) => Some(addr),
        }
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Address(addr) => f.write_str(addr),
        }
    }
}

fn valid_email_shape(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains(char::is_whitespace)
        && !domain.is_empty()
        && !domain.contains('@')
        && !domain.contains(char::is_whitespace)
        && domain.contains('.')
}

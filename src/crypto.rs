//! Password hashing and random material generation.
//!
//! Passwords are derived with PBKDF2-HMAC-SHA256 and verified with a
//! constant-time comparison. Plaintext passwords travel in [`Password`],
//! which zeroes its buffer on drop.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::{Rng, RngCore, distributions::Alphanumeric};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::AuthError;

const PBKDF2_ITERATIONS: u32 = 20_000;
const DERIVED_KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;
const TOKEN_LEN: usize = 32;

/// A plaintext password. The buffer is zeroed when the value drops, so
/// callers simply let the value go out of scope on every exit path.
pub struct Password(Zeroizing<Vec<u8>>);

impl Password {
    #[must_use]
    pub fn new(password: &str) -> Self {
        Self(Zeroizing::new(password.as_bytes().to_vec()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// PBKDF2-based password hashing and verification.
#[derive(Clone, Copy, Debug, Default)]
pub struct PasswordCrypt;

impl PasswordCrypt {
    /// Derive the stored hash for a password and salt.
    #[must_use]
    pub fn encrypt(&self, password: &[u8], salt: &[u8]) -> Zeroizing<Vec<u8>> {
        let mut derived = Zeroizing::new(vec![0u8; DERIVED_KEY_LEN]);
        pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ITERATIONS, &mut derived);
        derived
    }

    /// Re-derive and compare in constant time.
    #[must_use]
    pub fn authenticate(&self, password: &[u8], expected_hash: &[u8], salt: &[u8]) -> bool {
        let derived = self.encrypt(password, salt);
        derived.ct_eq(expected_hash).into()
    }
}

/// Fresh random salt bytes.
///
/// # Errors
/// `Internal` if the OS random source fails.
pub fn generate_salt() -> Result<Vec<u8>, AuthError> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|_| AuthError::Internal("failed to generate salt".to_string()))?;
    Ok(salt)
}

/// A high-entropy opaque token string.
///
/// # Errors
/// `Internal` if the OS random source fails.
pub fn generate_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; TOKEN_LEN];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| AuthError::Internal("failed to generate token".to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// A random printable password of the given length.
#[must_use]
pub fn generate_temporary_password(len: usize) -> Password {
    let pwd: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect();
    Password::new(&pwd)
}

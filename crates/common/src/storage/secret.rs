//! Zeroizing holder for database encryption keys

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Encryption key that zeroes its memory on drop
///
/// The value is never printed by `Debug`; call [`SecretKey::expose`] only at
/// the point where the key is handed to SQLCipher.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    inner: String,
}

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { inner: key.into() }
    }

    /// Expose the inner value (do not store or log it)
    pub fn expose(&self) -> &str {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(***)")
    }
}

impl From<String> for SecretKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

//! Secret types for keeping key material out of logs.
//!
//! Re-exports [`secrecy`] types plus a helper for the one shape of secret the
//! queue service is configured with: a base64 encoded binary key.
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so any
//! struct that derives `Debug` and holds one is safe to log. The inner value is
//! zeroized on drop.
//!
//! ```rust
//! use common::secret::{decode_base64_secret, ExposeSecret, SecretString};
//!
//! let encoded = SecretString::from("AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=");
//! let key = decode_base64_secret(&encoded).unwrap();
//! assert_eq!(key.expose_secret().len(), 32);
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Failure to turn an encoded secret into key bytes.
///
/// Deliberately carries no part of the input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecretDecodeError {
    #[error("secret is empty")]
    Empty,

    #[error("secret is not valid base64")]
    InvalidEncoding,
}

/// Decode a base64 (standard alphabet, padded) secret into raw key bytes.
///
/// # Errors
///
/// Returns [`SecretDecodeError::Empty`] for a blank value and
/// [`SecretDecodeError::InvalidEncoding`] if the value is not base64.
pub fn decode_base64_secret(
    encoded: &SecretString,
) -> Result<SecretBox<Vec<u8>>, SecretDecodeError> {
    let trimmed = encoded.expose_secret().trim();
    if trimmed.is_empty() {
        return Err(SecretDecodeError::Empty);
    }

    let bytes = STANDARD
        .decode(trimmed)
        .map_err(|_| SecretDecodeError::InvalidEncoding)?;

    Ok(SecretBox::new(Box::new(bytes)))
}

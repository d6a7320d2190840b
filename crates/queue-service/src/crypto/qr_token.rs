//! Signed check-in tokens rendered as QR codes.
//!
//! Token format: `base64url(payload_json) "." base64url(HMAC-SHA256(key, base64url(payload_json)))`,
//! both segments unpadded. The MAC covers the encoded payload segment exactly
//! as transmitted, so verification never has to re-serialize anything.
//!
//! # Security Properties
//!
//! - MAC comparison is constant time (`ring::hmac::verify`)
//! - The payload is only decoded after the MAC has been verified
//! - Every rejection surfaces as the same [`InvalidQrToken`] error
//! - Oversized input is rejected before any decoding
//!
//! The codec knows nothing about queue state. Replay protection and expiry are
//! enforced against the stored nonce by the queue engine.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use common::secret::{decode_base64_secret, ExposeSecret, SecretBox, SecretString};
use ring::{
    hmac,
    rand::{SecureRandom, SystemRandom},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Minimum signing key length in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Tokens longer than this are rejected without decoding. A real token is
/// around 150 bytes.
pub const MAX_TOKEN_SIZE_BYTES: usize = 1024;

/// Nonce length in bytes before hex encoding.
pub const NONCE_BYTES: usize = 16;

/// Claims bound into a check-in token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QrTokenPayload {
    #[serde(rename = "eid")]
    pub entry_id: Uuid,

    #[serde(rename = "n")]
    pub nonce: String,

    /// Unix seconds.
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

/// Errors constructing the codec or producing a token.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("signing secret must be at least {MIN_SECRET_LENGTH} bytes, got {0}")]
    SecretTooShort(usize),

    #[error("signing secret could not be decoded: {0}")]
    SecretEncoding(String),

    #[error("random number generation failed")]
    Rng,

    #[error("token encoding failed: {0}")]
    Encode(String),
}

/// The only error [`QrTokenCodec::verify`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid or expired token")]
pub struct InvalidQrToken;

/// Signs and verifies check-in tokens with a process-wide HMAC key.
pub struct QrTokenCodec {
    key: hmac::Key,
    rng: SystemRandom,
}

impl fmt::Debug for QrTokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QrTokenCodec")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl QrTokenCodec {
    /// Build a codec from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::SecretTooShort` if the key is shorter than
    /// [`MIN_SECRET_LENGTH`].
    pub fn new(secret: SecretBox<Vec<u8>>) -> Result<Self, CodecError> {
        let bytes = secret.expose_secret();
        if bytes.len() < MIN_SECRET_LENGTH {
            return Err(CodecError::SecretTooShort(bytes.len()));
        }

        Ok(Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, bytes),
            rng: SystemRandom::new(),
        })
    }

    /// Build a codec from a base64 encoded key, as found in configuration.
    pub fn from_base64_secret(encoded: &SecretString) -> Result<Self, CodecError> {
        let secret =
            decode_base64_secret(encoded).map_err(|e| CodecError::SecretEncoding(e.to_string()))?;
        Self::new(secret)
    }

    /// Produce a signed token for the payload.
    pub fn sign(&self, payload: &QrTokenPayload) -> Result<String, CodecError> {
        let json = serde_json::to_vec(payload).map_err(|e| CodecError::Encode(e.to_string()))?;
        let encoded_payload = URL_SAFE_NO_PAD.encode(json);
        let mac = self.mac_segment(&encoded_payload);
        Ok(format!("{encoded_payload}.{mac}"))
    }

    /// Verify a token's MAC and return its payload.
    pub fn verify(&self, token: &str) -> Result<QrTokenPayload, InvalidQrToken> {
        if token.len() > MAX_TOKEN_SIZE_BYTES {
            return Err(InvalidQrToken);
        }

        let (encoded_payload, encoded_mac) = token.split_once('.').ok_or(InvalidQrToken)?;
        if encoded_payload.is_empty() || encoded_mac.contains('.') {
            return Err(InvalidQrToken);
        }

        let mac = URL_SAFE_NO_PAD
            .decode(encoded_mac)
            .map_err(|_| InvalidQrToken)?;

        hmac::verify(&self.key, encoded_payload.as_bytes(), &mac).map_err(|_| InvalidQrToken)?;

        let json = URL_SAFE_NO_PAD
            .decode(encoded_payload)
            .map_err(|_| InvalidQrToken)?;

        serde_json::from_slice(&json).map_err(|_| InvalidQrToken)
    }

    /// Fresh random nonce, hex encoded.
    pub fn generate_nonce(&self) -> Result<String, CodecError> {
        let mut bytes = [0u8; NONCE_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| CodecError::Rng)?;
        Ok(hex::encode(bytes))
    }

    fn mac_segment(&self, encoded_payload: &str) -> String {
        let tag = hmac::sign(&self.key, encoded_payload.as_bytes());
        URL_SAFE_NO_PAD.encode(tag.as_ref())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    fn codec_with(byte: u8) -> QrTokenCodec {
        QrTokenCodec::new(SecretBox::new(Box::new(vec![byte; 32]))).unwrap()
    }

    fn sample_payload(codec: &QrTokenCodec) -> QrTokenPayload {
        QrTokenPayload {
            entry_id: Uuid::new_v4(),
            nonce: codec.generate_nonce().unwrap(),
            expires_at: 1_900_000_000,
        }
    }

    #[test]
    fn test_sign_then_verify_returns_payload() {
        let codec = codec_with(7);
        let payload = sample_payload(&codec);

        let token = codec.sign(&payload).unwrap();
        let verified = codec.verify(&token).unwrap();

        assert_eq!(verified, payload);
    }

    #[test]
    fn test_token_shape() {
        let codec = codec_with(7);
        let token = codec.sign(&sample_payload(&codec)).unwrap();

        assert_eq!(token.matches('.').count(), 1);
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert!(token.len() < MAX_TOKEN_SIZE_BYTES);
    }

    #[test]
    fn test_flipping_any_byte_fails_verification() {
        let codec = codec_with(7);
        let token = codec.sign(&sample_payload(&codec)).unwrap();
        let bytes = token.as_bytes();

        for i in 0..bytes.len() {
            for flip in [0x01u8, 0x20] {
                let mut tampered = bytes.to_vec();
                tampered[i] ^= flip;
                let Ok(tampered) = String::from_utf8(tampered) else {
                    continue;
                };
                assert_eq!(
                    codec.verify(&tampered),
                    Err(InvalidQrToken),
                    "tampering byte {i} with {flip:#x} was accepted"
                );
            }
        }
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = codec_with(7);
        let verifier = codec_with(8);
        let token = signer.sign(&sample_payload(&signer)).unwrap();

        assert_eq!(verifier.verify(&token), Err(InvalidQrToken));
    }

    #[test]
    fn test_malformed_structure_rejected() {
        let codec = codec_with(7);
        let token = codec.sign(&sample_payload(&codec)).unwrap();
        let (payload, mac) = token.split_once('.').unwrap();

        let cases = [
            String::new(),
            ".".to_string(),
            payload.to_string(),
            format!("{payload}."),
            format!(".{mac}"),
            format!("{payload}.{mac}.{mac}"),
            format!("{payload}.!!not-base64!!"),
            format!("{payload}{mac}"),
        ];

        for case in cases {
            assert_eq!(codec.verify(&case), Err(InvalidQrToken), "accepted {case:?}");
        }
    }

    #[test]
    fn test_valid_mac_over_garbage_payload_rejected() {
        let codec = codec_with(7);
        let encoded = URL_SAFE_NO_PAD.encode(b"not json");
        let token = format!("{encoded}.{}", codec.mac_segment(&encoded));

        assert_eq!(codec.verify(&token), Err(InvalidQrToken));
    }

    #[test]
    fn test_unknown_payload_fields_rejected() {
        let codec = codec_with(7);
        let json = format!(
            r#"{{"eid":"{}","n":"abc","exp":1,"role":"provider"}}"#,
            Uuid::new_v4()
        );
        let encoded = URL_SAFE_NO_PAD.encode(json);
        let token = format!("{encoded}.{}", codec.mac_segment(&encoded));

        assert_eq!(codec.verify(&token), Err(InvalidQrToken));
    }

    #[test]
    fn test_oversized_token_rejected() {
        let codec = codec_with(7);
        let token = "a".repeat(MAX_TOKEN_SIZE_BYTES + 1);

        assert_eq!(codec.verify(&token), Err(InvalidQrToken));
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = QrTokenCodec::new(SecretBox::new(Box::new(vec![1u8; 31]))).unwrap_err();
        assert!(matches!(err, CodecError::SecretTooShort(31)));
    }

    #[test]
    fn test_from_base64_secret() {
        let encoded = SecretString::from(STANDARD.encode([9u8; 48]));
        assert!(QrTokenCodec::from_base64_secret(&encoded).is_ok());

        let short = SecretString::from(STANDARD.encode([9u8; 16]));
        assert!(matches!(
            QrTokenCodec::from_base64_secret(&short),
            Err(CodecError::SecretTooShort(16))
        ));

        let garbage = SecretString::from("***");
        assert!(matches!(
            QrTokenCodec::from_base64_secret(&garbage),
            Err(CodecError::SecretEncoding(_))
        ));
    }

    #[test]
    fn test_nonces_are_hex_and_unique() {
        let codec = codec_with(7);
        let a = codec.generate_nonce().unwrap();
        let b = codec.generate_nonce().unwrap();

        assert_eq!(a.len(), NONCE_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_error_message_is_generic() {
        assert_eq!(InvalidQrToken.to_string(), "invalid or expired token");
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", codec_with(7));
        assert!(debug.contains("[REDACTED]"));
    }
}

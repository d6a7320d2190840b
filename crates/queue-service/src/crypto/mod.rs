//! Cryptographic primitives for the queue service.

pub mod qr_token;

pub use qr_token::{CodecError, InvalidQrToken, QrTokenCodec, QrTokenPayload};

//! Binary/text codecs used to store nonces and ciphertexts as JSON strings.
//!
//! Both codecs are strict: malformed input is rejected with a [`CodecError`]
//! rather than repaired.
//!
//! [`CodecError`]: crate::error::CodecError

pub mod base64;
pub mod utf8;

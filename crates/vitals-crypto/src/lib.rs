//! Crypto helpers for the agent/server wire protocol.
//!
//! Payloads larger than a single RSA block are processed in chunks, each
//! chunk independently OAEP-encrypted and concatenated. Body integrity is a
//! keyed HMAC-SHA256 carried as lowercase hex in a request header.

pub mod encryptor;
pub mod keys;
pub mod signature;

pub use encryptor::{Decryptor, Encryptor};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to read key file '{path}': {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse key: {0}")]
    KeyParse(String),

    #[error("rsa operation failed: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("ciphertext length {len} is not a multiple of the key size {key_size}")]
    BadCiphertextLength { len: usize, key_size: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

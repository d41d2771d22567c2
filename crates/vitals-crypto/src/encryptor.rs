//! Chunked RSA-OAEP(SHA-256) encryption of request bodies.
//!
//! OAEP bounds a single plaintext block by `key_size - 2 * hash_size - 2`
//! bytes, so the plaintext is split into blocks of exactly that size and
//! each block is encrypted on its own. Every ciphertext block comes out
//! `key_size` bytes long, which is the stride used on the decrypting side.

use crate::CryptoError;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::Path;

/// SHA-256 digest length in bytes, fixed by the OAEP label hash.
const HASH_SIZE: usize = 32;

/// Encrypts outgoing payloads with the recipient's public key.
#[derive(Debug)]
pub struct Encryptor {
    public_key: RsaPublicKey,
}

impl Encryptor {
    pub fn new(public_key: RsaPublicKey) -> Self {
        Self { public_key }
    }

    /// Loads the public key from a PEM file. Both PKCS#1 (`RSA PUBLIC KEY`)
    /// and SubjectPublicKeyInfo (`PUBLIC KEY`) containers are accepted.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|source| CryptoError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;

        let public_key = parse_public_key(&pem)?;
        Ok(Self::new(public_key))
    }

    /// Encrypts `msg` chunk-wise. The output length is always a multiple of
    /// the key size.
    pub fn encrypt(&self, msg: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key_size = self.public_key.size();
        let step = (key_size - 2 * HASH_SIZE - 2).max(1);
        let mut rng = rand::thread_rng();

        if msg.is_empty() {
            return Ok(self.public_key.encrypt(&mut rng, Oaep::new::<Sha256>(), msg)?);
        }

        let mut out = Vec::with_capacity(msg.len().div_ceil(step) * key_size);
        for chunk in msg.chunks(step) {
            let block = self
                .public_key
                .encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)?;
            out.extend_from_slice(&block);
        }

        Ok(out)
    }
}

/// Decrypts incoming payloads with the server's private key.
pub struct Decryptor {
    private_key: RsaPrivateKey,
}

impl Decryptor {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self { private_key }
    }

    /// Loads the private key from a PEM file. Both PKCS#1
    /// (`RSA PRIVATE KEY`) and PKCS#8 (`PRIVATE KEY`) containers are
    /// accepted.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|source| CryptoError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;

        let private_key = parse_private_key(&pem)?;
        Ok(Self::new(private_key))
    }

    /// Decrypts `data` produced by [`Encryptor::encrypt`]. The input must be
    /// a whole number of key-size blocks.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key_size = self.private_key.size();
        if data.is_empty() || data.len() % key_size != 0 {
            return Err(CryptoError::BadCiphertextLength {
                len: data.len(),
                key_size,
            });
        }

        let mut out = Vec::with_capacity(data.len());
        for chunk in data.chunks(key_size) {
            let block = self.private_key.decrypt(Oaep::new::<Sha256>(), chunk)?;
            out.extend_from_slice(&block);
        }

        Ok(out)
    }
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
        return Ok(key);
    }

    RsaPublicKey::from_pkcs1_pem(pem)
        .map_err(|e| CryptoError::KeyParse(format!("not a PKIX or PKCS#1 public key: {e}")))
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }

    RsaPrivateKey::from_pkcs1_pem(pem)
        .map_err(|e| CryptoError::KeyParse(format!("not a PKCS#8 or PKCS#1 private key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;
    use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
    use rsa::pkcs8::LineEnding;

    fn key_pair() -> (RsaPrivateKey, RsaPublicKey) {
        keys::generate_key_pair(2048).unwrap()
    }

    #[test]
    fn round_trip_including_chunked_sizes() {
        let (private_key, public_key) = key_pair();
        let encryptor = Encryptor::new(public_key);
        let decryptor = Decryptor::new(private_key);

        let seed = b"0123456789abcdefghijklmnopqrst"; // 30 bytes
        for repeats in [1usize, 100, 500] {
            let msg: Vec<u8> = seed.iter().copied().cycle().take(30 * repeats).collect();
            let ciphertext = encryptor.encrypt(&msg).unwrap();
            assert_ne!(ciphertext, msg);
            assert_eq!(ciphertext.len() % 256, 0, "2048-bit blocks are 256 bytes");

            let plaintext = decryptor.decrypt(&ciphertext).unwrap();
            assert_eq!(plaintext, msg, "round trip at {repeats}x seed");
        }
    }

    #[test]
    fn decrypt_rejects_truncated_ciphertext() {
        let (private_key, public_key) = key_pair();
        let encryptor = Encryptor::new(public_key);
        let decryptor = Decryptor::new(private_key);

        let mut ciphertext = encryptor.encrypt(b"payload").unwrap();
        ciphertext.pop();

        assert!(matches!(
            decryptor.decrypt(&ciphertext),
            Err(CryptoError::BadCiphertextLength { .. })
        ));
    }

    #[test]
    fn loads_pkcs8_and_pkcs1_pem_containers() {
        let (private_key, public_key) = key_pair();
        let dir = tempfile::tempdir().unwrap();

        // PKCS#8 / SPKI pair written by the generator.
        let (private_path, public_path) = keys::write_key_pair_pem(dir.path(), 2048).unwrap();
        assert!(Decryptor::from_pem_file(&private_path).is_ok());
        assert!(Encryptor::from_pem_file(&public_path).is_ok());

        // Legacy PKCS#1 containers.
        let pkcs1_private = dir.path().join("private_pkcs1.pem");
        private_key
            .write_pkcs1_pem_file(&pkcs1_private, LineEnding::LF)
            .unwrap();
        let pkcs1_public = dir.path().join("public_pkcs1.pem");
        public_key
            .write_pkcs1_pem_file(&pkcs1_public, LineEnding::LF)
            .unwrap();

        let decryptor = Decryptor::from_pem_file(&pkcs1_private).unwrap();
        let encryptor = Encryptor::from_pem_file(&pkcs1_public).unwrap();

        let ciphertext = encryptor.encrypt(b"cross-container").unwrap();
        assert_eq!(decryptor.decrypt(&ciphertext).unwrap(), b"cross-container");
    }

    #[test]
    fn missing_key_file_reports_path() {
        let err = Encryptor::from_pem_file("/nonexistent/public.pem").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/public.pem"));
    }
}

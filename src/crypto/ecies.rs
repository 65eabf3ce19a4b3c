//! Per-recipient envelope encryption.
//!
//! Each envelope is sealed with a fresh ephemeral secp256k1 key: the ECDH
//! secret between the ephemeral key and the recipient's public key is run
//! through SHA-256 to get an AES-256-GCM key. Only the holder of the
//! recipient's secret key can open it.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use k256::{ecdh::EphemeralSecret, PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const KDF_CONTEXT: &[u8] = b"roomcast-envelope-v1";
const NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Failed to decode base64 field: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - data may be corrupted or key is incorrect")]
    DecryptionFailed,
}

/// The ciphertext object carried on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ciphertext {
    /// Base64 SEC1 encoding of the ephemeral public key
    pub ephemeral_key: String,
    pub nonce: String,
    pub ciphertext: String,
}

/// Seals plaintext for a single recipient
#[async_trait]
pub trait Encryptor: Send + Sync {
    /// `recipient_key` is the base64 SEC1 public key registered for the recipient
    async fn encrypt(&self, plaintext: &[u8], recipient_key: &str)
        -> Result<Ciphertext, CryptoError>;
}

/// ECDH(secp256k1) + SHA-256 + AES-256-GCM
#[derive(Debug, Default, Clone)]
pub struct EciesEncryptor;

impl EciesEncryptor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Encryptor for EciesEncryptor {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        recipient_key: &str,
    ) -> Result<Ciphertext, CryptoError> {
        let recipient = decode_public_key(recipient_key)?;

        let ephemeral = EphemeralSecret::random(&mut OsRng);
        let ephemeral_public = ephemeral.public_key();
        let shared = ephemeral.diffie_hellman(&recipient);

        let cipher = derive_cipher(shared.raw_secret_bytes().as_slice())?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(Ciphertext {
            ephemeral_key: encode_public_key(&ephemeral_public),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(sealed),
        })
    }
}

/// Opens a [`Ciphertext`] with the recipient's secret key. This is the
/// client-side half of the scheme.
pub fn decrypt(ciphertext: &Ciphertext, secret_key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = decode_public_key(&ciphertext.ephemeral_key)?;
    let shared = k256::ecdh::diffie_hellman(secret_key.to_nonzero_scalar(), ephemeral.as_affine());
    let cipher = derive_cipher(shared.raw_secret_bytes().as_slice())?;

    let nonce_bytes = BASE64.decode(&ciphertext.nonce)?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    let sealed = BASE64.decode(&ciphertext.ciphertext)?;

    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), sealed.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Base64 SEC1 encoding used for registered public keys
pub fn encode_public_key(key: &PublicKey) -> String {
    BASE64.encode(key.to_sec1_bytes())
}

pub fn decode_public_key(encoded: &str) -> Result<PublicKey, CryptoError> {
    let bytes = BASE64.decode(encoded.trim())?;
    PublicKey::from_sec1_bytes(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

fn derive_cipher(shared_secret: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    let mut hasher = Sha256::new();
    hasher.update(KDF_CONTEXT);
    hasher.update(shared_secret);
    let key = hasher.finalize();
    Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::EncryptionFailed)
}

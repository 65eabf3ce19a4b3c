// Public API
pub use ecies::{
    decode_public_key, decrypt, encode_public_key, Ciphertext, CryptoError, EciesEncryptor,
    Encryptor,
};

// Internal modules
mod ecies;

//! Password-derived authenticated encryption for whole files
//!
//! Tokens use the Fernet layout so files stay readable by any Fernet
//! implementation holding the same key:
//!
//! ```text
//! base64url( 0x80 | timestamp u64 BE | IV 16 | AES-128-CBC(PKCS7) | HMAC-SHA256 32 )
//! ```

use aes::Aes128;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use time::OffsetDateTime;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Salt shared by every deployment
pub const KEY_SALT: &[u8] = b"secure_vision_salt";
pub const KDF_ITERATIONS: u32 = 100_000;

const VERSION: u8 = 0x80;
const HEADER_LEN: usize = 1 + 8 + 16;
const TAG_LEN: usize = 32;
const BLOCK_LEN: usize = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Decryption failed: token is invalid or was not produced with this key")]
    Decryption,

    #[error("Token expired")]
    Expired,

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// 32-byte key: first half signs, second half encrypts
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// PBKDF2-HMAC-SHA256 over the passphrase with the fixed salt
    pub fn derive(passphrase: &str) -> Self {
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), KEY_SALT, KDF_ITERATIONS, &mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a URL-safe base64 Fernet key
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE
            .decode(encoded.trim())
            .map_err(|e| CodecError::InvalidKey(e.to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| CodecError::InvalidKey(format!("expected 32 bytes, got {}", v.len())))?;
        Ok(Self(key))
    }

    pub fn to_base64(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    fn signing_key(&self) -> &[u8] {
        &self.0[..16]
    }

    fn encryption_key(&self) -> &[u8] {
        &self.0[16..]
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Whole-buffer encryptor bound to one key
#[derive(Debug, Clone)]
pub struct Codec {
    key: EncryptionKey,
}

impl Codec {
    /// Build a codec from the configured passphrase
    pub fn new(passphrase: &str) -> Self {
        Self::with_key(EncryptionKey::derive(passphrase))
    }

    pub fn with_key(key: EncryptionKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    /// Encrypt a buffer. Output differs on every call (random IV, timestamp).
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);
        let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        self.encrypt_with(plaintext, now, iv)
    }

    fn encrypt_with(&self, plaintext: &[u8], timestamp: u64, iv: [u8; 16]) -> Vec<u8> {
        let ciphertext = Aes128CbcEnc::new(self.key.encryption_key().into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut token = Vec::with_capacity(HEADER_LEN + ciphertext.len() + TAG_LEN);
        token.push(VERSION);
        token.extend_from_slice(&timestamp.to_be_bytes());
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);

        let tag = self.mac(&token).finalize().into_bytes();
        token.extend_from_slice(&tag);

        URL_SAFE.encode(token).into_bytes()
    }

    /// Decrypt a token produced by [`Codec::encrypt`] with the same key
    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>> {
        self.open(token).map(|(_, plaintext)| plaintext)
    }

    /// Decrypt, rejecting tokens older than `ttl_secs`
    pub fn decrypt_with_ttl(&self, token: &[u8], ttl_secs: u64) -> Result<Vec<u8>> {
        let (timestamp, plaintext) = self.open(token)?;
        let now = OffsetDateTime::now_utc().unix_timestamp().max(0) as u64;
        if timestamp.saturating_add(ttl_secs) < now {
            return Err(CodecError::Expired);
        }
        Ok(plaintext)
    }

    fn open(&self, token: &[u8]) -> Result<(u64, Vec<u8>)> {
        let raw = URL_SAFE
            .decode(token.trim_ascii())
            .map_err(|_| CodecError::Decryption)?;

        if raw.len() < HEADER_LEN + BLOCK_LEN + TAG_LEN || raw[0] != VERSION {
            return Err(CodecError::Decryption);
        }

        let (signed, tag) = raw.split_at(raw.len() - TAG_LEN);
        self.mac(signed)
            .verify_slice(tag)
            .map_err(|_| CodecError::Decryption)?;

        let timestamp = u64::from_be_bytes(
            signed[1..9]
                .try_into()
                .map_err(|_| CodecError::Decryption)?,
        );
        let iv = &signed[9..HEADER_LEN];
        let ciphertext = &signed[HEADER_LEN..];
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CodecError::Decryption);
        }

        let plaintext = Aes128CbcDec::new(self.key.encryption_key().into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CodecError::Decryption)?;

        Ok((timestamp, plaintext))
    }

    fn mac(&self, data: &[u8]) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.key.signing_key())
            .expect("HMAC accepts any key size");
        mac.update(data);
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let buffers: [&[u8]; 4] = [b"", b"hello", &[0u8; 16], &[0xde, 0xad, 0xbe, 0xef, 0x00, 0xff]];

        for passphrase in ["", "correct horse battery staple", "pässwörd"] {
            let codec = Codec::new(passphrase);
            for plaintext in buffers {
                let token = codec.encrypt(plaintext);
                assert_eq!(codec.decrypt(&token).unwrap(), plaintext);
            }
        }
    }

    #[test]
    fn test_key_derivation_is_stable() {
        assert_eq!(EncryptionKey::derive("secret"), EncryptionKey::derive("secret"));
        assert_ne!(EncryptionKey::derive("secret"), EncryptionKey::derive("Secret"));
    }

    #[test]
    fn test_encryption_is_randomised() {
        let codec = Codec::new("k");
        assert_ne!(codec.encrypt(b"same input"), codec.encrypt(b"same input"));
    }

    #[test]
    fn test_wrong_key_fails() {
        let token = Codec::new("right").encrypt(b"payload");
        assert_eq!(Codec::new("wrong").decrypt(&token), Err(CodecError::Decryption));
    }

    #[test]
    fn test_tampering_is_detected() {
        let codec = Codec::new("tamper");
        let token = codec.encrypt(b"account 1234");
        let raw = URL_SAFE.decode(&token).unwrap();

        for index in 0..raw.len() {
            for bit in [0x01u8, 0x80] {
                let mut flipped = raw.clone();
                flipped[index] ^= bit;
                let forged = URL_SAFE.encode(&flipped).into_bytes();
                assert_eq!(codec.decrypt(&forged), Err(CodecError::Decryption), "byte {index}");
            }
        }
    }

    #[test]
    fn test_structurally_invalid_tokens() {
        let codec = Codec::new("k");
        assert_eq!(codec.decrypt(b"not base64 !!"), Err(CodecError::Decryption));
        assert_eq!(codec.decrypt(b""), Err(CodecError::Decryption));
        assert_eq!(
            codec.decrypt(URL_SAFE.encode([0x80u8; 20]).as_bytes()),
            Err(CodecError::Decryption)
        );
    }

    #[test]
    fn test_fernet_reference_token() {
        let key = EncryptionKey::from_base64("cw_0x689RpI-jtRR7oE8h_eQsKImvJapLeSbXpwF4e4=").unwrap();
        let codec = Codec::with_key(key);
        let token = "gAAAAAAdwJ6wAAECAwQFBgcICQoLDA0ODy021cpGVWKZ_eEwCGM4BLLF_5CV9dOPmrhuVUPgJobwOz7JcbmrR64jVmpU4IwqDA==";

        assert_eq!(codec.decrypt(token.as_bytes()).unwrap(), b"hello");

        let iv: [u8; 16] = std::array::from_fn(|i| i as u8);
        let produced = codec.encrypt_with(b"hello", 499_162_800, iv);
        assert_eq!(String::from_utf8(produced).unwrap(), token);
    }

    #[test]
    fn test_ttl() {
        let codec = Codec::new("ttl");
        let fresh = codec.encrypt(b"x");
        assert!(codec.decrypt_with_ttl(&fresh, 60).is_ok());

        let old = codec.encrypt_with(b"x", 1_000, [7u8; 16]);
        assert_eq!(codec.decrypt_with_ttl(&old, 60), Err(CodecError::Expired));
        assert_eq!(codec.decrypt(&old).unwrap(), b"x");
    }

    #[test]
    fn test_key_base64_round_trip() {
        let key = EncryptionKey::derive("export me");
        let parsed = EncryptionKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(parsed, key);
        assert!(EncryptionKey::from_base64("c2hvcnQ=").is_err());
    }
}

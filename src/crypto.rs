//! Cryptogragic logics.

use std::fmt;

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Separates the encoded payload from its signature.
/// Never part of the base64url alphabet.
const SEPARATOR: char = '.';
const RANDOM_KEY_LENGTH: usize = 64;

/// Signs messages into URL-safe strings and checks them back.
pub trait MessageVerifier: Send + Sync {
    /// Sign `message`.
    fn generate(&self, message: &[u8]) -> String;

    /// Return the original message if `signed` carries a valid signature.
    ///
    /// Must never panic, whatever the input.
    fn verified(&self, signed: &str) -> Option<Vec<u8>>;
}

/// [`MessageVerifier`] based on HMAC-SHA256.
///
/// Output is `base64url(message).base64url(mac)` without padding.
#[derive(Clone)]
pub struct HmacVerifier {
    mac: HmacSha256,
}

impl HmacVerifier {
    /// Create a new [`HmacVerifier`] keyed with `secret`.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            mac: HmacSha256::new_from_slice(secret.as_ref())
                .expect("HMAC accepts keys of any length"),
        }
    }

    /// Create a new [`HmacVerifier`] with a fresh key from the OS RNG.
    ///
    /// Tokens signed by one random verifier cannot be verified by another,
    /// so multi-process deployments must configure a shared secret.
    pub fn random() -> Self {
        let mut key = Zeroizing::new([0u8; RANDOM_KEY_LENGTH]);
        OsRng.fill_bytes(&mut key[..]);
        Self::new(&key[..])
    }
}

impl Default for HmacVerifier {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Debug for HmacVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacVerifier").finish_non_exhaustive()
    }
}

impl MessageVerifier for HmacVerifier {
    fn generate(&self, message: &[u8]) -> String {
        let data = URL_SAFE_NO_PAD.encode(message);

        let mut mac = self.mac.clone();
        mac.update(data.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{data}{SEPARATOR}{signature}")
    }

    fn verified(&self, signed: &str) -> Option<Vec<u8>> {
        let (data, signature) = signed.split_once(SEPARATOR)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(data.as_bytes());
        // constant-time comparison.
        mac.verify_slice(&signature).ok()?;

        URL_SAFE_NO_PAD.decode(data).ok()
    }
}

/// Peppered SHA-256 digest.
pub struct Hasher(Zeroizing<Vec<u8>>);

impl Hasher {
    /// Create a new [`Hasher`].
    pub fn new(pepper: impl AsRef<[u8]>) -> Self {
        Self(Zeroizing::new(pepper.as_ref().to_vec()))
    }

    /// Digest data into SHA256.
    pub fn digest(&self, data: impl AsRef<[u8]>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.0);
        hasher.update(&data);
        let hash = hasher.finalize();

        hex::encode(hash)
    }
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| Error::Hash(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> bool {
        PasswordHash::new(phc_hash)
            .map(|parsed| {
                self.argon2()
                    .verify_password(password.as_ref(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

impl Default for PasswordManager {
    fn default() -> Self {
        // 64 MiB, 4 iterations, 2 lanes.
        let params = Params::new(1024 * 64, 4, 2, Some(32))
            .unwrap_or_else(|_| Params::default());
        Self::new(params)
    }
}

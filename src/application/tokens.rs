//! Signed links for account activation.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

const HASH_PARAM: &str = "hash=";

pub trait TokenSigner: Send + Sync {
    /// Append a signature to `url`.
    fn sign(&self, url: &str) -> String;

    /// Check a URL produced by [`TokenSigner::sign`].
    fn verify(&self, signed_url: &str) -> bool;
}

/// Signs URLs with a `hash` query parameter holding hex SHA-256 over the key
/// and the unsigned URL.
#[derive(Clone)]
pub struct DigestTokenSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for DigestTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestTokenSigner").finish_non_exhaustive()
    }
}

impl DigestTokenSigner {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    /// Key valid for this process only; links die with a restart.
    pub fn ephemeral() -> Self {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        Self { key }
    }

    fn digest(&self, url: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        hasher.update(url.as_bytes());
        hasher.finalize().to_vec()
    }
}

impl TokenSigner for DigestTokenSigner {
    fn sign(&self, url: &str) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!(
            "{url}{separator}{HASH_PARAM}{}",
            hex::encode(self.digest(url))
        )
    }

    fn verify(&self, signed_url: &str) -> bool {
        let Some(idx) = signed_url.rfind(HASH_PARAM) else {
            return false;
        };
        if idx == 0 || !matches!(&signed_url[idx - 1..idx], "?" | "&") {
            return false;
        }
        let unsigned = &signed_url[..idx - 1];
        let Ok(provided) = hex::decode(&signed_url[idx + HASH_PARAM.len()..]) else {
            return false;
        };
        let expected = self.digest(unsigned);
        expected.as_slice().ct_eq(provided.as_slice()).into()
    }
}

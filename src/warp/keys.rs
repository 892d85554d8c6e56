//! Device key material.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Public key of the Cloudflare Warp peer.
pub const CLOUDFLARE_PEER_KEY: &str = "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=";

/// A base64 key pair.
///
/// The public half is SHA-256 of the private bytes. It is a stand-in used as
/// the registration `key`, not a Curve25519 derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl KeyPair {
    /// 32 random bytes from the thread RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_private_bytes(&bytes)
    }

    pub fn from_private_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            private_key: STANDARD.encode(bytes),
            public_key: STANDARD.encode(Sha256::digest(bytes)),
        }
    }
}
